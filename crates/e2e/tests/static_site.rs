//! Serving a built site locally and probing reachability.

use blog_render_e2e::server::{ServerConfig, ServerHandle};
use blog_render_e2e::E2eError;

fn built_site() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::write(root.join("index.html"), "<html><body>home</body></html>").unwrap();

    let math = root.join("syntax/2014/11/28");
    std::fs::create_dir_all(&math).unwrap();
    std::fs::write(
        math.join("markdown-and-html.html"),
        r#"<article><p>Inline <span class="katex">x</span></p></article>"#,
    )
    .unwrap();

    let diagrams = root.join("2016/12/03/Mermaid");
    std::fs::create_dir_all(&diagrams).unwrap();
    std::fs::write(
        diagrams.join("index.html"),
        r#"<article><pre class="language-mermaid"><svg></svg></pre></article>"#,
    )
    .unwrap();

    dir
}

fn fast_config() -> ServerConfig {
    ServerConfig {
        startup_timeout_ms: 2_000,
        ..Default::default()
    }
}

#[tokio::test]
async fn serves_permalinks_without_extension() {
    let site = built_site();
    let mut server = ServerHandle::serve_dir(site.path(), &fast_config()).await.unwrap();
    assert!(server.is_local());
    assert!(server.base_url().starts_with("http://127.0.0.1:"));

    let body = reqwest::get(format!("{}/syntax/2014/11/28/markdown-and-html", server.base_url()))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains(r#"class="katex""#));

    let resp = reqwest::get(format!("{}/2016/12/03/Mermaid/", server.base_url()))
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert!(resp.text().await.unwrap().contains("language-mermaid"));

    let missing = reqwest::get(format!("{}/2016/12/03/Nope", server.base_url()))
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 404);

    server.stop();
}

#[tokio::test]
async fn spawn_prefers_serve_dir_over_base_url() {
    let site = built_site();
    let config = ServerConfig {
        serve_dir: Some(site.path().to_path_buf()),
        ..fast_config()
    };

    let server = ServerHandle::spawn(&config, "http://192.0.2.1:4000").await.unwrap();
    assert!(server.is_local());
    assert_ne!(server.base_url(), "http://192.0.2.1:4000");
}

#[tokio::test]
async fn external_site_that_answers_is_accepted() {
    let site = built_site();
    let local = ServerHandle::serve_dir(site.path(), &fast_config()).await.unwrap();

    let external = ServerHandle::external(&format!("{}/", local.base_url()), &fast_config())
        .await
        .unwrap();
    assert!(!external.is_local());
    assert_eq!(external.base_url(), local.base_url());
}

#[tokio::test]
async fn unreachable_site_is_reported() {
    // Grab a free port, then release it so nothing listens there
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let config = ServerConfig {
        startup_timeout_ms: 300,
        ..Default::default()
    };
    let err = ServerHandle::external(&format!("http://127.0.0.1:{}", port), &config)
        .await
        .err()
        .expect("nothing listens on the port");

    assert!(matches!(err, E2eError::SiteUnreachable { attempts, .. } if attempts >= 1), "{err}");
}

#[tokio::test]
async fn missing_site_directory_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let err = ServerHandle::serve_dir(&dir.path().join("_site"), &fast_config())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, E2eError::ServerStartup(_)));
}

//! Site under test - probing a running site or serving a built one locally

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use axum::extract::{Request, State};
use axum::http::Uri;
use axum::{middleware, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

/// Handle to the site the tests run against
pub struct ServerHandle {
    pub base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Serve `config.serve_dir` if set, otherwise probe `base_url`
    pub async fn spawn(config: &ServerConfig, base_url: &str) -> E2eResult<Self> {
        match &config.serve_dir {
            Some(dir) => Self::serve_dir(dir, config).await,
            None => Self::external(base_url, config).await,
        }
    }

    /// Use an already running site, waiting until it answers
    pub async fn external(base_url: &str, config: &ServerConfig) -> E2eResult<Self> {
        let handle = ServerHandle {
            base_url: base_url.trim_end_matches('/').to_string(),
            shutdown: None,
            task: None,
        };

        handle
            .wait_for_healthy(&config.health_path, Duration::from_millis(config.startup_timeout_ms))
            .await?;

        info!("Site is reachable at {}", handle.base_url);
        Ok(handle)
    }

    /// Serve a built site directory on localhost
    pub async fn serve_dir(dir: &Path, config: &ServerConfig) -> E2eResult<Self> {
        if !dir.is_dir() {
            return Err(E2eError::ServerStartup(format!(
                "site directory not found: {}",
                dir.display()
            )));
        }

        let addr = format!("127.0.0.1:{}", config.port.unwrap_or(0));
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| E2eError::ServerStartup(format!("Failed to bind {}: {}", addr, e)))?;
        let port = listener.local_addr()?.port();
        let base_url = format!("http://127.0.0.1:{}", port);

        info!("Serving {} on port {}", dir.display(), port);

        let app = site_router(dir.to_path_buf());
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                warn!("Static server stopped with error: {}", e);
            }
        });

        let handle = ServerHandle {
            base_url,
            shutdown: Some(tx),
            task: Some(task),
        };

        handle
            .wait_for_healthy(&config.health_path, Duration::from_millis(config.startup_timeout_ms))
            .await?;

        info!("Server is healthy at {}", handle.base_url);
        Ok(handle)
    }

    /// Wait for the site to respond successfully on `health_path`
    async fn wait_for_healthy(&self, health_path: &str, timeout_duration: Duration) -> E2eResult<()> {
        let health_url = crate::playwright::join_url(&self.base_url, health_path);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for site at {}...", self.base_url);
                    }
                    // Connection refused is expected while a server is starting
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            if start.elapsed() >= timeout_duration {
                break;
            }
            sleep(Duration::from_millis(100)).await;
        }

        Err(E2eError::SiteUnreachable {
            url: health_url,
            attempts,
        })
    }

    /// Get the base URL for this site
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether this handle owns a local server
    pub fn is_local(&self) -> bool {
        self.task.is_some()
    }

    /// Stop the local server, if any
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            info!("Stopping static server at {}", self.base_url);
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Static file router with directory index and extensionless permalinks
pub fn site_router(root: PathBuf) -> Router {
    let serve = ServeDir::new(&root).append_index_html_on_directories(true);

    Router::new()
        .fallback_service(serve)
        .layer(middleware::map_request_with_state(
            Arc::new(root),
            rewrite_extensionless,
        ))
        .layer(TraceLayer::new_for_http())
}

async fn rewrite_extensionless(State(root): State<Arc<PathBuf>>, mut req: Request) -> Request {
    if let Some(path) = resolve_extensionless(&root, req.uri().path()) {
        let target = match req.uri().query() {
            Some(q) => format!("{}?{}", path, q),
            None => path,
        };
        if let Ok(uri) = target.parse::<Uri>() {
            *req.uri_mut() = uri;
        }
    }
    req
}

/// `/a/b` maps to `/a/b.html` when no directory `a/b` exists but the file does
pub fn resolve_extensionless(root: &Path, path: &str) -> Option<String> {
    let rel = path.trim_matches('/');
    if rel.is_empty() || rel.split('/').any(|seg| seg == "..") {
        return None;
    }
    if Path::new(rel).extension().is_some() || root.join(rel).is_dir() {
        return None;
    }

    let html = format!("{}.html", rel);
    root.join(&html).is_file().then(|| format!("/{}", html))
}

/// Configuration for the site under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Built site to serve locally (e.g. Jekyll's `_site`)
    pub serve_dir: Option<PathBuf>,

    /// Port to listen on when serving (None = pick a free one)
    pub port: Option<u16>,

    /// How long to wait for the site to answer
    pub startup_timeout_ms: u64,

    /// Path probed for reachability
    pub health_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            serve_dir: None,
            port: None,
            startup_timeout_ms: 30_000,
            health_path: "/".to_string(),
        }
    }
}

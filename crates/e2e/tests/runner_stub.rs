//! Whole runs through `TestRunner` with the browser replaced by stubs.
//!
//! A shell script stands in for `node` and answers each generated script
//! based on the selectors it contains. The Playwright module stub needs a
//! real `node` and is skipped when none is on PATH.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use blog_render_e2e::playwright::PlaywrightConfig;
use blog_render_e2e::server::ServerConfig;
use blog_render_e2e::{CaseFilter, FailureKind, RunnerConfig, TestRunner};

const FAKE_NODE: &str = r##"#!/bin/sh
[ "$1" = "-e" ] && exit 0
nav='{"kind":"navigated","status":200}'
if grep -q '"\.hang"' "$1"; then exec sleep 5; fi
if grep -q '"\.silent"' "$1"; then echo "browser crashed" >&2; exit 1; fi
if grep -q '"\.slow"' "$1"; then sleep 1; fi
if grep -q '"\.missing"' "$1"; then
  echo "__E2E_REPORT__ {\"observations\":[$nav,{\"kind\":\"count\",\"count\":0}],\"console_errors\":[]}"
  exit 0
fi
echo "__E2E_REPORT__ {\"observations\":[$nav,{\"kind\":\"waited\",\"elapsed_ms\":5}],\"console_errors\":[]}"
"##;

const STUB_SUITE: &str = r#"
suite: Stub
tags: [desktop]
tests:
  - name: slow first
    steps:
      - action: navigate
        url: /
      - action: wait
        selector: ".slow"
  - name: fast second
    steps:
      - action: navigate
        url: /
      - action: wait
        selector: ".ok"
  - name: missing element
    steps:
      - action: navigate
        url: /
      - action: assert_count
        selector: ".missing"
        cmp: gte
        value: 1
  - name: no report
    steps:
      - action: navigate
        url: /
      - action: wait
        selector: ".silent"
"#;

const OTHER_SUITE: &str = r#"
suite: Other
tests:
  - name: filtered out
    steps:
      - action: navigate
        url: /
"#;

const HUNG_SUITE: &str = r#"
suite: Hung
tests:
  - name: never reports
    steps:
      - action: navigate
        url: /
      - action: wait
        selector: ".hang"
"#;

/// Workspace with a built site, a specs directory and a fake `node`
struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new(suites: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        std::fs::create_dir_all(root.join("site")).unwrap();
        std::fs::write(root.join("site/index.html"), "<html><body>home</body></html>").unwrap();

        std::fs::create_dir_all(root.join("specs")).unwrap();
        for (file, yaml) in suites {
            std::fs::write(root.join("specs").join(file), yaml).unwrap();
        }

        let node = root.join("fake-node");
        std::fs::write(&node, FAKE_NODE).unwrap();
        std::fs::set_permissions(&node, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn config(&self, workers: usize, navigation_timeout_ms: u64, test_timeout_ms: u64) -> RunnerConfig {
        RunnerConfig {
            specs_dir: Some(self.path().join("specs")),
            output_dir: self.path().join("out"),
            workers,
            playwright: PlaywrightConfig {
                node_binary: self.path().join("fake-node"),
                project_dir: self.path().to_path_buf(),
                navigation_timeout_ms,
                test_timeout_ms,
                ..Default::default()
            },
            server: ServerConfig {
                serve_dir: Some(self.path().join("site")),
                startup_timeout_ms: 2_000,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[tokio::test]
async fn run_counts_orders_and_writes_results() {
    let fixture = Fixture::new(&[("stub.yaml", STUB_SUITE), ("other.yaml", OTHER_SUITE)]);
    let config = fixture.config(2, 1_000, 5_000);
    config.validate().unwrap();

    let mut runner = TestRunner::with_config(config);
    let filter = CaseFilter::new(None, Some("^Stub ›")).unwrap();
    let results = runner.run_filtered(&filter).await.unwrap();

    assert_eq!(results.total, 4);
    assert_eq!(results.passed, 2);
    assert_eq!(results.failed, 2);
    assert_eq!(results.skipped, 1);
    assert!(!results.success());

    // Definition order survives the slow first case finishing last
    let names: Vec<&str> = results.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        ["Stub › slow first", "Stub › fast second", "Stub › missing element", "Stub › no report"]
    );

    let missing = &results.results[2];
    assert_eq!(missing.failure_kind, Some(FailureKind::Assertion));
    assert_eq!(missing.steps.len(), 2);

    let silent = &results.results[3];
    assert_eq!(silent.failure_kind, Some(FailureKind::Harness));
    assert!(silent.steps.is_empty());
    assert!(silent.error.as_deref().unwrap().contains("browser crashed"));

    let path = runner.write_results(&results).unwrap();
    assert_eq!(path, fixture.path().join("out/test-results.json"));
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["total"], 4);
    assert_eq!(written["skipped"], 1);
    assert_eq!(written["results"][3]["failure_kind"], "harness");

    assert!(fixture.path().join("out/screenshots").is_dir());
}

#[tokio::test]
async fn hung_case_is_killed_and_reported_as_harness_failure() {
    let fixture = Fixture::new(&[("hung.yaml", HUNG_SUITE)]);
    let mut runner = TestRunner::with_config(fixture.config(1, 400, 500));

    let results = runner.run_filtered(&CaseFilter::default()).await.unwrap();

    assert_eq!(results.failed, 1);
    let hung = &results.results[0];
    assert_eq!(hung.failure_kind, Some(FailureKind::Harness));
    assert!(hung.error.as_deref().unwrap().contains("did not finish within 500 ms"));
    assert!(hung.duration_ms < 5_000);
}

/// Playwright module whose navigations never load
const HANGING_PLAYWRIGHT: &str = r#"
let navTimeout = 30000;
const page = {
  setDefaultNavigationTimeout(ms) { navTimeout = ms; },
  on() {},
  goto() {
    return new Promise((_, reject) => setTimeout(() => {
      const error = new Error(`page.goto: Timeout ${navTimeout}ms exceeded.`);
      error.name = 'TimeoutError';
      reject(error);
    }, navTimeout));
  },
  async screenshot({ path }) { require('fs').writeFileSync(path, ''); },
};
const browser = {
  async newContext() { return { async newPage() { return page; } }; },
  async close() {},
};
const browserType = {
  launch() { return new Promise(resolve => setTimeout(() => resolve(browser), 300)); },
};
module.exports = { chromium: browserType, firefox: browserType, webkit: browserType };
"#;

fn node_available() -> bool {
    std::process::Command::new("node")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn hung_navigation_is_a_navigation_failure_with_screenshot() {
    if !node_available() {
        eprintln!("Skipping: node not found");
        return;
    }

    let fixture = Fixture::new(&[]);
    let module_dir: PathBuf = fixture.path().join("node_modules/playwright");
    std::fs::create_dir_all(&module_dir).unwrap();
    std::fs::write(module_dir.join("index.js"), HANGING_PLAYWRIGHT).unwrap();

    let mut config = fixture.config(1, 1_000, 5_000);
    config.specs_dir = None;
    config.playwright.node_binary = PathBuf::from("node");

    let mut runner = TestRunner::with_config(config);
    let filter = CaseFilter::new(None, Some("inline math")).unwrap();
    let results = runner.run_filtered(&filter).await.unwrap();

    assert_eq!(results.total, 1);
    let case = &results.results[0];
    assert_eq!(case.failure_kind, Some(FailureKind::Navigation));
    assert_eq!(case.steps.len(), 1);
    assert!(!case.steps[0].success);

    let screenshot = case.screenshot.as_ref().expect("failure screenshot recorded");
    assert!(screenshot.starts_with(fixture.path().join("out/screenshots")));
    assert!(screenshot.exists());
}

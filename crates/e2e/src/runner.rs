//! Main test runner that orchestrates the site, Playwright, and assertions

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::assertions::{self, StepResult};
use crate::config::RunnerConfig;
use crate::error::{E2eError, E2eResult, FailureKind};
use crate::playwright::PlaywrightHandle;
use crate::server::ServerHandle;
use crate::spec::{Suite, TestCase};

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub suite: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub console_errors: Vec<String>,
    pub screenshot: Option<PathBuf>,
    pub failure_kind: Option<FailureKind>,
    pub error: Option<String>,
}

impl TestResult {
    fn harness_failure(case: &TestCase, duration_ms: u64, e: &E2eError) -> Self {
        Self {
            name: case.title(),
            suite: case.suite.clone(),
            success: false,
            duration_ms,
            steps: vec![],
            console_errors: vec![],
            screenshot: None,
            failure_kind: Some(e.kind()),
            error: Some(e.to_string()),
        }
    }
}

/// Result of running all tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub started_at: DateTime<Utc>,
    pub base_url: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Which cases of the loaded suites to run
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    pub tag: Option<String>,
    pub grep: Option<Regex>,
}

impl CaseFilter {
    pub fn new(tag: Option<String>, grep: Option<&str>) -> E2eResult<Self> {
        Ok(Self {
            tag,
            grep: grep.map(Regex::new).transpose()?,
        })
    }

    pub fn matches(&self, case: &TestCase) -> bool {
        let tag_ok = self.tag.as_deref().map_or(true, |t| case.has_tag(t));
        let grep_ok = self.grep.as_ref().map_or(true, |re| re.is_match(&case.title()));
        tag_ok && grep_ok
    }

    /// Split cases into (selected, number skipped)
    pub fn select(&self, cases: Vec<TestCase>) -> (Vec<TestCase>, usize) {
        let total = cases.len();
        let selected: Vec<TestCase> = cases.into_iter().filter(|c| self.matches(c)).collect();
        let skipped = total - selected.len();
        (selected, skipped)
    }
}

/// Main E2E test runner
pub struct TestRunner {
    config: RunnerConfig,

    /// Site handle, present once started
    server: Option<ServerHandle>,
}

impl TestRunner {
    /// Create a new test runner with default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a test runner with custom configuration
    pub fn with_config(config: RunnerConfig) -> Self {
        Self { config, server: None }
    }

    /// Serve or probe the site under test
    pub async fn start_server(&mut self) -> E2eResult<()> {
        if self.server.is_some() {
            return Ok(()); // Already running
        }

        let server = ServerHandle::spawn(&self.config.server, &self.config.base_url).await?;
        self.server = Some(server);
        Ok(())
    }

    /// Stop the local server, if one was started
    pub fn stop_server(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.stop();
        }
    }

    /// Base URL of the running site, or the configured one before start
    pub fn base_url(&self) -> &str {
        self.server
            .as_ref()
            .map(|s| s.base_url())
            .unwrap_or(self.config.base_url.as_str())
    }

    /// Suites from the specs directory, or the built-in ones
    pub fn load_suites(&self) -> E2eResult<Vec<Suite>> {
        match &self.config.specs_dir {
            Some(dir) => Suite::load_all(dir),
            None => Suite::builtin(),
        }
    }

    /// All cases of all loaded suites, in definition order
    pub fn load_cases(&self) -> E2eResult<Vec<TestCase>> {
        Ok(self.load_suites()?.iter().flat_map(Suite::cases).collect())
    }

    /// Run tests matching a tag
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<TestSuiteResult> {
        self.run_filtered(&CaseFilter::new(Some(tag.to_string()), None)?).await
    }

    /// Run the cases a filter selects
    pub async fn run_filtered(&mut self, filter: &CaseFilter) -> E2eResult<TestSuiteResult> {
        let (cases, skipped) = filter.select(self.load_cases()?);
        if cases.is_empty() {
            return Err(E2eError::Config("no test cases match the filter".into()));
        }
        let mut result = self.run_cases(cases).await?;
        result.skipped = skipped;
        Ok(result)
    }

    /// Run a list of test cases, up to `workers` at a time
    pub async fn run_cases(&mut self, cases: Vec<TestCase>) -> E2eResult<TestSuiteResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        // Ensure the site is up
        self.start_server().await?;
        let base_url = self.base_url().to_string();

        let playwright = Arc::new(PlaywrightHandle::new(self.config.playwright_config())?);
        let permits = Arc::new(Semaphore::new(self.config.workers.max(1)));

        info!(
            "Running {} test(s) against {} with {} worker(s)...",
            cases.len(),
            base_url,
            self.config.workers
        );

        let total = cases.len();
        let mut set = JoinSet::new();
        for (index, case) in cases.into_iter().enumerate() {
            let playwright = Arc::clone(&playwright);
            let permits = Arc::clone(&permits);
            let base_url = base_url.clone();
            set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = run_case(&playwright, &case, &base_url).await;
                report_outcome(&result);
                (index, result)
            });
        }

        let mut slots: Vec<Option<TestResult>> = vec![None; total];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!("Test task panicked: {}", e),
            }
        }
        let results: Vec<TestResult> = slots.into_iter().flatten().collect();

        let passed = results.iter().filter(|r| r.success).count();
        let failed = total - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!("Test Results: {} passed, {} failed ({} ms)", passed, failed, duration_ms);

        Ok(TestSuiteResult {
            started_at,
            base_url,
            total,
            passed,
            failed,
            skipped: 0,
            duration_ms,
            results,
        })
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        self.stop_server();
    }
}

/// Run one case in its own browser and judge the report
pub async fn run_case(playwright: &PlaywrightHandle, case: &TestCase, base_url: &str) -> TestResult {
    let start = Instant::now();
    debug!("Running test: {}", case.title());

    let report = match playwright.run_case(case, base_url).await {
        Ok(report) => report,
        Err(e) => {
            return TestResult::harness_failure(case, start.elapsed().as_millis() as u64, &e);
        }
    };

    let verdict = assertions::evaluate(case, base_url, &report);

    TestResult {
        name: case.title(),
        suite: case.suite.clone(),
        success: verdict.passed(),
        duration_ms: start.elapsed().as_millis() as u64,
        failure_kind: verdict.error.as_ref().map(E2eError::kind),
        error: verdict.error.as_ref().map(|e| e.to_string()),
        steps: verdict.steps,
        console_errors: report.console_errors,
        screenshot: report.screenshot,
    }
}

fn report_outcome(result: &TestResult) {
    if result.success {
        info!("✓ {} ({} ms)", result.name, result.duration_ms);
    } else {
        error!(
            "✗ {} - {}",
            result.name,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_by_tag_and_grep() {
        let runner = TestRunner::new();
        let cases = runner.load_cases().unwrap();
        let total = cases.len();

        let filter = CaseFilter::new(Some("@desktop".into()), Some("Mermaid")).unwrap();
        let (selected, skipped) = filter.select(cases);

        assert!(!selected.is_empty());
        assert!(selected.iter().all(|c| c.title().contains("Mermaid")));
        assert_eq!(selected.len() + skipped, total);
    }

    #[test]
    fn test_bad_grep_is_an_error() {
        assert!(matches!(CaseFilter::new(None, Some("(")), Err(E2eError::Regex(_))));
    }

    #[test]
    fn test_unknown_tag_selects_nothing() {
        let runner = TestRunner::new();
        let filter = CaseFilter::new(Some("mobile".into()), None).unwrap();
        let (selected, skipped) = filter.select(runner.load_cases().unwrap());
        assert!(selected.is_empty());
        assert_eq!(skipped, 13);
    }

    #[tokio::test]
    async fn test_empty_selection_is_a_config_error() {
        let mut runner = TestRunner::new();
        let filter = CaseFilter::new(Some("mobile".into()), None).unwrap();

        match runner.run_filtered(&filter).await {
            Err(e @ E2eError::Config(_)) => assert_eq!(e.kind(), FailureKind::Harness),
            other => panic!("expected a config error, got {:?}", other.map(|r| r.total)),
        }
    }
}

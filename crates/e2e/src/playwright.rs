//! Playwright browser automation
//!
//! Each test case becomes one Node script. The script drives a fresh browser,
//! records what it observed for every step, and prints a single JSON report
//! line prefixed with [`REPORT_MARKER`]. Judging the observations happens on
//! the Rust side in [`crate::assertions`].

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::process::Command as TokioCommand;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::spec::{TestCase, TestStep};

/// Prefix of the stdout line carrying the page report
pub const REPORT_MARKER: &str = "__E2E_REPORT__ ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(E2eError::Config(format!("unknown browser: {}", other))),
        }
    }
}

/// What the browser saw while executing one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    Navigated { status: Option<u16> },
    Waited { elapsed_ms: u64 },
    Slept,
    Count { count: u64 },
    Style { value: String },
    Descendants { counts: Vec<u64> },
}

/// Where and why the script stopped early
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserFailure {
    pub step: usize,
    pub timed_out: bool,
    pub message: String,
}

/// Everything a script reports back about one page load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    /// One slot per step; `None` for steps judged purely on the Rust side
    pub observations: Vec<Option<Observation>>,

    /// Error-level console messages in arrival order
    #[serde(default)]
    pub console_errors: Vec<String>,

    #[serde(default)]
    pub failure: Option<BrowserFailure>,

    #[serde(default)]
    pub screenshot: Option<PathBuf>,
}

/// Playwright browser handle
#[derive(Debug, Clone)]
pub struct PlaywrightHandle {
    config: PlaywrightConfig,
}

impl PlaywrightHandle {
    /// Create a new Playwright handle
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed(&config)?;

        if config.screenshot_on_failure {
            std::fs::create_dir_all(config.screenshot_dir())?;
        }

        Ok(Self { config })
    }

    /// Create a handle without probing the Node toolchain
    pub fn unchecked(config: PlaywrightConfig) -> Self {
        Self { config }
    }

    /// Check that `require('playwright')` resolves from the project directory
    fn check_playwright_installed(config: &PlaywrightConfig) -> E2eResult<()> {
        let status = Command::new(&config.node_binary)
            .args(["-e", "require('playwright')"])
            .env("NODE_PATH", config.node_modules())
            .current_dir(&config.project_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Build the Playwright script for one test case
    pub fn build_script(&self, case: &TestCase, base_url: &str) -> String {
        let steps = &case.spec.steps;
        let mut script = String::new();

        let screenshot = if self.config.screenshot_on_failure {
            let path = self.config.screenshot_dir().join(format!("{}.png", slug(&case.title())));
            js_str(&path.to_string_lossy())
        } else {
            "null".to_string()
        };

        // Header
        let _ = write!(script, r#"const {{ chromium, firefox, webkit }} = require('playwright');

(async () => {{
  const report = {{ observations: new Array({count}).fill(null), console_errors: [], failure: null, screenshot: null }};
  const screenshotPath = {screenshot};
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
  const page = await context.newPage();
  page.setDefaultNavigationTimeout({nav_timeout});
  let navStart = Date.now();
  let step = 0;
"#,
            count = steps.len(),
            screenshot = screenshot,
            browser = self.config.browser.as_str(),
            headless = self.config.headless,
            width = case.viewport.width,
            height = case.viewport.height,
            nav_timeout = self.config.navigation_timeout_ms,
        );

        // The listener must be in place before the first navigation
        if case.spec.collects_console() {
            script.push_str(
                r#"  page.on('console', msg => {
    if (msg.type() === 'error') {
      report.console_errors.push(msg.text());
    }
  });
"#,
            );
        }

        script.push_str("\n  try {\n");

        for (i, step) in steps.iter().enumerate() {
            let _ = writeln!(script, "    // Step {}: {}", i + 1, step.name());
            let _ = writeln!(script, "    step = {};", i);
            script.push_str(&self.step_to_js(case, step, i, base_url));
            script.push('\n');
        }

        // Footer
        script.push_str(&format!(r#"  }} catch (error) {{
    report.failure = {{
      step,
      timed_out: error.name === 'TimeoutError',
      message: String(error.message || error).split('\n')[0],
    }};
    if (screenshotPath) {{
      try {{
        await page.screenshot({{ path: screenshotPath, fullPage: true }});
        report.screenshot = screenshotPath;
      }} catch (_) {{}}
    }}
  }} finally {{
    console.log({marker} + JSON.stringify(report));
    await browser.close();
  }}
}})();
"#,
            marker = js_str(REPORT_MARKER),
        ));

        script
    }

    /// Convert a step to JavaScript code
    fn step_to_js(&self, case: &TestCase, step: &TestStep, i: usize, base_url: &str) -> String {
        match step {
            TestStep::Navigate { url } => {
                let full = join_url(base_url, case.resolve_url(url.as_deref()));
                format!(
                    r#"    navStart = Date.now();
    const response_{i} = await page.goto({url});
    report.observations[{i}] = {{ kind: 'navigated', status: response_{i} ? response_{i}.status() : null }};"#,
                    i = i,
                    url = js_str(&full),
                )
            }
            TestStep::Wait { selector, timeout_ms, state } => {
                format!(
                    r#"    await page.locator({sel}).first().waitFor({{ state: '{state}', timeout: {timeout} }});
    report.observations[{i}] = {{ kind: 'waited', elapsed_ms: Date.now() - navStart }};"#,
                    sel = js_str(selector),
                    state = state.as_str(),
                    timeout = timeout_ms,
                    i = i,
                )
            }
            TestStep::Sleep { ms } => {
                format!(
                    r#"    await page.waitForTimeout({ms});
    report.observations[{i}] = {{ kind: 'slept' }};"#,
                    ms = ms,
                    i = i,
                )
            }
            TestStep::AssertCount { selector, .. } => {
                format!(
                    r#"    report.observations[{i}] = {{ kind: 'count', count: await page.locator({sel}).count() }};"#,
                    sel = js_str(selector),
                    i = i,
                )
            }
            TestStep::AssertStyle { selector, property, timeout_ms, .. } => {
                format!(
                    r#"    {{
      const el = page.locator({sel}).first();
      await el.waitFor({{ state: 'visible', timeout: {timeout} }});
      const value = await el.evaluate((node, prop) => window.getComputedStyle(node).getPropertyValue(prop), {prop});
      report.observations[{i}] = {{ kind: 'style', value }};
    }}"#,
                    sel = js_str(selector),
                    timeout = timeout_ms,
                    prop = js_str(property),
                    i = i,
                )
            }
            TestStep::AssertEachHasDescendant { selector, descendant } => {
                format!(
                    r#"    report.observations[{i}] = {{
      kind: 'descendants',
      counts: await page.locator({sel}).evaluateAll((nodes, d) => nodes.map(n => n.querySelectorAll(d).length), {desc}),
    }};"#,
                    sel = js_str(selector),
                    desc = js_str(descendant),
                    i = i,
                )
            }
            // Judged from the report alone
            TestStep::AssertElapsed { .. } | TestStep::AssertNoConsoleErrors { .. } => {
                "    // evaluated by the runner".to_string()
            }
        }
    }

    /// Run one test case in a fresh browser and collect its report
    pub async fn run_case(&self, case: &TestCase, base_url: &str) -> E2eResult<PageReport> {
        let script = self.build_script(case, base_url);

        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("case.js");
        std::fs::write(&script_path, &script)?;

        debug!("Running Playwright script for '{}': {}", case.title(), script_path.display());

        let child = TokioCommand::new(&self.config.node_binary)
            .arg(&script_path)
            .env("NODE_PATH", self.config.node_modules())
            .current_dir(&self.config.project_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let limit = Duration::from_millis(self.config.test_timeout_ms);
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(E2eError::CaseTimeout {
                    title: case.title(),
                    timeout_ms: self.config.test_timeout_ms,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_report(&stdout).map_err(|_| {
            let stderr = String::from_utf8_lossy(&output.stderr);
            E2eError::Playwright(format!(
                "Script produced no report (exit {}):\nstdout: {}\nstderr: {}",
                output.status, stdout, stderr
            ))
        })
    }
}

/// Extract the page report from script stdout
pub fn parse_report(stdout: &str) -> E2eResult<PageReport> {
    let line = stdout
        .lines()
        .rev()
        .find_map(|l| l.strip_prefix(REPORT_MARKER))
        .ok_or_else(|| E2eError::Playwright("no report line in script output".into()))?;

    Ok(serde_json::from_str(line)?)
}

/// Join a site base URL and an absolute path without doubling slashes
pub fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Quote a Rust string as a JavaScript string literal
fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// File-name-safe form of a test title
pub fn slug(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,

    /// Node executable used to run generated scripts
    pub node_binary: PathBuf,

    /// Directory whose `node_modules` provides `playwright`
    pub project_dir: PathBuf,

    /// Timeout for `page.goto` to reach the load event; must stay below
    /// `test_timeout_ms` so a hung page fails as a navigation
    pub navigation_timeout_ms: u64,

    /// Hard limit for a whole test case, including browser startup
    pub test_timeout_ms: u64,

    pub screenshot_on_failure: bool,

    /// Where failure screenshots go; unset means `<output_dir>/screenshots`
    pub screenshot_dir: Option<PathBuf>,
}

impl PlaywrightConfig {
    pub fn screenshot_dir(&self) -> PathBuf {
        self.screenshot_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("test-results/screenshots"))
    }

    fn node_modules(&self) -> PathBuf {
        absolute(&self.project_dir).join("node_modules")
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            node_binary: PathBuf::from("node"),
            project_dir: PathBuf::from("."),
            navigation_timeout_ms: 15_000,
            test_timeout_ms: 30_000,
            screenshot_on_failure: true,
            screenshot_dir: None,
        }
    }
}

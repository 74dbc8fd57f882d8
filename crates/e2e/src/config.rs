//! Runner configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{E2eError, E2eResult};
use crate::playwright::PlaywrightConfig;
use crate::server::ServerConfig;

/// Configuration for the test runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Site under test; ignored when `server.serve_dir` is set
    pub base_url: String,

    /// Load YAML suites from here instead of the built-in ones
    pub specs_dir: Option<PathBuf>,

    /// Output directory for results and, unless set explicitly, screenshots
    pub output_dir: PathBuf,

    /// Number of test cases run concurrently
    pub workers: usize,

    pub playwright: PlaywrightConfig,

    pub server: ServerConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4000".to_string(),
            specs_dir: None,
            output_dir: PathBuf::from("test-results"),
            workers: 1,
            playwright: PlaywrightConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from a TOML file, falling back to defaults when absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.workers == 0 {
            return Err(E2eError::Config("workers must be at least 1".into()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(E2eError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        let pw = &self.playwright;
        if pw.test_timeout_ms == 0 || pw.navigation_timeout_ms == 0 {
            return Err(E2eError::Config("timeouts must be non-zero".into()));
        }
        // Otherwise the case limit fires first and a hung page loses its steps and screenshot
        if pw.navigation_timeout_ms >= pw.test_timeout_ms {
            return Err(E2eError::Config(format!(
                "navigation_timeout_ms ({}) must be less than test_timeout_ms ({})",
                pw.navigation_timeout_ms, pw.test_timeout_ms
            )));
        }
        Ok(())
    }

    pub fn with_output_dir(mut self, output_dir: PathBuf) -> Self {
        self.output_dir = output_dir;
        self
    }

    /// Browser settings with the screenshot directory resolved against `output_dir`
    pub fn playwright_config(&self) -> PlaywrightConfig {
        let mut playwright = self.playwright.clone();
        if playwright.screenshot_dir.is_none() {
            playwright.screenshot_dir = Some(self.output_dir.join("screenshots"));
        }
        playwright
    }
}

//! Error types for E2E testing

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timeout after {timeout_ms} ms waiting for: {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Test '{title}' did not finish within {timeout_ms} ms")]
    CaseTimeout { title: String, timeout_ms: u64 },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Console errors matching {keywords:?}: {messages:?}")]
    ConsoleErrors {
        keywords: Vec<String>,
        messages: Vec<String>,
    },

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Test spec parse error: {0}")]
    SpecParse(String),

    #[error("Invalid test spec '{name}': {reason}")]
    InvalidSpec { name: String, reason: String },

    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Site at {url} not reachable after {attempts} attempts")]
    SiteUnreachable { url: String, attempts: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),
}

/// Coarse classification of a failed test case, as written to the results file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Navigation,
    Timeout,
    Assertion,
    ConsoleErrors,
    Harness,
}

impl E2eError {
    pub fn kind(&self) -> FailureKind {
        match self {
            E2eError::Navigation { .. } => FailureKind::Navigation,
            E2eError::Timeout { .. } => FailureKind::Timeout,
            E2eError::AssertionFailed(_) => FailureKind::Assertion,
            E2eError::ConsoleErrors { .. } => FailureKind::ConsoleErrors,
            _ => FailureKind::Harness,
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;

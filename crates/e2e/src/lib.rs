//! Blog rendering E2E checks
//!
//! Browser-driven checks that a static blog renders its KaTeX math and
//! Mermaid diagrams correctly, quickly, and without console errors:
//! - Serves a built site locally or probes a running one
//! - Drives Playwright through generated Node scripts, one browser per case
//! - Parses declarative YAML suites (built-in ones are embedded)
//! - Judges the recorded observations and writes JSON results
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── start_server() -> ServerHandle                       │
//! │    ├── run_filtered(filter) -> TestSuiteResult              │
//! │    │     └── per case, bounded by `workers`:                │
//! │    │           PlaywrightHandle::run_case -> PageReport     │
//! │    │           assertions::evaluate -> Verdict              │
//! │    └── write_results() -> test-results.json                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Suite (YAML)                                               │
//! │    ├── suite, tags, url                                     │
//! │    └── tests: [{ name, steps: [Step] }]                     │
//! │          ├── navigate { url? }                              │
//! │          ├── wait { selector, timeout_ms, state }           │
//! │          ├── sleep { ms }                                   │
//! │          ├── assert_count { selector, cmp, value }          │
//! │          ├── assert_style { selector, property, contains }  │
//! │          ├── assert_elapsed { less_than_ms }                │
//! │          ├── assert_no_console_errors { keywords }          │
//! │          └── assert_each_has_descendant { selector, .. }    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assertions;
pub mod config;
pub mod error;
pub mod playwright;
pub mod runner;
pub mod server;
pub mod spec;

pub use config::RunnerConfig;
pub use error::{E2eError, E2eResult, FailureKind};
pub use runner::{CaseFilter, TestRunner, TestSuiteResult};
pub use spec::{Suite, TestCase, TestSpec, TestStep};

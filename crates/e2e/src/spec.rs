//! Declarative YAML test suites

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::assertions::Comparison;
use crate::error::{E2eError, E2eResult};

/// Suites compiled into the binary, one per rendering concern
const BUILTIN_SUITES: &[(&str, &str)] = &[
    ("katex.yaml", include_str!("../specs/katex.yaml")),
    ("mermaid.yaml", include_str!("../specs/mermaid.yaml")),
    ("performance.yaml", include_str!("../specs/performance.yaml")),
];

/// A named group of test cases parsed from one YAML document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    /// Suite title, shown before every case title
    #[serde(rename = "suite")]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags applied to every case in the suite
    #[serde(default)]
    pub tags: Vec<String>,

    /// Default path for `navigate` steps that omit one
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_viewport")]
    pub viewport: Viewport,

    pub tests: Vec<TestSpec>,
}

/// A single test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Extra tags on top of the suite's
    #[serde(default)]
    pub tags: Vec<String>,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

fn default_viewport() -> Viewport {
    Viewport { width: 1280, height: 720 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// A single step in a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a path relative to the base URL
    Navigate {
        #[serde(default)]
        url: Option<String>,
    },

    /// Wait for the first match of a selector to reach a state
    Wait {
        selector: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
        #[serde(default)]
        state: WaitState,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep {
        ms: u64,
    },

    /// Compare the number of elements matching a selector
    AssertCount {
        selector: String,
        #[serde(rename = "cmp")]
        comparison: Comparison,
        value: u64,
    },

    /// Check a computed CSS property of the first visible match
    AssertStyle {
        selector: String,
        property: String,
        contains: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
    },

    /// Bound the time from navigation start to the most recent wait
    AssertElapsed {
        less_than_ms: u64,
    },

    /// No buffered console error may contain any of the keywords
    AssertNoConsoleErrors {
        keywords: Vec<String>,
    },

    /// Every match of `selector` must contain a match of `descendant`
    AssertEachHasDescendant {
        selector: String,
        descendant: String,
    },
}

fn default_wait_timeout() -> u64 {
    5000 // same as Playwright's expect timeout
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

impl TestStep {
    /// Short label used in logs and results
    pub fn name(&self) -> String {
        match self {
            TestStep::Navigate { url } => {
                format!("navigate:{}", url.as_deref().unwrap_or("<suite url>"))
            }
            TestStep::Wait { selector, state, .. } => {
                format!("wait:{}:{}", state.as_str(), selector)
            }
            TestStep::Sleep { ms } => format!("sleep:{}ms", ms),
            TestStep::AssertCount { selector, comparison, value } => {
                format!("count:{} {} {}", selector, comparison.symbol(), value)
            }
            TestStep::AssertStyle { selector, property, .. } => {
                format!("style:{}:{}", selector, property)
            }
            TestStep::AssertElapsed { less_than_ms } => format!("elapsed:<{}ms", less_than_ms),
            TestStep::AssertNoConsoleErrors { keywords } => {
                format!("console:{}", keywords.join("|"))
            }
            TestStep::AssertEachHasDescendant { selector, descendant } => {
                format!("each:{} {}", selector, descendant)
            }
        }
    }
}

impl TestSpec {
    /// Whether the page needs a console listener attached before navigation
    pub fn collects_console(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s, TestStep::AssertNoConsoleErrors { .. }))
    }
}

impl Suite {
    /// Parse a suite from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let suite: Self = serde_yaml::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all suites from a directory, in path order
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        if !dir.is_dir() {
            return Err(E2eError::SpecParse(format!(
                "specs directory not found: {}",
                dir.display()
            )));
        }

        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    /// The KaTeX, Mermaid and performance suites shipped with the crate
    pub fn builtin() -> E2eResult<Vec<Self>> {
        BUILTIN_SUITES
            .iter()
            .map(|(file, yaml)| {
                Self::from_yaml(yaml).map_err(|e| E2eError::SpecParse(format!("{}: {}", file, e)))
            })
            .collect()
    }

    /// Reject suites that could never run to completion
    pub fn validate(&self) -> E2eResult<()> {
        let invalid = |name: &str, reason: String| E2eError::InvalidSpec {
            name: format!("{} › {}", self.name, name),
            reason,
        };

        let mut seen = HashSet::new();
        for test in &self.tests {
            if !seen.insert(test.name.as_str()) {
                return Err(invalid(&test.name, "duplicate test name".into()));
            }

            match test.steps.first() {
                None => return Err(invalid(&test.name, "no steps".into())),
                Some(TestStep::Navigate { .. }) => {}
                Some(other) => {
                    return Err(invalid(
                        &test.name,
                        format!("first step must be navigate, found {}", other.name()),
                    ))
                }
            }

            let mut waited = false;
            for step in &test.steps {
                match step {
                    TestStep::Navigate { url } => {
                        if url.is_none() && self.url.is_none() {
                            return Err(invalid(&test.name, "navigate has no url".into()));
                        }
                        waited = false;
                    }
                    TestStep::Wait { timeout_ms, .. } | TestStep::AssertStyle { timeout_ms, .. } => {
                        if *timeout_ms == 0 {
                            return Err(invalid(&test.name, format!("{} has zero timeout", step.name())));
                        }
                        waited |= matches!(step, TestStep::Wait { .. });
                    }
                    TestStep::AssertElapsed { .. } if !waited => {
                        return Err(invalid(
                            &test.name,
                            "assert_elapsed must follow a wait step".into(),
                        ));
                    }
                    TestStep::AssertNoConsoleErrors { keywords } if keywords.is_empty() => {
                        return Err(invalid(&test.name, "console assertion has no keywords".into()));
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }

    /// Flatten the suite into independently runnable cases
    pub fn cases(&self) -> Vec<TestCase> {
        self.tests
            .iter()
            .map(|spec| {
                let mut tags = self.tags.clone();
                tags.extend(spec.tags.iter().cloned());
                TestCase {
                    suite: self.name.clone(),
                    tags,
                    url: self.url.clone(),
                    viewport: self.viewport,
                    spec: spec.clone(),
                }
            })
            .collect()
    }
}

/// One test from a suite, carrying the suite-level defaults it needs to run alone
#[derive(Debug, Clone)]
pub struct TestCase {
    pub suite: String,
    pub tags: Vec<String>,
    pub url: Option<String>,
    pub viewport: Viewport,
    pub spec: TestSpec,
}

impl TestCase {
    pub fn title(&self) -> String {
        format!("{} › {}", self.suite, self.spec.name)
    }

    /// Tag match, accepting both `desktop` and `@desktop`
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim_start_matches('@');
        self.tags.iter().any(|t| t.trim_start_matches('@') == tag)
    }

    /// Path a navigate step loads, falling back to the suite url
    pub fn resolve_url<'a>(&'a self, step_url: Option<&'a str>) -> &'a str {
        step_url.or(self.url.as_deref()).unwrap_or("/")
    }
}

//! Judging page reports against the expectations of a test case

use serde::{Deserialize, Serialize};

use crate::error::E2eError;
use crate::playwright::{Observation, PageReport};
use crate::spec::{TestCase, TestStep};

/// Numeric comparison used by count assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl Comparison {
    pub fn holds(self, actual: u64, expected: u64) -> bool {
        match self {
            Comparison::Gt => actual > expected,
            Comparison::Gte => actual >= expected,
            Comparison::Lt => actual < expected,
            Comparison::Lte => actual <= expected,
            Comparison::Eq => actual == expected,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Eq => "==",
        }
    }
}

/// Messages containing any of the keywords, in buffer order
pub fn filter_errors_by_keyword<'a>(buffer: &'a [String], keywords: &[String]) -> Vec<&'a str> {
    buffer
        .iter()
        .filter(|msg| keywords.iter().any(|k| msg.contains(k.as_str())))
        .map(String::as_str)
        .collect()
}

/// Case-insensitive substring match on a computed style value
pub fn style_contains(value: &str, needle: &str) -> bool {
    value.to_lowercase().contains(&needle.to_lowercase())
}

/// Outcome of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub success: bool,

    /// Observed value, e.g. `count=7` or `elapsed=1830ms`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-step results plus the error that failed the case, if any
#[derive(Debug)]
pub struct Verdict {
    pub steps: Vec<StepResult>,
    pub error: Option<E2eError>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Walk the steps in order, stopping at the first one that fails
pub fn evaluate(case: &TestCase, base_url: &str, report: &PageReport) -> Verdict {
    let mut steps = Vec::with_capacity(case.spec.steps.len());
    let mut last_elapsed: Option<u64> = None;

    for (i, step) in case.spec.steps.iter().enumerate() {
        let step_name = step.name();
        let observed = report.observations.get(i).and_then(Option::as_ref);

        let outcome = match &report.failure {
            Some(failure) if failure.step == i => Err(browser_failure(
                case,
                base_url,
                step,
                failure.timed_out,
                &failure.message,
            )),
            _ => judge(case, base_url, step, observed, report, &mut last_elapsed),
        };

        match outcome {
            Ok(detail) => steps.push(StepResult {
                step_name,
                success: true,
                detail,
                error: None,
            }),
            Err(error) => {
                steps.push(StepResult {
                    step_name,
                    success: false,
                    detail: None,
                    error: Some(error.to_string()),
                });
                return Verdict { steps, error: Some(error) };
            }
        }
    }

    Verdict { steps, error: None }
}

fn browser_failure(
    case: &TestCase,
    base_url: &str,
    step: &TestStep,
    timed_out: bool,
    message: &str,
) -> E2eError {
    match step {
        TestStep::Navigate { url } => E2eError::Navigation {
            url: crate::playwright::join_url(base_url, case.resolve_url(url.as_deref())),
            reason: message.to_string(),
        },
        TestStep::Wait { selector, timeout_ms, state } if timed_out => E2eError::Timeout {
            what: format!("{} to be {}", selector, state.as_str()),
            timeout_ms: *timeout_ms,
        },
        TestStep::AssertStyle { selector, timeout_ms, .. } if timed_out => E2eError::Timeout {
            what: format!("{} to be visible", selector),
            timeout_ms: *timeout_ms,
        },
        other => E2eError::StepFailed {
            step: other.name(),
            reason: message.to_string(),
        },
    }
}

fn judge(
    case: &TestCase,
    base_url: &str,
    step: &TestStep,
    observed: Option<&Observation>,
    report: &PageReport,
    last_elapsed: &mut Option<u64>,
) -> Result<Option<String>, E2eError> {
    let missing = || E2eError::StepFailed {
        step: step.name(),
        reason: "browser recorded no observation".into(),
    };

    match step {
        TestStep::Navigate { url } => match observed {
            Some(Observation::Navigated { status: Some(status) }) if *status >= 400 => {
                Err(E2eError::Navigation {
                    url: crate::playwright::join_url(base_url, case.resolve_url(url.as_deref())),
                    reason: format!("HTTP {}", status),
                })
            }
            Some(Observation::Navigated { status }) => {
                *last_elapsed = None;
                Ok(status.map(|s| format!("status={}", s)))
            }
            _ => Err(missing()),
        },
        TestStep::Wait { .. } => match observed {
            Some(Observation::Waited { elapsed_ms }) => {
                *last_elapsed = Some(*elapsed_ms);
                Ok(Some(format!("elapsed={}ms", elapsed_ms)))
            }
            _ => Err(missing()),
        },
        TestStep::Sleep { .. } => match observed {
            Some(Observation::Slept) => Ok(None),
            _ => Err(missing()),
        },
        TestStep::AssertCount { selector, comparison, value } => match observed {
            Some(Observation::Count { count }) => {
                if comparison.holds(*count, *value) {
                    Ok(Some(format!("count={}", count)))
                } else {
                    Err(E2eError::AssertionFailed(format!(
                        "expected count of '{}' {} {}, got {}",
                        selector,
                        comparison.symbol(),
                        value,
                        count
                    )))
                }
            }
            _ => Err(missing()),
        },
        TestStep::AssertStyle { selector, property, contains, .. } => match observed {
            Some(Observation::Style { value }) => {
                if style_contains(value, contains) {
                    Ok(Some(format!("{}={}", property, value)))
                } else {
                    Err(E2eError::AssertionFailed(format!(
                        "expected {} of '{}' to contain '{}', got '{}'",
                        property, selector, contains, value
                    )))
                }
            }
            _ => Err(missing()),
        },
        TestStep::AssertEachHasDescendant { selector, descendant } => match observed {
            Some(Observation::Descendants { counts }) => {
                match counts.iter().position(|&n| n == 0) {
                    Some(index) => Err(E2eError::AssertionFailed(format!(
                        "'{}' #{} of {} has no '{}' descendant",
                        selector,
                        index,
                        counts.len(),
                        descendant
                    ))),
                    None => Ok(Some(format!("blocks={}", counts.len()))),
                }
            }
            _ => Err(missing()),
        },
        TestStep::AssertElapsed { less_than_ms } => match *last_elapsed {
            Some(elapsed) if elapsed < *less_than_ms => Ok(Some(format!("elapsed={}ms", elapsed))),
            Some(elapsed) => Err(E2eError::AssertionFailed(format!(
                "expected load time < {}ms, got {}ms",
                less_than_ms, elapsed
            ))),
            None => Err(E2eError::StepFailed {
                step: step.name(),
                reason: "no completed wait to measure".into(),
            }),
        },
        TestStep::AssertNoConsoleErrors { keywords } => {
            let matches = filter_errors_by_keyword(&report.console_errors, keywords);
            if matches.is_empty() {
                Ok(Some(format!("console_errors={}", report.console_errors.len())))
            } else {
                Err(E2eError::ConsoleErrors {
                    keywords: keywords.clone(),
                    messages: matches.into_iter().map(String::from).collect(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Comparison::Gt, 1, 0 => true)]
    #[test_case(Comparison::Gt, 0, 0 => false)]
    #[test_case(Comparison::Gte, 5, 5 => true)]
    #[test_case(Comparison::Gte, 4, 5 => false)]
    #[test_case(Comparison::Lt, 4999, 5000 => true)]
    #[test_case(Comparison::Lte, 5001, 5000 => false)]
    #[test_case(Comparison::Eq, 3, 3 => true)]
    fn test_comparison(cmp: Comparison, actual: u64, expected: u64) -> bool {
        cmp.holds(actual, expected)
    }

    #[test]
    fn test_filter_keeps_order_and_is_case_sensitive() {
        let buffer = vec![
            "Failed to load resource: favicon.ico".to_string(),
            "KaTeX parse error: Undefined control sequence".to_string(),
            "MATH overflow".to_string(),
            "math block skipped".to_string(),
        ];
        let keywords = vec!["katex".to_string(), "KaTeX".to_string(), "math".to_string()];

        let hits = filter_errors_by_keyword(&buffer, &keywords);
        assert_eq!(
            hits,
            vec!["KaTeX parse error: Undefined control sequence", "math block skipped"]
        );
    }

    #[test]
    fn test_style_contains_ignores_case() {
        assert!(style_contains("KaTeX_Main, \"Times New Roman\", serif", "katex"));
        assert!(!style_contains("Georgia, serif", "katex"));
    }
}

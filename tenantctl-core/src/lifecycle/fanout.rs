//! Concurrent fan-out over a list of names
//!
//! [`TaskGroup`] runs one tokio task per name. Each task reports through its
//! own oneshot channel and results are joined in input order. A failing
//! unit never cancels its siblings.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::TenancyResult;

/// How a tier reacts to failures reported by the tier below it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Keep going; failures are reported alongside successes
    #[default]
    BestEffort,
    /// Stop at the first reported failure
    FailFast,
}

impl FailurePolicy {
    /// Whether work depending on `report` may proceed
    pub fn proceeds_after(&self, report: &FanOutReport) -> bool {
        match self {
            FailurePolicy::BestEffort => true,
            FailurePolicy::FailFast => report.is_success(),
        }
    }
}

/// Failure policies of a two-tier cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadePolicy {
    /// Siblings of the lower tier, e.g. the tenant-targets of one tenant
    pub leaf: FailurePolicy,
    /// The owner deleted after its children
    pub parent: FailurePolicy,
}

impl Default for CascadePolicy {
    fn default() -> Self {
        Self {
            leaf: FailurePolicy::BestEffort,
            parent: FailurePolicy::FailFast,
        }
    }
}

/// Result of one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub name: String,
    pub error: Option<String>,
}

impl UnitOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-unit results of a fan-out, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutReport {
    outcomes: Vec<UnitOutcome>,
}

impl FanOutReport {
    pub fn new(outcomes: Vec<UnitOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[UnitOutcome] {
        &self.outcomes
    }

    /// One message per unit: empty on success, the error text otherwise
    pub fn messages(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .map(|o| o.error.clone().unwrap_or_default())
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.name.as_str())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(UnitOutcome::is_success)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Append another report, keeping order
    pub fn extend(&mut self, other: FanOutReport) {
        self.outcomes.extend(other.outcomes);
    }
}

/// Runs one concurrent unit per name and joins them all
#[derive(Debug, Clone, Default)]
pub struct TaskGroup {
    deadline: Option<Duration>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail units that run longer than `deadline`
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub async fn run<F, Fut>(&self, names: &[String], unit: F) -> FanOutReport
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = TenancyResult<()>> + Send + 'static,
    {
        let mut pending = Vec::with_capacity(names.len());

        for name in names {
            let (tx, rx) = oneshot::channel::<Result<(), String>>();
            let work = unit(name.clone());
            let deadline = self.deadline;

            tokio::spawn(async move {
                let result = match deadline {
                    Some(limit) => match tokio::time::timeout(limit, work).await {
                        Ok(result) => result.map_err(|e| e.to_string()),
                        Err(_) => Err(format!("deadline of {:?} exceeded", limit)),
                    },
                    None => work.await.map_err(|e| e.to_string()),
                };
                // Receiver only goes away if the joining future was dropped
                let _ = tx.send(result);
            });

            pending.push((name.clone(), rx));
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        for (name, rx) in pending {
            let error = match rx.await {
                Ok(Ok(())) => None,
                Ok(Err(message)) => Some(message),
                Err(_) => Some(format!("{}: unit ended without reporting", name)),
            };

            match &error {
                Some(message) => warn!(unit = %name, error = %message, "Fan-out unit failed"),
                None => debug!(unit = %name, "Fan-out unit completed"),
            }
            outcomes.push(UnitOutcome { name, error });
        }

        FanOutReport { outcomes }
    }

    /// Run units according to `policy`
    ///
    /// Best effort runs every unit concurrently. Fail fast runs them one at a
    /// time and reports the units after the first failure as skipped.
    pub async fn run_with_policy<F, Fut>(
        &self,
        names: &[String],
        policy: FailurePolicy,
        unit: F,
    ) -> FanOutReport
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = TenancyResult<()>> + Send + 'static,
    {
        if policy == FailurePolicy::BestEffort {
            return self.run(names, unit).await;
        }

        let mut report = FanOutReport::default();
        for (index, name) in names.iter().enumerate() {
            let single = self.run(std::slice::from_ref(name), &unit).await;
            let failed = !single.is_success();
            report.extend(single);

            if failed {
                for skipped in &names[index + 1..] {
                    report.outcomes.push(UnitOutcome {
                        name: skipped.clone(),
                        error: Some(format!("{}: skipped after an earlier failure", skipped)),
                    });
                }
                break;
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TenancyError;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let report = TaskGroup::new()
            .run(&names(&["slow", "fast", "broken"]), |name| async move {
                match name.as_str() {
                    "slow" => {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(())
                    }
                    "broken" => Err(TenancyError::validation("boom")),
                    _ => Ok(()),
                }
            })
            .await;

        assert_eq!(report.messages(), vec!["", "", "Validation error: boom"]);
        assert!(!report.is_success());
        assert_eq!(report.succeeded().collect::<Vec<_>>(), vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let finished = Arc::new(AtomicUsize::new(0));
        let report = TaskGroup::new()
            .run(&names(&["a", "b", "c"]), |name| {
                let finished = finished.clone();
                async move {
                    if name == "a" {
                        return Err(TenancyError::validation("a failed"));
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert_eq!(finished.load(Ordering::SeqCst), 2);
        assert_eq!(report.failures().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fails_only_the_slow_unit() {
        let report = TaskGroup::new()
            .with_deadline(Some(Duration::from_secs(1)))
            .run(&names(&["stuck", "quick"]), |name| async move {
                if name == "stuck" {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                Ok(())
            })
            .await;

        let messages = report.messages();
        assert!(messages[0].contains("deadline"));
        assert_eq!(messages[1], "");
    }

    #[tokio::test]
    async fn test_panicking_unit_is_reported() {
        let report = TaskGroup::new()
            .run(&names(&["p"]), |name| async move {
                if name == "p" {
                    panic!("unit panicked");
                }
                Ok(())
            })
            .await;

        assert!(report.messages()[0].contains("without reporting"));
    }

    #[tokio::test]
    async fn test_fail_fast_skips_remaining_units() {
        let report = TaskGroup::new()
            .run_with_policy(&names(&["a", "b", "c"]), FailurePolicy::FailFast, |name| async move {
                if name == "b" {
                    return Err(TenancyError::validation("b failed"));
                }
                Ok(())
            })
            .await;

        let messages = report.messages();
        assert_eq!(messages[0], "");
        assert_eq!(messages[1], "Validation error: b failed");
        assert!(messages[2].contains("skipped"));
    }

    #[test]
    fn test_policies() {
        let clean = FanOutReport::new(vec![UnitOutcome {
            name: "a".into(),
            error: None,
        }]);
        let dirty = FanOutReport::new(vec![UnitOutcome {
            name: "a".into(),
            error: Some("x".into()),
        }]);

        assert!(FailurePolicy::FailFast.proceeds_after(&clean));
        assert!(!FailurePolicy::FailFast.proceeds_after(&dirty));
        assert!(FailurePolicy::BestEffort.proceeds_after(&dirty));
    }
}

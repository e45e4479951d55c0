//! Matrix orchestrator
//!
//! Runs test cases in declared order and aggregates their results. Cases
//! run one at a time by default; a higher `max_concurrent` lets several run
//! at once behind a semaphore, and results are still reported in declared
//! order.

use matrix_core::domain::config::PipelineConfig;
use matrix_core::domain::result::{Report, RunResult, Stage};
use matrix_core::error::PipelineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::context::RunContext;
use crate::scheduler::test_case::TestCase;

/// How cases are scheduled
#[derive(Debug, Clone)]
pub struct RunPolicy {
    /// Stop launching cases after the first failure
    pub fail_fast: bool,

    /// Maximum number of cases in flight
    pub max_concurrent: usize,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            fail_fast: false,
            max_concurrent: 1,
        }
    }
}

enum Scheduled {
    Launched(TestCase, JoinHandle<RunResult>),
    Skipped(TestCase),
}

/// Runs the matrix
pub struct Orchestrator {
    context: Arc<RunContext>,
    policy: RunPolicy,
}

impl Orchestrator {
    pub fn new(context: Arc<RunContext>, policy: RunPolicy) -> Self {
        Self { context, policy }
    }

    /// Runs every case and returns the report in declared order
    pub async fn run_all(&self, config: Arc<PipelineConfig>, cases: Vec<TestCase>) -> Report {
        let limit = self.policy.max_concurrent.max(1);
        info!(
            "Running {} case(s) for run {} (max concurrent: {}, fail fast: {})",
            cases.len(),
            self.context.run_id,
            limit,
            self.policy.fail_fast
        );

        let semaphore = Arc::new(Semaphore::new(limit));
        let failed = Arc::new(AtomicBool::new(false));
        let mut scheduled = Vec::with_capacity(cases.len());

        for case in cases {
            // Acquired before spawning so cases start in declared order
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    scheduled.push(Scheduled::Skipped(case));
                    continue;
                }
            };

            if self.policy.fail_fast && failed.load(Ordering::SeqCst) {
                info!("Skipping {} after an earlier failure", case.name());
                scheduled.push(Scheduled::Skipped(case));
                continue;
            }

            let config = Arc::clone(&config);
            let context = Arc::clone(&self.context);
            let failed = Arc::clone(&failed);
            let task_case = case.clone();
            let handle = tokio::spawn(async move {
                let result = task_case.run(&config, &context).await;
                if result.is_failure() {
                    failed.store(true, Ordering::SeqCst);
                }
                drop(permit);
                result
            });
            scheduled.push(Scheduled::Launched(case, handle));
        }

        let mut results = Vec::with_capacity(scheduled.len());
        for entry in scheduled {
            let result = match entry {
                Scheduled::Launched(case, handle) => match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("Test case {} task panicked: {}", case.name(), e);
                        failed.store(true, Ordering::SeqCst);
                        let error = PipelineError::Aborted(e.to_string());
                        RunResult::failed(
                            case.combination,
                            Stage::SourceUploaded,
                            &error,
                            chrono::Utc::now(),
                            Duration::ZERO,
                        )
                    }
                },
                Scheduled::Skipped(case) => RunResult::skipped(case.combination),
            };
            results.push(result);
        }

        let report = Report::new(self.context.run_id.clone(), results);
        info!(
            "Run {} finished: {} passed, {} failed, {} skipped",
            report.run_id,
            report.passed_count(),
            report.failed_count(),
            report.skipped_count()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, combination};
    use matrix_core::domain::result::Outcome;
    use matrix_core::error::ErrorKind;

    fn three_cases_with_failing_middle() -> Vec<TestCase> {
        let mut middle = combination("host20-node8", "mesh:2.0.14248");
        middle.build_image = "kudulite:broken".to_string();

        vec![
            TestCase::new(combination("host20-python36", "mesh:2.0.14248")),
            TestCase::new(middle),
            TestCase::new(combination("host30-python38", "mesh:3.0.14287-python3.8")),
        ]
    }

    fn harness() -> Harness {
        let harness = Harness::builder().failing_image("kudulite:broken").build();
        harness.add_package("KuduLitePython36.zip");
        harness
    }

    #[tokio::test(start_paused = true)]
    async fn test_continues_after_failure_by_default() {
        let harness = harness();
        let orchestrator = Orchestrator::new(harness.context.clone(), RunPolicy::default());

        let report = orchestrator
            .run_all(harness.config.clone(), three_cases_with_failing_middle())
            .await;

        assert_eq!(report.results.len(), 3);
        let names: Vec<&str> = report
            .results
            .iter()
            .map(|r| r.combination.name.as_str())
            .collect();
        assert_eq!(names, vec!["host20-python36", "host20-node8", "host30-python38"]);

        assert_eq!(report.results[0].outcome, Outcome::Passed);
        assert_eq!(
            report.results[1].failure().map(|f| f.stage),
            Some(Stage::BuildContainerReady)
        );
        assert_eq!(report.results[2].outcome, Outcome::Passed);
        assert!(!report.passed());
        assert_eq!(report.exit_code(), 1);

        // Sequential by default: never more than one container at a time
        assert_eq!(harness.session.peak_running(), 1);
        assert_eq!(harness.session.stops(), harness.session.starts());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_skips_remaining_cases() {
        let harness = harness();
        let policy = RunPolicy {
            fail_fast: true,
            ..RunPolicy::default()
        };
        let orchestrator = Orchestrator::new(harness.context.clone(), policy);

        let report = orchestrator
            .run_all(harness.config.clone(), three_cases_with_failing_middle())
            .await;

        assert_eq!(report.results.len(), 3);
        assert!(report.results[0].is_success());
        assert!(report.results[1].is_failure());
        assert_eq!(report.results[2].outcome, Outcome::Skipped);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(harness.session.starts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_policy_keeps_declared_order() {
        let harness = harness();
        let policy = RunPolicy {
            fail_fast: false,
            max_concurrent: 3,
        };
        let orchestrator = Orchestrator::new(harness.context.clone(), policy);

        let report = orchestrator
            .run_all(harness.config.clone(), three_cases_with_failing_middle())
            .await;

        let names: Vec<&str> = report
            .results
            .iter()
            .map(|r| r.combination.name.as_str())
            .collect();
        assert_eq!(names, vec!["host20-python36", "host20-node8", "host30-python38"]);
        assert_eq!(report.passed_count(), 2);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(harness.session.running(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_after_panicking_case() {
        let harness = Harness::builder().panicking_health().build();
        harness.add_package("KuduLitePython36.zip");
        let policy = RunPolicy {
            fail_fast: true,
            ..RunPolicy::default()
        };
        let orchestrator = Orchestrator::new(harness.context.clone(), policy);
        let cases = vec![
            TestCase::new(combination("host20-python36", "mesh:2.0.14248")),
            TestCase::new(combination("host30-python36", "mesh:3.0.14287-python3.6")),
        ];

        let report = orchestrator.run_all(harness.config.clone(), cases).await;

        let failure = report.results[0].failure().unwrap();
        assert_eq!(failure.kind, ErrorKind::Aborted);
        assert_eq!(failure.stage, Stage::Verified);
        assert_eq!(report.results[1].outcome, Outcome::Skipped);

        // Only the first case ran, and none of its containers leaked
        assert_eq!(harness.session.starts(), 2);
        assert_eq!(harness.session.stops(), 2);
        assert_eq!(harness.session.running(), 0);
    }

    #[tokio::test]
    async fn test_all_passing_report() {
        let harness = harness();
        let orchestrator = Orchestrator::new(harness.context.clone(), RunPolicy::default());
        let cases = vec![TestCase::new(combination("host20-python36", "mesh:2.0.14248"))];

        let report = orchestrator.run_all(harness.config.clone(), cases).await;
        assert!(report.passed());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.run_id, "testrun");
    }
}

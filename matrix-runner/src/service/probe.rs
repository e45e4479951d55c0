//! Runtime probe service
//!
//! Polls a deployed application until it answers with the expected status.

use matrix_core::domain::container::ContainerHandle;
use matrix_core::error::PipelineError;
use matrix_core::retry::RetryPolicy;
use std::sync::Arc;
use tracing::{debug, info};

use crate::repository::HealthRepository;

/// Verifies that a runtime container serves the application
pub struct RuntimeProbe {
    repo: Arc<dyn HealthRepository>,
    policy: RetryPolicy,
}

impl RuntimeProbe {
    /// Creates a new probe
    ///
    /// # Arguments
    /// * `repo` - Health repository used for the GET requests
    /// * `policy` - Attempt budget and backoff between checks
    pub fn new(repo: Arc<dyn HealthRepository>, policy: RetryPolicy) -> Self {
        Self { repo, policy }
    }

    /// Polls `path` until it returns `expected`
    ///
    /// Returns on the first matching response. When the budget runs out the
    /// error carries the last status (or transport error) observed.
    pub async fn verify(
        &self,
        handle: &ContainerHandle,
        path: &str,
        expected: u16,
    ) -> Result<(), PipelineError> {
        let base_url = handle
            .base_url()
            .ok_or_else(|| PipelineError::NotRunning(handle.name().to_string()))?;

        let mut schedule = self.policy.start();
        let mut last_status = None;
        let mut last_observed = String::from("no response");

        while schedule.next().await {
            match self.repo.get(&base_url, path).await {
                Ok(response) if response.status == expected => {
                    info!(
                        "GET {} on {} returned {} after {} attempt(s)",
                        path,
                        handle.name(),
                        expected,
                        schedule.attempts()
                    );
                    return Ok(());
                }
                Ok(response) => {
                    debug!("GET {} on {} returned {}", path, handle.name(), response.status);
                    last_status = Some(response.status);
                    last_observed = if response.body.is_empty() {
                        format!("HTTP {}", response.status)
                    } else {
                        format!("HTTP {}: {}", response.status, response.body)
                    };
                }
                Err(e) => {
                    debug!("GET {} on {} failed: {}", path, handle.name(), e);
                    last_observed = e.to_string();
                }
            }
        }

        Err(PipelineError::Verification {
            path: path.to_string(),
            expected,
            attempts: schedule.attempts(),
            last_status,
            last_observed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedHealthRepository, running_handle};
    use std::time::Duration;

    fn probe(repo: Arc<ScriptedHealthRepository>, attempts: u32) -> RuntimeProbe {
        RuntimeProbe::new(
            repo,
            RetryPolicy::exponential(Duration::from_secs(1), Duration::from_secs(8), attempts),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_on_first_expected_status() {
        let repo = Arc::new(ScriptedHealthRepository::new(vec![
            Err(()),
            Ok((503, "warming up")),
            Ok((200, "Hello")),
            Ok((500, "")),
        ]));

        probe(repo.clone(), 10)
            .verify(&running_handle("runtime", 18080), "/api/HttpTrigger", 200)
            .await
            .unwrap();

        assert_eq!(repo.calls(), 3);
        assert_eq!(repo.paths(), vec!["/api/HttpTrigger"; 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_with_last_observed_status() {
        let repo = Arc::new(ScriptedHealthRepository::new(vec![
            Err(()),
            Ok((404, "")),
            Ok((503, "Function host is not running.")),
        ]));

        let err = probe(repo.clone(), 4)
            .verify(&running_handle("runtime", 18080), "/api/HttpTrigger", 200)
            .await
            .unwrap_err();

        assert_eq!(repo.calls(), 4);
        match err {
            PipelineError::Verification {
                attempts,
                last_status,
                last_observed,
                ..
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(last_status, Some(503));
                assert_eq!(last_observed, "HTTP 503: Function host is not running.");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_application() {
        let repo = Arc::new(ScriptedHealthRepository::new(vec![Err(())]));
        let err = probe(repo, 2)
            .verify(&running_handle("runtime", 18080), "/api/HttpTrigger", 200)
            .await
            .unwrap_err();

        match err {
            PipelineError::Verification { last_status, .. } => assert_eq!(last_status, None),
            other => panic!("unexpected error: {}", other),
        }
    }
}

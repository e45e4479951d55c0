//! Build trigger service
//!
//! Drives a remote build inside a running build container:
//! - Triggering a zip deployment that points at the uploaded source
//! - Polling the latest deployment until it reaches a terminal state
//! - Naming the release artifact the build service published
//!
//! The build service pulls the package itself, using the storage
//! credentials it was started with, so only a reference is sent.

use matrix_client::ClientError;
use matrix_core::domain::artifact::ArtifactReference;
use matrix_core::domain::build::{DeployState, DeploymentStatus};
use matrix_core::domain::container::ContainerHandle;
use matrix_core::error::PipelineError;
use matrix_core::retry::{RetryPolicy, retry};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::repository::BuildRepository;

/// Artifact name the build service publishes for a site
pub fn release_blob_name(site_name: &str) -> String {
    format!("scm-latest-{}.zip", site_name)
}

/// What to build
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Uploaded source package
    pub source: ArtifactReference,

    /// URL the build service downloads the source from
    pub package_uri: String,

    /// Site name the build container was started with
    pub site_name: String,
}

/// Triggers builds and waits for them to finish
pub struct BuildTrigger {
    repo: Arc<dyn BuildRepository>,
    poll: RetryPolicy,
    transport: RetryPolicy,
    destination_container: String,
}

impl BuildTrigger {
    /// Creates a new build trigger
    ///
    /// # Arguments
    /// * `repo` - Build service repository
    /// * `poll` - Status polling policy; its deadline bounds the whole build
    /// * `transport` - Retry policy for transient HTTP failures
    /// * `destination_container` - Container release artifacts are published to
    pub fn new(
        repo: Arc<dyn BuildRepository>,
        poll: RetryPolicy,
        transport: RetryPolicy,
        destination_container: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            poll,
            transport,
            destination_container: destination_container.into(),
        }
    }

    /// Builds the request's source inside `handle` and returns the published artifact
    pub async fn deploy(
        &self,
        handle: &ContainerHandle,
        request: &BuildRequest,
    ) -> Result<ArtifactReference, PipelineError> {
        let base_url = handle
            .base_url()
            .ok_or_else(|| PipelineError::NotRunning(handle.name().to_string()))?;

        info!("Triggering build of {} on {}", request.source, handle.name());
        retry(
            &self.transport,
            &format!("zip deploy on {}", handle.name()),
            ClientError::is_transient,
            || self.repo.zip_deploy(&base_url, &request.package_uri),
        )
        .await
        .map_err(|e| PipelineError::Transport {
            target: format!("{}/api/zipdeploy", base_url),
            attempts: e.attempts,
            message: e.error.to_string(),
        })?;

        let status = self.wait_for_terminal(&base_url).await?;

        match status.state {
            DeployState::Success => {
                let artifact = ArtifactReference::new(
                    &self.destination_container,
                    release_blob_name(&request.site_name),
                );
                info!("Build of {} succeeded, artifact {}", request.source, artifact);
                Ok(artifact)
            }
            _ => Err(PipelineError::BuildFailed {
                deployment: status.id.clone().unwrap_or_else(|| "latest".to_string()),
                message: status
                    .status_text
                    .clone()
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| status.to_string()),
            }),
        }
    }

    /// Polls the latest deployment until it is terminal or the deadline passes
    async fn wait_for_terminal(&self, base_url: &str) -> Result<DeploymentStatus, PipelineError> {
        let mut schedule = self.poll.start();
        let mut last = DeploymentStatus::pending();
        let mut consecutive_errors = 0u32;

        while schedule.next().await {
            let request = self.repo.latest_deployment(base_url);
            let polled = match schedule.remaining() {
                Some(remaining) => tokio::time::timeout(remaining, request).await.ok(),
                None => Some(request.await),
            };

            match polled {
                Some(Ok(status)) => {
                    consecutive_errors = 0;
                    debug!("Deployment status on {}: {}", base_url, status);
                    if status.is_terminal() {
                        return Ok(status);
                    }
                    last = status;
                }
                Some(Err(e)) if e.is_transient() => {
                    consecutive_errors += 1;
                    warn!(
                        "Status poll on {} failed ({}/{}): {}",
                        base_url, consecutive_errors, self.transport.max_attempts, e
                    );
                    if consecutive_errors >= self.transport.max_attempts {
                        return Err(PipelineError::Transport {
                            target: format!("{}/api/deployments/latest", base_url),
                            attempts: consecutive_errors,
                            message: e.to_string(),
                        });
                    }
                }
                Some(Err(e)) => {
                    return Err(PipelineError::Transport {
                        target: format!("{}/api/deployments/latest", base_url),
                        attempts: 1,
                        message: e.to_string(),
                    });
                }
                None => debug!("Status poll on {} hit the build deadline", base_url),
            }
        }

        Err(PipelineError::BuildTimeout {
            waited: schedule.elapsed(),
            last_status: last.to_string(),
        })
    }
}

//! Build-service (Kudu) API endpoints

use matrix_core::domain::build::{DeployState, DeploymentStatus};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::{handle_empty_response, handle_response};

/// HTTP client for the build service running inside a build container
#[derive(Debug, Clone)]
pub struct KuduClient {
    /// Base URL of the build service (e.g., "http://127.0.0.1:49153")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl KuduClient {
    /// Create a new build-service client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new build-service client with a configured reqwest Client
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the build service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Deployment
    // =============================================================================

    /// Trigger an asynchronous zip deploy of a package the service fetches itself
    ///
    /// # Arguments
    /// * `package_uri` - Where the service downloads the source package from
    pub async fn zip_deploy(&self, package_uri: &str) -> Result<()> {
        let url = format!("{}/api/zipdeploy", self.base_url);
        debug!("PUT {} (packageUri={})", url, package_uri);

        let response = self
            .client
            .put(&url)
            .query(&[("isAsync", "true")])
            .json(&ZipDeployRequest {
                package_uri: package_uri.to_string(),
            })
            .send()
            .await?;

        handle_empty_response(response).await
    }

    /// Get the status of the most recent deployment
    ///
    /// The service answers 404 until the first deployment record exists;
    /// that is reported as a pending deployment.
    pub async fn latest_deployment(&self) -> Result<DeploymentStatus> {
        let url = format!("{}/api/deployments/latest", self.base_url);
        let response = self.client.get(&url).send().await?;

        match handle_response::<DeploymentRecord>(response).await {
            Ok(record) => record.into_status(),
            Err(e) if e.is_not_found() => Ok(DeploymentStatus::pending()),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ZipDeployRequest {
    package_uri: String,
}

/// Deployment record as returned by the deployments API
#[derive(Debug, Deserialize)]
struct DeploymentRecord {
    id: Option<String>,
    status: i64,
    status_text: Option<String>,
    #[serde(default)]
    complete: bool,
}

impl DeploymentRecord {
    fn into_status(self) -> Result<DeploymentStatus> {
        let state = DeployState::from_code(self.status).ok_or_else(|| {
            ClientError::ParseError(format!("Unknown deployment status code {}", self.status))
        })?;

        Ok(DeploymentStatus {
            id: self.id,
            state,
            status_text: self.status_text,
            complete: self.complete,
        })
    }
}

//! Build service repository
//!
//! Handles communication with the build service inside a build container:
//! - Triggering a zip deployment from a package URL
//! - Reading the status of the latest deployment

use async_trait::async_trait;
use matrix_client::{ClientError, KuduClient};
use matrix_core::domain::build::DeploymentStatus;
use reqwest::Client;

/// Repository trait for build-service operations
#[async_trait]
pub trait BuildRepository: Send + Sync {
    /// Asks the build service to fetch, build and publish a package
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the build container
    /// * `package_uri` - Location the build service downloads the source from
    async fn zip_deploy(&self, base_url: &str, package_uri: &str) -> Result<(), ClientError>;

    /// Fetches the status of the most recent deployment
    async fn latest_deployment(&self, base_url: &str) -> Result<DeploymentStatus, ClientError>;
}

/// HTTP implementation of BuildRepository
pub struct HttpBuildRepository {
    client: Client,
}

impl HttpBuildRepository {
    /// Creates a new build repository sharing the given HTTP client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn kudu(&self, base_url: &str) -> KuduClient {
        KuduClient::with_client(base_url, self.client.clone())
    }
}

#[async_trait]
impl BuildRepository for HttpBuildRepository {
    async fn zip_deploy(&self, base_url: &str, package_uri: &str) -> Result<(), ClientError> {
        self.kudu(base_url).zip_deploy(package_uri).await
    }

    async fn latest_deployment(&self, base_url: &str) -> Result<DeploymentStatus, ClientError> {
        self.kudu(base_url).latest_deployment().await
    }
}

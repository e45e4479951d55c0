//! Health repository
//!
//! Issues plain GET requests against a deployed application.

use async_trait::async_trait;
use matrix_client::{ClientError, ProbeClient, ProbeResponse};
use reqwest::Client;

/// Repository trait for application health requests
#[async_trait]
pub trait HealthRepository: Send + Sync {
    /// Performs a GET against `path` and reports whatever status came back
    async fn get(&self, base_url: &str, path: &str) -> Result<ProbeResponse, ClientError>;
}

/// HTTP implementation of HealthRepository
pub struct HttpHealthRepository {
    probe: ProbeClient,
}

impl HttpHealthRepository {
    pub fn new(client: Client) -> Self {
        Self {
            probe: ProbeClient::with_client(client),
        }
    }
}

#[async_trait]
impl HealthRepository for HttpHealthRepository {
    async fn get(&self, base_url: &str, path: &str) -> Result<ProbeResponse, ClientError> {
        self.probe.get(base_url, path).await
    }
}

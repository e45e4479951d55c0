//! Application health probing

use reqwest::Client;

use crate::error::Result;
use crate::truncate;

/// What the application answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    /// Start of the response body, for diagnostics
    pub body: String,
}

/// HTTP client for a deployed application's health endpoint
///
/// Unlike the other clients a non-2xx answer is not an error here: the
/// caller decides which status it is waiting for.
#[derive(Debug, Clone, Default)]
pub struct ProbeClient {
    client: Client,
}

impl ProbeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// GET `path` on `base_url`
    pub async fn get(&self, base_url: &str, path: &str) -> Result<ProbeResponse> {
        let url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        Ok(ProbeResponse {
            status,
            body: truncate(body.trim(), 200),
        })
    }
}

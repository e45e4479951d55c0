//! Matrix HTTP Clients
//!
//! Type-safe HTTP clients for the three services a matrix run talks to:
//! - `KuduClient`: the build service hosted in the build container (zip deploy + deployment status)
//! - `BlobClient`: the Azure Blob REST API holding source packages and release artifacts
//! - `ProbeClient`: the deployed application's health endpoint
//!
//! # Example
//!
//! ```no_run
//! use matrix_client::KuduClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let kudu = KuduClient::new("http://127.0.0.1:8181");
//!
//!     kudu.zip_deploy("https://acct.blob.core.windows.net/testsrc/app.zip").await?;
//!     let status = kudu.latest_deployment().await?;
//!
//!     println!("Deployment is {}", status);
//!     Ok(())
//! }
//! ```

mod blob;
pub mod error;
mod kudu;
mod probe;

// Re-export commonly used types
pub use blob::BlobClient;
pub use error::{ClientError, Result};
pub use kudu::KuduClient;
pub use probe::{ProbeClient, ProbeResponse};

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Builds an HTTP client with a per-request timeout
///
/// Every request issued during a run is bounded, so a hung server never
/// stalls a polling loop past its deadline.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .build()
        .map_err(ClientError::from)
}

// =============================================================================
// Response Handlers
// =============================================================================

/// Turn a non-success response into an `ApiError`
///
/// Picks up the `x-ms-error-code` header when the server sends one.
async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = response
        .headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    Err(ClientError::ApiError {
        status: status.as_u16(),
        code,
        message: truncate(message.trim(), 512),
    })
}

/// Handle an API response and deserialize JSON
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    error_for_status(response)
        .await?
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Handle an API response that returns no useful content
async fn handle_empty_response(response: reqwest::Response) -> Result<()> {
    error_for_status(response).await.map(|_| ())
}

/// Shortens a response body for diagnostics
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;

    /// Serves a router on an ephemeral local port and returns its base URL
    pub async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

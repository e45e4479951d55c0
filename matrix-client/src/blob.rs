//! Azure Blob REST endpoints
//!
//! Only the three operations the matrix needs: create a container if it is
//! absent, stream a file into a block blob, and stream a blob to disk.
//! Requests are signed with the account's SharedKey.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Body, Client, Method, Url};
use sha2::Sha256;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::{error_for_status, handle_empty_response};

/// Blob service REST version the requests are signed for
const API_VERSION: &str = "2021-08-06";

/// HTTP client for one storage account's blob service
#[derive(Clone)]
pub struct BlobClient {
    /// Blob endpoint (e.g., "https://acct.blob.core.windows.net")
    endpoint: String,
    account: String,
    /// Decoded account key
    key: Vec<u8>,
    client: Client,
}

impl std::fmt::Debug for BlobClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobClient")
            .field("endpoint", &self.endpoint)
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl BlobClient {
    /// Create a new blob client
    ///
    /// # Arguments
    /// * `endpoint` - Blob service endpoint
    /// * `account` - Storage account name
    /// * `account_key` - Base64 account key
    pub fn new(
        endpoint: impl Into<String>,
        account: impl Into<String>,
        account_key: &str,
    ) -> Result<Self> {
        Self::with_client(endpoint, account, account_key, Client::new())
    }

    /// Create a new blob client with a configured reqwest Client
    pub fn with_client(
        endpoint: impl Into<String>,
        account: impl Into<String>,
        account_key: &str,
        client: Client,
    ) -> Result<Self> {
        let key = STANDARD.decode(account_key.trim()).map_err(|e| {
            ClientError::InvalidRequest(format!("storage account key is not valid base64: {}", e))
        })?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            account: account.into(),
            key,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// URL of a blob
    pub fn blob_url(&self, container: &str, blob: &str) -> String {
        format!("{}/{}/{}", self.endpoint, container, blob)
    }

    // =============================================================================
    // Containers
    // =============================================================================

    /// Create a container unless it already exists
    ///
    /// # Returns
    /// true if the container was created, false if it was already there
    pub async fn create_container(&self, container: &str) -> Result<bool> {
        let url = format!("{}/{}?restype=container", self.endpoint, container);
        let response = self.send(Method::PUT, &url, HeaderMap::new(), None).await?;

        match handle_empty_response(response).await {
            Ok(()) => Ok(true),
            Err(e) if e.error_code() == Some("ContainerAlreadyExists") => Ok(false),
            Err(e) => Err(e),
        }
    }

    // =============================================================================
    // Blobs
    // =============================================================================

    /// Upload a local file as a block blob, replacing any existing blob of the same name
    ///
    /// The file is streamed from disk; it is opened afresh on every call so a
    /// retried upload starts from the first byte.
    ///
    /// # Returns
    /// Number of bytes sent
    pub async fn put_blob(&self, container: &str, blob: &str, source: &Path) -> Result<u64> {
        let url = self.blob_url(container, blob);
        let file = tokio::fs::File::open(source).await?;
        let size = file.metadata().await?.len();

        let mut headers = HeaderMap::new();
        headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/zip"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(size));

        debug!("PUT {} <- {} ({} bytes)", url, source.display(), size);
        let body = Body::wrap_stream(ReaderStream::new(file));
        let response = self.send(Method::PUT, &url, headers, Some(body)).await?;

        handle_empty_response(response).await?;
        Ok(size)
    }

    /// Download a blob straight to a file
    ///
    /// The body is streamed chunk by chunk; nothing beyond the current chunk
    /// is held in memory.
    ///
    /// # Returns
    /// Number of bytes written
    pub async fn download_blob(&self, container: &str, blob: &str, dest: &Path) -> Result<u64> {
        let url = self.blob_url(container, blob);
        debug!("GET {} -> {}", url, dest.display());

        let response = self.send(Method::GET, &url, HeaderMap::new(), None).await?;
        let mut response = error_for_status(response).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    // =============================================================================
    // Signing
    // =============================================================================

    /// Sign and send a request
    async fn send(
        &self,
        method: Method,
        url: &str,
        mut headers: HeaderMap,
        body: Option<Body>,
    ) -> Result<reqwest::Response> {
        let url = Url::parse(url)
            .map_err(|e| ClientError::InvalidRequest(format!("invalid blob URL {}: {}", url, e)))?;

        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        headers.insert("x-ms-date", header_value(&date)?);
        headers.insert("x-ms-version", HeaderValue::from_static(API_VERSION));

        let signature = self.sign(&string_to_sign(&method, &url, &headers, &self.account))?;
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("SharedKey {}:{}", self.account, signature))?,
        );

        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        Ok(request.send().await?)
    }

    /// HMAC-SHA256 of the string-to-sign with the account key, base64 encoded
    fn sign(&self, string_to_sign: &str) -> Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|e| ClientError::InvalidRequest(format!("unusable account key: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ClientError::InvalidRequest(format!("invalid header value: {}", e)))
}

/// Builds the SharedKey string-to-sign for a request
///
/// Standard headers in their fixed order, then the canonicalized `x-ms-*`
/// headers, then the canonicalized resource (`/account/path` plus sorted
/// query parameters).
fn string_to_sign(method: &Method, url: &Url, headers: &HeaderMap, account: &str) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    };

    // A zero length is signed as empty
    let content_length = match header("content-length") {
        "0" => "",
        value => value,
    };

    let mut ms_headers: Vec<(String, String)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or("").trim().to_string(),
            )
        })
        .collect();
    ms_headers.sort();

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_lowercase(), v.into_owned()))
        .collect();
    params.sort();

    let mut out = [
        method.as_str(),
        header("content-encoding"),
        header("content-language"),
        content_length,
        header("content-md5"),
        header("content-type"),
        header("date"),
        header("if-modified-since"),
        header("if-match"),
        header("if-none-match"),
        header("if-unmodified-since"),
        header("range"),
    ]
    .join("\n");
    out.push('\n');

    for (name, value) in ms_headers {
        out.push_str(&format!("{}:{}\n", name, value));
    }

    out.push_str(&format!("/{}{}", account, url.path()));
    for (name, value) in params {
        out.push_str(&format!("\n{}:{}", name, value));
    }

    out
}

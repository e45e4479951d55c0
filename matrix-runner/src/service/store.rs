//! Artifact store service
//!
//! Moves files between the local filesystem and the blob store:
//! - Ensuring a container exists
//! - Uploading a local file as a blob
//! - Downloading a blob into a local file
//!
//! Transient transport failures are retried with the configured backoff.
//! Authentication and not-found failures are permanent and surface at once.

use async_trait::async_trait;
use matrix_client::{BlobClient, ClientError};
use matrix_core::domain::artifact::ArtifactReference;
use matrix_core::error::StoreError;
use matrix_core::retry::{Exhausted, RetryPolicy, retry};
use std::path::Path;
use tracing::{debug, info};

/// Service trait for artifact storage
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Creates the container if it does not exist yet
    async fn ensure_container(&self, container: &str) -> Result<(), StoreError>;

    /// Uploads a local file to the referenced blob, overwriting it
    async fn upload(&self, target: &ArtifactReference, source: &Path) -> Result<(), StoreError>;

    /// Downloads the referenced blob into `dest`
    ///
    /// # Returns
    /// Number of bytes written
    async fn download(&self, source: &ArtifactReference, dest: &Path) -> Result<u64, StoreError>;
}

/// Blob-service implementation of ArtifactStore
pub struct BlobArtifactStore {
    client: BlobClient,
    policy: RetryPolicy,
}

impl BlobArtifactStore {
    /// Creates a new store
    ///
    /// # Arguments
    /// * `client` - Authenticated blob client
    /// * `policy` - Retry policy for transient transport failures
    pub fn new(client: BlobClient, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Maps a client failure on `reference` into a store error
    fn map_error(
        &self,
        reference: &ArtifactReference,
        local: &Path,
        failure: Exhausted<ClientError>,
    ) -> StoreError {
        let Exhausted { error, attempts } = failure;

        match error {
            ClientError::Io(source) => StoreError::Io {
                path: local.to_path_buf(),
                source,
            },
            ref e if matches!(e.status(), Some(401 | 403)) => StoreError::Authentication {
                account: self.client.account().to_string(),
                message: e.to_string(),
            },
            ref e if e.error_code() == Some("ContainerNotFound") => {
                StoreError::ContainerNotFound(reference.container.clone())
            }
            ref e if e.error_code() == Some("BlobNotFound") || e.is_not_found() => {
                StoreError::BlobNotFound {
                    container: reference.container.clone(),
                    blob: reference.blob.clone(),
                }
            }
            e => StoreError::Transport {
                target: reference.to_string(),
                attempts,
                message: e.to_string(),
            },
        }
    }
}

#[async_trait]
impl ArtifactStore for BlobArtifactStore {
    async fn ensure_container(&self, container: &str) -> Result<(), StoreError> {
        let reference = ArtifactReference::new(container, "");
        let created = retry(
            &self.policy,
            &format!("create container {}", container),
            ClientError::is_transient,
            || self.client.create_container(container),
        )
        .await
        .map_err(|e| match self.map_error(&reference, Path::new(""), e) {
            StoreError::BlobNotFound { .. } => StoreError::ContainerNotFound(container.to_string()),
            other => other,
        })?;

        if created {
            info!("Created storage container {}", container);
        } else {
            debug!("Storage container {} already exists", container);
        }
        Ok(())
    }

    async fn upload(&self, target: &ArtifactReference, source: &Path) -> Result<(), StoreError> {
        let size = retry(
            &self.policy,
            &format!("upload {}", target),
            ClientError::is_transient,
            || self.client.put_blob(&target.container, &target.blob, source),
        )
        .await
        .map_err(|e| self.map_error(target, source, e))?;

        info!("Uploaded {} ({} bytes) to {}", source.display(), size, target);
        Ok(())
    }

    async fn download(&self, source: &ArtifactReference, dest: &Path) -> Result<u64, StoreError> {
        let written = retry(
            &self.policy,
            &format!("download {}", source),
            ClientError::is_transient,
            || self.client.download_blob(&source.container, &source.blob, dest),
        )
        .await
        .map_err(|e| self.map_error(source, dest, e))?;

        info!("Downloaded {} ({} bytes) to {}", source, written, dest.display());
        Ok(written)
    }
}

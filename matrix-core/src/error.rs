//! Error taxonomy
//!
//! `ConfigError` is fatal and ends the process before any case runs. Every
//! other error is scoped to a single test case and ends up in its run result.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Invalid or missing process configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is required: {hint}")]
    MissingEnv {
        name: &'static str,
        hint: &'static str,
    },

    #[error("{name} is required: {hint}")]
    MissingArgument {
        name: &'static str,
        hint: &'static str,
    },

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Object store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("authentication to storage account '{account}' failed: {message}")]
    Authentication { account: String, message: String },

    #[error("container '{0}' does not exist")]
    ContainerNotFound(String),

    #[error("blob '{blob}' not found in container '{container}'")]
    BlobNotFound { container: String, blob: String },

    #[error("storage request for {target} failed after {attempts} attempt(s): {message}")]
    Transport {
        target: String,
        attempts: u32,
        message: String,
    },

    #[error("local file error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Container start failures
#[derive(Debug, Error)]
pub enum ContainerStartError {
    #[error("container engine '{engine}' unavailable: {message}")]
    Engine { engine: String, message: String },

    #[error("failed to pull image {image}: {message}")]
    ImagePull { image: String, message: String },

    #[error("failed to launch container from {image}: {message}")]
    Launch { image: String, message: String },

    #[error("container {name} exited before becoming ready (status: {status}); last logs: {logs}")]
    Exited {
        name: String,
        status: String,
        logs: String,
    },

    #[error("container {name} not accepting connections on {address} after {waited:?}")]
    NotReady {
        name: String,
        address: String,
        waited: Duration,
    },
}

/// Classification of a case failure, used in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Store,
    ContainerStart,
    BuildFailed,
    BuildTimeout,
    Verification,
    Transport,
    Staging,
    Aborted,
}

/// Anything that can end a single test case
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    ContainerStart(#[from] ContainerStartError),

    #[error("container {0} is not running")]
    NotRunning(String),

    #[error("build service reported failure for deployment {deployment}: {message}")]
    BuildFailed { deployment: String, message: String },

    #[error("build did not reach a terminal status within {waited:?} (last status: {last_status})")]
    BuildTimeout { waited: Duration, last_status: String },

    #[error(
        "GET {path} never returned {expected} after {attempts} attempt(s); last observed: {last_observed}"
    )]
    Verification {
        path: String,
        expected: u16,
        attempts: u32,
        last_status: Option<u16>,
        last_observed: String,
    },

    #[error("transport failure talking to {target} after {attempts} attempt(s): {message}")]
    Transport {
        target: String,
        attempts: u32,
        message: String,
    },

    #[error("failed to stage artifact: {0}")]
    Staging(String),

    #[error("test case aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Store(_) => ErrorKind::Store,
            PipelineError::ContainerStart(_) | PipelineError::NotRunning(_) => {
                ErrorKind::ContainerStart
            }
            PipelineError::BuildFailed { .. } => ErrorKind::BuildFailed,
            PipelineError::BuildTimeout { .. } => ErrorKind::BuildTimeout,
            PipelineError::Verification { .. } => ErrorKind::Verification,
            PipelineError::Transport { .. } => ErrorKind::Transport,
            PipelineError::Staging(_) => ErrorKind::Staging,
            PipelineError::Aborted(_) => ErrorKind::Aborted,
        }
    }
}

//! Build-service deployment records
//!
//! Mirrors the deployment status the build service reports while a zip
//! deploy is in flight.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployment state as reported by the build service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeployState {
    Pending,
    Building,
    Deploying,
    Failed,
    Success,
}

impl DeployState {
    /// Maps the numeric status code used by the deployments API
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(DeployState::Pending),
            1 => Some(DeployState::Building),
            2 => Some(DeployState::Deploying),
            3 => Some(DeployState::Failed),
            4 => Some(DeployState::Success),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployState::Failed | DeployState::Success)
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeployState::Pending => "pending",
            DeployState::Building => "building",
            DeployState::Deploying => "deploying",
            DeployState::Failed => "failed",
            DeployState::Success => "success",
        };
        f.write_str(s)
    }
}

/// Latest deployment as seen by the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub id: Option<String>,
    pub state: DeployState,
    pub status_text: Option<String>,
    pub complete: bool,
}

impl DeploymentStatus {
    /// Placeholder for "no deployment record yet"
    pub fn pending() -> Self {
        Self {
            id: None,
            state: DeployState::Pending,
            status_text: None,
            complete: false,
        }
    }

    /// True once the service will not change this deployment any more
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_text.as_deref().filter(|t| !t.is_empty()) {
            Some(text) => write!(f, "{} ({})", self.state, text),
            None => write!(f, "{}", self.state),
        }
    }
}

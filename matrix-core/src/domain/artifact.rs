//! Artifact references

use serde::{Deserialize, Serialize};
use std::fmt;

/// Names a blob inside a store container
///
/// Used symmetrically for uploads and downloads; carries no payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactReference {
    pub container: String,
    pub blob: String,
}

impl ArtifactReference {
    pub fn new(container: impl Into<String>, blob: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            blob: blob.into(),
        }
    }
}

impl fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.blob)
    }
}

//! Version combination domain types
//!
//! A combination is one cell of the test matrix: which source project is built
//! by which build-service image and served by which runtime image.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Functions host runtime family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeFamily {
    V2,
    V3,
}

impl RuntimeFamily {
    /// Value of FUNCTIONS_EXTENSION_VERSION for this family
    pub fn extension_version(&self) -> &'static str {
        match self {
            RuntimeFamily::V2 => "~2",
            RuntimeFamily::V3 => "~3",
        }
    }

    /// Host version label used in case names ("20", "30")
    pub fn host_label(&self) -> &'static str {
        match self {
            RuntimeFamily::V2 => "20",
            RuntimeFamily::V3 => "30",
        }
    }
}

/// Language worker of the deployed application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Node,
}

impl Language {
    /// Value of FUNCTIONS_WORKER_RUNTIME
    pub fn worker_runtime(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Node => "node",
        }
    }

    /// Build framework name understood by the build service
    pub fn framework(&self) -> &'static str {
        match self {
            Language::Python => "PYTHON",
            Language::Node => "NODE",
        }
    }
}

/// One matrix cell under test
///
/// Immutable once constructed; a test case owns exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCombination {
    /// Stable case name (e.g. host20-python36)
    pub name: String,
    pub family: RuntimeFamily,
    pub language: Language,
    /// Language version (e.g. 3.6, 10)
    pub language_version: String,
    /// File name of the source project zip
    pub source_package: String,
    pub build_image: String,
    pub runtime_image: String,
    /// Path that must answer 200 once the application is up
    pub health_path: String,
}

impl VersionCombination {
    /// Blob name the source package is uploaded under
    ///
    /// Scoped by run id and case name so cells never share a blob.
    pub fn source_blob_name(&self, run_id: &str) -> String {
        format!("{}/{}/{}", run_id, self.name, self.source_package)
    }

    /// Site name the build service publishes the artifact for
    pub fn site_name(&self, run_id: &str) -> String {
        format!("{}-{}", self.name, run_id).to_lowercase()
    }
}

impl fmt::Display for VersionCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {} on {})",
            self.name,
            self.language.worker_runtime(),
            self.language_version,
            self.runtime_image
        )
    }
}

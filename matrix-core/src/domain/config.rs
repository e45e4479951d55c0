//! Pipeline configuration
//!
//! The process-wide, read-once record every test case receives by reference.

use std::fmt;

use crate::domain::combination::RuntimeFamily;
use crate::error::ConfigError;

/// Container holding the uploaded source project zips
pub const SOURCE_CONTAINER: &str = "testsrc";

/// Container the build service publishes release artifacts into
pub const RELEASE_CONTAINER: &str = "scm-releases";

/// Required environment values, paired with what each one is for
const REQUIRED_ENV: [(&str, &str); 4] = [
    (
        "STORAGE_ACCOUNT_NAME",
        "the storage account name to the src project zips and dest artifacts",
    ),
    (
        "STORAGE_ACCOUNT_KEY",
        "the storage account key to the src project zips and dest artifacts",
    ),
    (
        "V2_RUNTIME_VERSION",
        "the v2 runtime image version tag (e.g. 2.0.14248)",
    ),
    (
        "V3_RUNTIME_VERSION",
        "the v3 runtime image version tag (e.g. 3.0.14287)",
    ),
];

/// Storage account credentials
#[derive(Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    pub account_name: String,
    pub account_key: String,
}

impl StorageCredentials {
    pub fn new(account_name: impl Into<String>, account_key: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            account_key: account_key.into(),
        }
    }

    /// Connection string handed to the build service so it can reach the store itself
    pub fn connection_string(&self) -> String {
        format!(
            "DefaultEndpointsProtocol=https;EndpointSuffix=core.windows.net;AccountName={};AccountKey={}",
            self.account_name, self.account_key
        )
    }

    /// Public blob endpoint of the account
    pub fn default_blob_endpoint(&self) -> String {
        format!("https://{}.blob.core.windows.net", self.account_name)
    }
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .finish()
    }
}

/// Immutable configuration shared by every test case
///
/// Created once at startup from the positional image argument and the
/// process environment, then passed by reference for the rest of the run.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Build-service image every combination builds with
    pub build_image: String,

    pub credentials: StorageCredentials,

    /// Connection descriptor passed into build containers
    pub connection_string: String,

    /// Blob service endpoint (overridable for local emulators)
    pub blob_endpoint: String,

    pub source_container: String,
    pub destination_container: String,

    pub v2_runtime_version: String,
    pub v3_runtime_version: String,
}

impl PipelineConfig {
    /// Builds the configuration from the process environment
    ///
    /// Expected environment variables:
    /// - STORAGE_ACCOUNT_NAME (required)
    /// - STORAGE_ACCOUNT_KEY (required)
    /// - V2_RUNTIME_VERSION (required)
    /// - V3_RUNTIME_VERSION (required)
    /// - STORAGE_BLOB_ENDPOINT (optional, default: https://<account>.blob.core.windows.net)
    pub fn from_env(build_image: impl Into<String>) -> Result<Self, ConfigError> {
        Self::from_lookup(build_image, |key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(build_image: impl Into<String>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let build_image = build_image.into();
        if build_image.trim().is_empty() {
            return Err(ConfigError::MissingArgument {
                name: "build image",
                hint: "the build-service image reference, e.g. mcr.microsoft.com/azure-functions/kudulite:kudu-2.11",
            });
        }

        let required = |index: usize| -> Result<String, ConfigError> {
            let (name, hint) = REQUIRED_ENV[index];
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingEnv { name, hint })
        };

        let account_name = required(0)?;
        let account_key = required(1)?;
        let v2_runtime_version = required(2)?;
        let v3_runtime_version = required(3)?;

        let credentials = StorageCredentials::new(account_name, account_key);
        let blob_endpoint = lookup("STORAGE_BLOB_ENDPOINT")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| credentials.default_blob_endpoint());

        let config = Self {
            build_image,
            connection_string: credentials.connection_string(),
            credentials,
            blob_endpoint: blob_endpoint.trim_end_matches('/').to_string(),
            source_container: SOURCE_CONTAINER.to_string(),
            destination_container: RELEASE_CONTAINER.to_string(),
            v2_runtime_version,
            v3_runtime_version,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.blob_endpoint.starts_with("http://") && !self.blob_endpoint.starts_with("https://")
        {
            return Err(ConfigError::Invalid {
                name: "STORAGE_BLOB_ENDPOINT".to_string(),
                reason: "must start with http:// or https://".to_string(),
            });
        }

        for (name, version) in [
            ("V2_RUNTIME_VERSION", &self.v2_runtime_version),
            ("V3_RUNTIME_VERSION", &self.v3_runtime_version),
        ] {
            if version.contains(char::is_whitespace) || version.contains(':') {
                return Err(ConfigError::Invalid {
                    name: name.to_string(),
                    reason: format!("'{}' is not a valid image tag", version),
                });
            }
        }

        Ok(())
    }

    /// Runtime image tag for a runtime family
    pub fn runtime_version(&self, family: RuntimeFamily) -> &str {
        match family {
            RuntimeFamily::V2 => &self.v2_runtime_version,
            RuntimeFamily::V3 => &self.v3_runtime_version,
        }
    }

    /// URL of a blob in the source container
    pub fn source_blob_url(&self, blob: &str) -> String {
        format!("{}/{}/{}", self.blob_endpoint, self.source_container, blob)
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("build_image", &self.build_image)
            .field("credentials", &self.credentials)
            .field("blob_endpoint", &self.blob_endpoint)
            .field("source_container", &self.source_container)
            .field("destination_container", &self.destination_container)
            .field("v2_runtime_version", &self.v2_runtime_version)
            .field("v3_runtime_version", &self.v3_runtime_version)
            .finish_non_exhaustive()
    }
}

//! Run context
//!
//! Everything a test case needs besides its own combination: the run id,
//! the runner settings and the pipeline components. Built once in `main`
//! and shared by every case.

use anyhow::{Context as _, Result};
use std::sync::Arc;
use tempfile::TempDir;

use crate::config::Settings;
use crate::podman::ContainerSession;
use crate::service::{ArtifactStore, BuildTrigger, RuntimeProbe};

/// Components and settings shared by every test case of a run
pub struct RunContext {
    /// Short id scoping blob, site and container names to this process
    pub run_id: String,

    pub settings: Settings,
    pub store: Arc<dyn ArtifactStore>,
    pub session: Arc<dyn ContainerSession>,
    pub build: BuildTrigger,
    pub probe: RuntimeProbe,
}

impl RunContext {
    /// Creates a fresh scratch directory for one case
    ///
    /// The directory and everything in it is removed when the guard drops.
    pub fn scratch_dir(&self, case: &str) -> Result<TempDir> {
        std::fs::create_dir_all(&self.settings.work_dir).with_context(|| {
            format!(
                "Failed to create work directory {}",
                self.settings.work_dir.display()
            )
        })?;

        tempfile::Builder::new()
            .prefix(&format!("{}-{}-", self.run_id, case))
            .tempdir_in(&self.settings.work_dir)
            .context("Failed to create scratch directory")
    }

    /// Engine-level container name for a case and role ("build", "runtime")
    pub fn container_name(&self, case: &str, role: &str) -> String {
        format!("matrix-{}-{}-{}", self.run_id, case, role)
    }
}

//! Test case
//!
//! Drives one version combination through the pipeline:
//! upload source, start the build container, build, stage the artifact,
//! start the runtime container, verify. The first failing stage ends the
//! case. Every container the case started is stopped before `run` returns,
//! whatever the outcome. A panic inside a stage is caught and recorded as an
//! aborted case at that stage.

use chrono::Utc;
use futures::FutureExt;
use matrix_core::domain::artifact::ArtifactReference;
use matrix_core::domain::combination::VersionCombination;
use matrix_core::domain::config::PipelineConfig;
use matrix_core::domain::container::{ContainerHandle, ContainerSpec};
use matrix_core::domain::result::{RunResult, Stage};
use matrix_core::error::PipelineError;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use tempfile::TempDir;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::context::RunContext;
use crate::service::{BuildRequest, extract_archive};

/// Where the runtime image serves the application from
const SITE_ROOT: &str = "/home/site/wwwroot";

/// Status the health path must answer with
const EXPECTED_STATUS: u16 = 200;

/// A pipeline failure tagged with the stage being attempted
#[derive(Debug)]
struct StageFailure {
    stage: Stage,
    error: PipelineError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, StageFailure>;
}

impl<T, E: Into<PipelineError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, StageFailure> {
        self.map_err(|e| StageFailure {
            stage,
            error: e.into(),
        })
    }
}

/// Resources a case holds until it finishes
struct Held {
    /// Stage being attempted
    stage: Stage,
    containers: Vec<ContainerHandle>,
    scratch: Option<TempDir>,
}

impl Held {
    fn new() -> Self {
        Self {
            stage: Stage::SourceUploaded,
            containers: Vec::new(),
            scratch: None,
        }
    }

    /// Marks the start of a stage
    fn enter(&mut self, stage: Stage) -> Stage {
        self.stage = stage;
        stage
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    }
}

/// One parameterized pipeline run
#[derive(Debug, Clone)]
pub struct TestCase {
    pub combination: VersionCombination,
}

impl TestCase {
    pub fn new(combination: VersionCombination) -> Self {
        Self { combination }
    }

    pub fn name(&self) -> &str {
        &self.combination.name
    }

    /// Runs the case to completion
    ///
    /// Never fails: every error ends up in the returned result.
    pub async fn run(&self, config: &PipelineConfig, ctx: &RunContext) -> RunResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        info!("Running {}", self.combination);

        let mut held = Held::new();
        let caught = AssertUnwindSafe(self.execute(config, ctx, &mut held))
            .catch_unwind()
            .await;
        let outcome = match caught {
            Ok(outcome) => outcome,
            Err(panic) => Err(StageFailure {
                stage: held.stage,
                error: PipelineError::Aborted(panic_message(&*panic)),
            }),
        };

        for handle in held.containers.iter_mut().filter(|h| !h.is_stopped()) {
            ctx.session.stop(handle).await;
        }
        if let Some(scratch) = held.scratch.take() {
            let path = scratch.path().to_path_buf();
            if let Err(e) = scratch.close() {
                warn!("Failed to remove scratch directory {}: {}", path.display(), e);
            }
        }

        let elapsed = clock.elapsed();
        match outcome {
            Ok(()) => {
                info!("{} passed in {:.1?}", self.name(), elapsed);
                RunResult::passed(self.combination.clone(), started_at, elapsed)
            }
            Err(failure) => {
                error!(
                    "{} failed at {}: {}",
                    self.name(),
                    failure.stage,
                    failure.error
                );
                RunResult::failed(
                    self.combination.clone(),
                    failure.stage,
                    &failure.error,
                    started_at,
                    elapsed,
                )
            }
        }
    }

    async fn execute(
        &self,
        config: &PipelineConfig,
        ctx: &RunContext,
        held: &mut Held,
    ) -> Result<(), StageFailure> {
        let combo = &self.combination;

        // Source upload
        let source = ArtifactReference::new(
            &config.source_container,
            combo.source_blob_name(&ctx.run_id),
        );
        let package = ctx.settings.packages_dir.join(&combo.source_package);
        let stage = held.enter(Stage::SourceUploaded);
        ctx.store.upload(&source, &package).await.at(stage)?;

        // Remote build
        let site_name = combo.site_name(&ctx.run_id);
        let build_spec = self.build_spec(config, ctx, &site_name);
        let stage = held.enter(Stage::BuildContainerReady);
        let handle = ctx.session.start(&build_spec).await.at(stage)?;
        debug!(
            "Build service for {} listening on {:?}",
            combo.name,
            ctx.session.address(&handle)
        );
        held.containers.push(handle);
        let build = held.containers.len() - 1;

        let request = BuildRequest {
            package_uri: config.source_blob_url(&source.blob),
            source,
            site_name,
        };
        let stage = held.enter(Stage::BuildComplete);
        let artifact = ctx
            .build
            .deploy(&held.containers[build], &request)
            .await
            .at(stage)?;
        ctx.session.stop(&mut held.containers[build]).await;

        // Artifact staging
        let stage = held.enter(Stage::ArtifactStaged);
        let scratch = ctx
            .scratch_dir(&combo.name)
            .map_err(|e| PipelineError::Staging(format!("{:#}", e)))
            .at(stage)?;
        let scratch = held.scratch.insert(scratch).path().to_path_buf();
        let archive = scratch.join("artifact.zip");
        let wwwroot = scratch.join("wwwroot");
        ctx.store.download(&artifact, &archive).await.at(stage)?;
        extract_archive(&archive, &wwwroot).await.at(stage)?;

        // Runtime deployment and verification
        let runtime_spec = self.runtime_spec(config, ctx, &wwwroot);
        let stage = held.enter(Stage::RuntimeContainerReady);
        let handle = ctx.session.start(&runtime_spec).await.at(stage)?;
        debug!(
            "Runtime for {} listening on {:?}",
            combo.name,
            ctx.session.address(&handle)
        );
        held.containers.push(handle);
        let runtime = held.containers.len() - 1;

        let stage = held.enter(Stage::Verified);
        ctx.probe
            .verify(&held.containers[runtime], &combo.health_path, EXPECTED_STATUS)
            .await
            .at(stage)
    }

    fn build_spec(
        &self,
        config: &PipelineConfig,
        ctx: &RunContext,
        site_name: &str,
    ) -> ContainerSpec {
        let combo = &self.combination;
        ContainerSpec::new(
            &combo.build_image,
            ctx.container_name(&combo.name, "build"),
            ctx.settings.build_port,
        )
        .with_env("AzureWebJobsStorage", &config.connection_string)
        .with_env("WEBSITE_SITE_NAME", site_name)
        .with_env("FUNCTIONS_EXTENSION_VERSION", combo.family.extension_version())
        .with_env("FUNCTIONS_WORKER_RUNTIME", combo.language.worker_runtime())
        .with_env("FRAMEWORK", combo.language.framework())
        .with_env("FRAMEWORK_VERSION", &combo.language_version)
        .with_env("SCM_DO_BUILD_DURING_DEPLOYMENT", "true")
        .with_env("ENABLE_ORYX_BUILD", "true")
    }

    fn runtime_spec(
        &self,
        config: &PipelineConfig,
        ctx: &RunContext,
        wwwroot: &Path,
    ) -> ContainerSpec {
        let combo = &self.combination;
        ContainerSpec::new(
            &combo.runtime_image,
            ctx.container_name(&combo.name, "runtime"),
            ctx.settings.runtime_port,
        )
        .with_env("AzureWebJobsScriptRoot", SITE_ROOT)
        .with_env("AzureFunctionsJobHost__Logging__Console__IsEnabled", "true")
        .with_env("FUNCTIONS_EXTENSION_VERSION", combo.family.extension_version())
        .with_env("FUNCTIONS_WORKER_RUNTIME", combo.language.worker_runtime())
        .with_env("AzureWebJobsStorage", &config.connection_string)
        .with_mount(wwwroot, SITE_ROOT, true)
    }
}

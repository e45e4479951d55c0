//! KuduLite matrix runner
//!
//! Checks a build-service image against every supported runtime and
//! language combination: each source project is built remotely by the
//! image under test, the published artifact is deployed into the matching
//! runtime image, and the application's HTTP trigger must answer 200.
//!
//! Architecture:
//! - Configuration: pipeline config and runner settings from the environment
//! - Repositories: HTTP communication with the build service and the app
//! - Services: artifact store, build trigger, staging, runtime probe
//! - Scheduler: per-combination test cases and the matrix orchestrator

mod config;
mod context;
mod matrix;
mod podman;
mod report;
mod repository;
mod scheduler;
mod service;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use matrix_client::BlobClient;
use matrix_core::domain::config::PipelineConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Settings;
use crate::context::RunContext;
use crate::podman::{ContainerSession, PodmanSession, check_engine_available};
use crate::repository::{HttpBuildRepository, HttpHealthRepository};
use crate::scheduler::{Orchestrator, RunPolicy, TestCase};
use crate::service::{ArtifactStore, BlobArtifactStore, BuildTrigger, RuntimeProbe};

const EXAMPLE_IMAGE: &str = "mcr.microsoft.com/azure-functions/kudulite:kudu-2.11";

#[derive(Parser)]
#[command(name = "kudulite-matrix")]
#[command(about = "Build/deploy/verify matrix for KuduLite images", long_about = None)]
struct Cli {
    /// Build-service image to test
    image: Option<String>,

    /// Stop launching combinations after the first failure
    #[arg(long)]
    fail_fast: bool,

    /// Number of combinations allowed to run at once
    #[arg(long, env = "MAX_CONCURRENT", default_value_t = 1)]
    max_concurrent: usize,

    /// Only run the named combination (repeatable)
    #[arg(long, value_name = "CASE")]
    only: Vec<String>,

    /// Print the matrix and exit
    #[arg(long)]
    list: bool,

    /// Write the JSON report to this path
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "matrix_runner=info,matrix_client=info,matrix_core=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let Some(image) = cli.image.clone() else {
        eprintln!("{}", "Usage: kudulite-matrix <image-name>".red().bold());
        eprintln!("{}", "Example:".red().bold());
        eprintln!("{}", format!("    kudulite-matrix {}", EXAMPLE_IMAGE).red().bold());
        return ExitCode::FAILURE;
    };

    let config = match PipelineConfig::from_env(image) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.to_string().red().bold());
            return ExitCode::FAILURE;
        }
    };

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{}", format!("{:#}", e).red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: PipelineConfig) -> Result<ExitCode> {
    let settings = Settings::from_env().context("Invalid runner settings")?;
    info!("Loaded configuration: {:?}", config);

    let cases = matrix::select(matrix::default_matrix(&config), &cli.only)?;
    if cli.list {
        report::print_matrix(&cases);
        return Ok(ExitCode::SUCCESS);
    }

    check_engine_available(&settings.engine).await?;

    let run_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
    info!("Starting matrix run {} with {} case(s)", run_id, cases.len());

    let http = matrix_client::http_client(settings.http_timeout)
        .context("Failed to create HTTP client")?;

    let blob = BlobClient::with_client(
        &config.blob_endpoint,
        &config.credentials.account_name,
        &config.credentials.account_key,
        http.clone(),
    )
    .context("Failed to create blob client")?;
    let store: Arc<dyn ArtifactStore> =
        Arc::new(BlobArtifactStore::new(blob, settings.transport_policy()));

    // Both containers must be reachable before any case runs
    for container in [&config.source_container, &config.destination_container] {
        store
            .ensure_container(container)
            .await
            .with_context(|| format!("Storage container {} is not usable", container))?;
    }

    let session: Arc<dyn ContainerSession> = Arc::new(PodmanSession::new(
        &settings.engine,
        settings.container_start_timeout,
        settings.readiness_interval,
    ));
    let build = BuildTrigger::new(
        Arc::new(HttpBuildRepository::new(http.clone())),
        settings.build_poll_policy(),
        settings.transport_policy(),
        &config.destination_container,
    );
    let probe = RuntimeProbe::new(
        Arc::new(HttpHealthRepository::new(http)),
        settings.health_policy(),
    );

    let context = Arc::new(RunContext {
        run_id,
        settings,
        store,
        session,
        build,
        probe,
    });

    let policy = RunPolicy {
        fail_fast: cli.fail_fast,
        max_concurrent: cli.max_concurrent,
    };
    let cases = cases.into_iter().map(TestCase::new).collect();
    let report = Orchestrator::new(context, policy)
        .run_all(Arc::new(config), cases)
        .await;

    report::print_report(&report);
    if let Some(path) = &cli.report {
        report::write_json(&report, path)?;
        info!("Wrote report to {}", path.display());
    }

    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

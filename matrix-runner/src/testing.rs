//! In-memory fakes for the pipeline components

use async_trait::async_trait;
use matrix_client::{ClientError, ProbeResponse};
use matrix_core::domain::artifact::ArtifactReference;
use matrix_core::domain::build::{DeployState, DeploymentStatus};
use matrix_core::domain::combination::{Language, RuntimeFamily, VersionCombination};
use matrix_core::domain::config::PipelineConfig;
use matrix_core::domain::container::{ContainerHandle, ContainerSpec};
use matrix_core::error::{ContainerStartError, StoreError};
use matrix_core::retry::RetryPolicy;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::config::Settings;
use crate::context::RunContext;
use crate::podman::ContainerSession;
use crate::repository::{BuildRepository, HealthRepository};
use crate::service::{ArtifactStore, BuildTrigger, RuntimeProbe};

pub fn pipeline_config() -> PipelineConfig {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("STORAGE_ACCOUNT_NAME", "kuduteststore"),
        ("STORAGE_ACCOUNT_KEY", "c2VjcmV0"),
        ("V2_RUNTIME_VERSION", "2.0.14248"),
        ("V3_RUNTIME_VERSION", "3.0.14287"),
    ]);
    PipelineConfig::from_lookup("mcr.microsoft.com/azure-functions/kudulite:kudu-2.11", |k| {
        vars.get(k).map(|v| v.to_string())
    })
    .unwrap()
}

/// A Python 3.6 combination with the given name and runtime image
pub fn combination(name: &str, runtime_image: &str) -> VersionCombination {
    VersionCombination {
        name: name.to_string(),
        family: RuntimeFamily::V2,
        language: Language::Python,
        language_version: "3.6".to_string(),
        source_package: "KuduLitePython36.zip".to_string(),
        build_image: "kudulite:kudu-2.11".to_string(),
        runtime_image: runtime_image.to_string(),
        health_path: "/api/HttpTrigger".to_string(),
    }
}

pub fn running_handle(name: &str, port: u16) -> ContainerHandle {
    let address = SocketAddr::from(([127, 0, 0, 1], port));
    let mut handle = ContainerHandle::starting("image", name, format!("{}-id", name), address);
    handle.mark_running();
    handle
}

/// A minimal function app archive
pub fn sample_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();

    writer.start_file("host.json", options).unwrap();
    writer.write_all(br#"{"version": "2.0"}"#).unwrap();
    writer.start_file("HttpTrigger/function.json", options).unwrap();
    writer
        .write_all(br#"{"bindings": [{"type": "httpTrigger", "direction": "in"}]}"#)
        .unwrap();

    writer.finish().unwrap().into_inner()
}

// =============================================================================
// Container session
// =============================================================================

#[derive(Default)]
struct SessionState {
    started: Vec<ContainerSpec>,
    stops: usize,
    running: usize,
    peak_running: usize,
}

/// Container session that never touches an engine
#[derive(Default)]
pub struct FakeSession {
    failing_images: HashSet<String>,
    state: Mutex<SessionState>,
}

impl FakeSession {
    pub fn new(failing_images: HashSet<String>) -> Self {
        Self {
            failing_images,
            state: Mutex::default(),
        }
    }

    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().started.len()
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    pub fn running(&self) -> usize {
        self.state.lock().unwrap().running
    }

    pub fn peak_running(&self) -> usize {
        self.state.lock().unwrap().peak_running
    }

    pub fn started_specs(&self) -> Vec<ContainerSpec> {
        self.state.lock().unwrap().started.clone()
    }
}

#[async_trait]
impl ContainerSession for FakeSession {
    async fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle, ContainerStartError> {
        tokio::task::yield_now().await;

        if self.failing_images.contains(&spec.image) {
            return Err(ContainerStartError::Launch {
                image: spec.image.clone(),
                message: "manifest unknown".to_string(),
            });
        }

        let mut state = self.state.lock().unwrap();
        state.started.push(spec.clone());
        state.running += 1;
        state.peak_running = state.peak_running.max(state.running);

        let port = 20000 + state.started.len() as u16;
        let mut handle = ContainerHandle::starting(
            &spec.image,
            &spec.name,
            format!("fake-{}", port),
            SocketAddr::from(([127, 0, 0, 1], port)),
        );
        handle.mark_running();
        Ok(handle)
    }

    async fn stop(&self, handle: &mut ContainerHandle) {
        if handle.is_stopped() {
            return;
        }
        let mut state = self.state.lock().unwrap();
        state.stops += 1;
        state.running -= 1;
        handle.mark_stopped();
    }
}

// =============================================================================
// Artifact store
// =============================================================================

/// Artifact store backed by a map
///
/// Downloads from the release container of blobs nobody uploaded return the
/// configured release artifact, standing in for the build service publishing.
pub struct MemoryArtifactStore {
    blobs: Mutex<HashMap<ArtifactReference, Vec<u8>>>,
    downloads: Mutex<Vec<ArtifactReference>>,
    release_container: String,
    release_artifact: Vec<u8>,
}

impl MemoryArtifactStore {
    pub fn new(release_container: &str, release_artifact: Vec<u8>) -> Self {
        Self {
            blobs: Mutex::default(),
            downloads: Mutex::default(),
            release_container: release_container.to_string(),
            release_artifact,
        }
    }

    pub fn contains(&self, container: &str, blob: &str) -> bool {
        self.blobs
            .lock()
            .unwrap()
            .contains_key(&ArtifactReference::new(container, blob))
    }

    pub fn downloads(&self) -> Vec<ArtifactReference> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn ensure_container(&self, _container: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upload(&self, target: &ArtifactReference, source: &Path) -> Result<(), StoreError> {
        let body = tokio::fs::read(source).await.map_err(|e| StoreError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        self.blobs.lock().unwrap().insert(target.clone(), body);
        Ok(())
    }

    async fn download(&self, source: &ArtifactReference, dest: &Path) -> Result<u64, StoreError> {
        self.downloads.lock().unwrap().push(source.clone());

        let body = match self.blobs.lock().unwrap().get(source) {
            Some(body) => body.clone(),
            None if source.container == self.release_container => self.release_artifact.clone(),
            None => {
                return Err(StoreError::BlobNotFound {
                    container: source.container.clone(),
                    blob: source.blob.clone(),
                });
            }
        };

        tokio::fs::write(dest, &body).await.map_err(|e| StoreError::Io {
            path: dest.to_path_buf(),
            source: e,
        })?;
        Ok(body.len() as u64)
    }
}

// =============================================================================
// Repositories
// =============================================================================

/// Build service that replays scripted statuses, repeating the last one
///
/// An `Err(status)` entry answers with that HTTP status. An empty script
/// reports success straight away.
pub struct ScriptedBuildRepository {
    script: Mutex<VecDeque<Result<DeploymentStatus, u16>>>,
    hang: bool,
    package_uris: Mutex<Vec<String>>,
}

impl ScriptedBuildRepository {
    pub fn new(script: Vec<Result<DeploymentStatus, u16>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            hang: false,
            package_uris: Mutex::default(),
        }
    }

    /// Status requests never complete
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new(vec![])
        }
    }

    pub fn deploy_calls(&self) -> usize {
        self.package_uris.lock().unwrap().len()
    }

    pub fn package_uris(&self) -> Vec<String> {
        self.package_uris.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildRepository for ScriptedBuildRepository {
    async fn zip_deploy(&self, _base_url: &str, package_uri: &str) -> Result<(), ClientError> {
        self.package_uris
            .lock()
            .unwrap()
            .push(package_uri.to_string());
        Ok(())
    }

    async fn latest_deployment(&self, _base_url: &str) -> Result<DeploymentStatus, ClientError> {
        if self.hang {
            std::future::pending::<()>().await;
        }

        let next = {
            let mut script = self.script.lock().unwrap();
            match script.len() {
                0 => Ok(DeploymentStatus {
                    id: Some("scripted".to_string()),
                    state: DeployState::Success,
                    status_text: None,
                    complete: true,
                }),
                1 => script[0].clone(),
                _ => script.pop_front().unwrap(),
            }
        };
        next.map_err(|status| ClientError::api_error(status, "scripted failure"))
    }
}

/// Application that replays scripted responses, repeating the last one
///
/// `Err(())` stands for a refused connection. An empty script answers 200.
pub struct ScriptedHealthRepository {
    script: Mutex<VecDeque<Result<(u16, String), ()>>>,
    panics: bool,
    paths: Mutex<Vec<String>>,
}

impl ScriptedHealthRepository {
    pub fn new(script: Vec<Result<(u16, &str), ()>>) -> Self {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|r| r.map(|(status, body)| (status, body.to_string())))
                    .collect(),
            ),
            panics: false,
            paths: Mutex::default(),
        }
    }

    /// Every request panics
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::new(vec![])
        }
    }

    pub fn calls(&self) -> usize {
        self.paths.lock().unwrap().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl HealthRepository for ScriptedHealthRepository {
    async fn get(&self, _base_url: &str, path: &str) -> Result<ProbeResponse, ClientError> {
        self.paths.lock().unwrap().push(path.to_string());
        if self.panics {
            panic!("health endpoint exploded");
        }

        let next = {
            let mut script = self.script.lock().unwrap();
            match script.len() {
                0 => Ok((200, String::new())),
                1 => script[0].clone(),
                _ => script.pop_front().unwrap(),
            }
        };

        match next {
            Ok((status, body)) => Ok(ProbeResponse { status, body }),
            Err(()) => Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A run context wired to fakes, with its own packages and work directories
pub struct Harness {
    pub config: Arc<PipelineConfig>,
    pub context: Arc<RunContext>,
    pub session: Arc<FakeSession>,
    pub store: Arc<MemoryArtifactStore>,
    pub health: Arc<ScriptedHealthRepository>,
    root: TempDir,
}

#[derive(Default)]
pub struct HarnessBuilder {
    build_statuses: Vec<Result<DeploymentStatus, u16>>,
    health: Vec<Result<(u16, &'static str), ()>>,
    panicking_health: bool,
    failing_images: HashSet<String>,
}

impl HarnessBuilder {
    pub fn build_statuses(mut self, statuses: Vec<Result<DeploymentStatus, u16>>) -> Self {
        self.build_statuses = statuses;
        self
    }

    pub fn health(mut self, responses: Vec<Result<(u16, &'static str), ()>>) -> Self {
        self.health = responses;
        self
    }

    pub fn panicking_health(mut self) -> Self {
        self.panicking_health = true;
        self
    }

    pub fn failing_image(mut self, image: &str) -> Self {
        self.failing_images.insert(image.to_string());
        self
    }

    pub fn build(self) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings {
            packages_dir: root.path().join("packages"),
            work_dir: root.path().join("work"),
            ..Settings::default()
        };
        std::fs::create_dir_all(&settings.packages_dir).unwrap();
        std::fs::create_dir_all(&settings.work_dir).unwrap();

        let config = Arc::new(pipeline_config());
        let session = Arc::new(FakeSession::new(self.failing_images));
        let store = Arc::new(MemoryArtifactStore::new(
            &config.destination_container,
            sample_zip(),
        ));
        let health = Arc::new(if self.panicking_health {
            ScriptedHealthRepository::panicking()
        } else {
            ScriptedHealthRepository::new(self.health)
        });

        let build = BuildTrigger::new(
            Arc::new(ScriptedBuildRepository::new(self.build_statuses)),
            RetryPolicy::until(Duration::from_secs(5), Duration::from_secs(60)),
            RetryPolicy::exponential(Duration::from_secs(1), Duration::from_secs(4), 3),
            &config.destination_container,
        );
        let probe = RuntimeProbe::new(
            health.clone(),
            RetryPolicy::exponential(Duration::from_secs(1), Duration::from_secs(4), 3),
        );

        let context = Arc::new(RunContext {
            run_id: "testrun".to_string(),
            settings,
            store: store.clone(),
            session: session.clone(),
            build,
            probe,
        });

        Harness {
            config,
            context,
            session,
            store,
            health,
            root,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Puts a source package into the packages directory
    pub fn add_package(&self, name: &str) {
        std::fs::write(self.root.path().join("packages").join(name), sample_zip()).unwrap();
    }
}

//! Container engine management
//!
//! Handles container lifecycle for test cases:
//! - Checking the engine is installed and working
//! - Making sure images are present locally (pulling when needed)
//! - Launching detached containers with a published service port
//! - Waiting until the published port holds a connection open
//! - Force-removing containers when a case is done with them
//!
//! The engine is driven through its CLI, so podman and docker both work.
//!
//! Docker's userland proxy and podman's rootlessport accept connections on
//! the published port before anything listens inside the container, then
//! close them. A probe connection therefore only counts once it stays open
//! for a probe interval. Readiness still says nothing about the service
//! answering requests; callers retry their first requests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use matrix_core::domain::container::{ContainerHandle, ContainerSpec};
use matrix_core::error::ContainerStartError;
use matrix_core::retry::RetryPolicy;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::Output;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Checks that the container engine is installed and answering
pub async fn check_engine_available(engine: &str) -> Result<()> {
    let output = Command::new(engine)
        .arg("--version")
        .output()
        .await
        .with_context(|| {
            format!(
                "Failed to execute '{} --version'. Is {} installed?",
                engine, engine
            )
        })?;

    if !output.status.success() {
        anyhow::bail!("{} is not working correctly", engine);
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Container engine is available: {}", version.trim());

    Ok(())
}

/// Starts and stops containers for test cases
#[async_trait]
pub trait ContainerSession: Send + Sync {
    /// Starts a container and waits until its service port accepts connections
    ///
    /// On failure nothing is left running.
    async fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle, ContainerStartError>;

    /// Stops and removes a container
    ///
    /// Best effort and idempotent: stopping a stopped handle does nothing.
    async fn stop(&self, handle: &mut ContainerHandle);

    /// Host address of the container's published port, while it is running
    fn address(&self, handle: &ContainerHandle) -> Option<SocketAddr> {
        handle.address()
    }
}

/// Container session backed by the podman (or docker) CLI
pub struct PodmanSession {
    engine: String,
    start_timeout: Duration,
    probe_interval: Duration,
}

impl PodmanSession {
    /// Creates a new session
    ///
    /// # Arguments
    /// * `engine` - Engine binary (e.g. "podman")
    /// * `start_timeout` - How long a container may take to accept connections
    /// * `probe_interval` - Delay between readiness probes
    pub fn new(
        engine: impl Into<String>,
        start_timeout: Duration,
        probe_interval: Duration,
    ) -> Self {
        Self {
            engine: engine.into(),
            start_timeout,
            probe_interval,
        }
    }

    /// Runs an engine subcommand and captures its output
    async fn engine<I, S>(&self, args: I) -> Result<Output, ContainerStartError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        Command::new(&self.engine)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ContainerStartError::Engine {
                engine: self.engine.clone(),
                message: e.to_string(),
            })
    }

    /// Makes sure the image is available locally, pulling it if needed
    async fn ensure_image(&self, image: &str) -> Result<(), ContainerStartError> {
        let inspect = self.engine(["image", "inspect", image]).await?;
        if inspect.status.success() {
            debug!("Image {} already present", image);
            return Ok(());
        }

        info!("Pulling image {}", image);
        let pull = self.engine(["pull", image]).await?;
        if !pull.status.success() {
            return Err(ContainerStartError::ImagePull {
                image: image.to_string(),
                message: stderr_of(&pull),
            });
        }

        debug!("Pulled image {}", image);
        Ok(())
    }

    /// Reads the host address the engine published the container port on
    async fn published_address(
        &self,
        name: &str,
        port: u16,
    ) -> Result<SocketAddr, ContainerStartError> {
        let output = self.engine(["port", name, &format!("{}/tcp", port)]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        parse_port_output(&stdout).ok_or_else(|| ContainerStartError::Launch {
            image: name.to_string(),
            message: format!(
                "no host port published for {}/tcp: {}",
                port,
                stderr_of(&output)
            ),
        })
    }

    /// Container status as reported by the engine (e.g. "running", "exited")
    async fn container_status(&self, name: &str) -> Option<String> {
        let output = self
            .engine(["inspect", "--format", "{{.State.Status}}", name])
            .await
            .ok()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Last lines of a container's output
    async fn tail_logs(&self, name: &str) -> String {
        match self.engine(["logs", "--tail", "20", name]).await {
            Ok(output) => {
                let mut logs = String::from_utf8_lossy(&output.stdout).trim().to_string();
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.trim().is_empty() {
                    if !logs.is_empty() {
                        logs.push('\n');
                    }
                    logs.push_str(stderr.trim());
                }
                logs
            }
            Err(e) => format!("<logs unavailable: {}>", e),
        }
    }

    /// Polls the published port until a connection to it stays open
    async fn wait_ready(
        &self,
        handle: &ContainerHandle,
        address: SocketAddr,
    ) -> Result<(), ContainerStartError> {
        let mut schedule = RetryPolicy::until(self.probe_interval, self.start_timeout).start();

        while schedule.next().await {
            if holds_connection(address, self.probe_interval).await {
                debug!(
                    "Container {} accepting connections on {} after {} probe(s)",
                    handle.name(),
                    address,
                    schedule.attempts()
                );
                return Ok(());
            }

            match self.container_status(handle.name()).await {
                Some(status) if matches!(status.as_str(), "exited" | "dead") => {
                    return Err(ContainerStartError::Exited {
                        name: handle.name().to_string(),
                        status,
                        logs: self.tail_logs(handle.name()).await,
                    });
                }
                Some(status) => debug!("Container {} is {}", handle.name(), status),
                None => {}
            }
        }

        Err(ContainerStartError::NotReady {
            name: handle.name().to_string(),
            address: address.to_string(),
            waited: schedule.elapsed(),
        })
    }

    /// Force-removes a container by name
    async fn remove(&self, name: &str) {
        match self.engine(["rm", "-f", name]).await {
            Ok(output) if output.status.success() => {
                debug!("Container {} removed", name);
            }
            Ok(output) => {
                warn!("Failed to remove container {}: {}", name, stderr_of(&output));
            }
            Err(e) => {
                warn!("Failed to remove container {}: {}", name, e);
            }
        }
    }
}

#[async_trait]
impl ContainerSession for PodmanSession {
    async fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle, ContainerStartError> {
        self.ensure_image(&spec.image).await?;

        let env_names: Vec<&str> = spec.env.iter().map(|(k, _)| k.as_str()).collect();
        info!(
            "Creating container {} from {} (env: {})",
            spec.name,
            spec.image,
            env_names.join(", ")
        );

        let output = self.engine(run_args(spec)).await?;
        if !output.status.success() {
            // A half-created container can hold the name
            self.remove(&spec.name).await;
            return Err(ContainerStartError::Launch {
                image: spec.image.clone(),
                message: stderr_of(&output),
            });
        }
        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("Container {} created with ID: {}", spec.name, container_id);

        let address = match self.published_address(&spec.name, spec.port).await {
            Ok(address) => address,
            Err(e) => {
                self.remove(&spec.name).await;
                return Err(e);
            }
        };

        let mut handle = ContainerHandle::starting(&spec.image, &spec.name, container_id, address);
        if let Err(e) = self.wait_ready(&handle, address).await {
            self.remove(&spec.name).await;
            handle.mark_stopped();
            return Err(e);
        }

        handle.mark_running();
        info!("Container {} ready on {}", spec.name, address);
        Ok(handle)
    }

    async fn stop(&self, handle: &mut ContainerHandle) {
        if handle.is_stopped() {
            return;
        }

        debug!("Stopping container {} (image: {})", handle.name(), handle.image());
        self.remove(handle.name()).await;
        handle.mark_stopped();
    }
}

/// Connects to `address` and checks the peer keeps the connection open
///
/// A peer that stays silent for `window` or sends data counts; one that
/// closes or resets the connection does not.
async fn holds_connection(address: SocketAddr, window: Duration) -> bool {
    let Ok(Ok(mut stream)) = tokio::time::timeout(window, TcpStream::connect(address)).await
    else {
        return false;
    };

    let mut byte = [0u8; 1];
    match tokio::time::timeout(window, stream.read(&mut byte)).await {
        Err(_) => true,
        Ok(Ok(read)) => read > 0,
        Ok(Err(_)) => false,
    }
}

/// Arguments for `run` that launch a spec detached with its port published on loopback
fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--publish".to_string(),
        format!("127.0.0.1::{}", spec.port),
    ];

    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }

    for mount in &spec.mounts {
        let mut volume = format!("{}:{}", mount.host_path.display(), mount.container_path);
        if mount.read_only {
            volume.push_str(":ro");
        }
        args.push("-v".to_string());
        args.push(volume);
    }

    args.push(spec.image.clone());
    args
}

/// Parses `port` output ("0.0.0.0:43567", "[::]:43567", ...) into a connectable address
fn parse_port_output(output: &str) -> Option<SocketAddr> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<SocketAddr>().ok())
        .map(|mut addr| {
            if addr.ip().is_unspecified() {
                addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
            }
            addr
        })
        .next()
}

fn stderr_of(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        format!("exit status {}", output.status.code().unwrap_or(-1))
    } else {
        trimmed.to_string()
    }
}

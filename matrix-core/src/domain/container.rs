//! Container domain types

use std::net::SocketAddr;
use std::path::PathBuf;

/// Lifecycle state of a container handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Starting,
    Running,
    Stopped,
}

/// Host directory mounted into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

/// Everything needed to start one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    /// Container name, unique per run
    pub name: String,
    /// Port the service listens on inside the container
    pub port: u16,
    pub env: Vec<(String, String)>,
    pub mounts: Vec<Mount>,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>, name: impl Into<String>, port: u16) -> Self {
        Self {
            image: image.into(),
            name: name.into(),
            port,
            env: Vec::new(),
            mounts: Vec::new(),
        }
    }

    /// Adds an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Adds a bind mount
    pub fn with_mount(
        mut self,
        host_path: impl Into<PathBuf>,
        container_path: impl Into<String>,
        read_only: bool,
    ) -> Self {
        self.mounts.push(Mount {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only,
        });
        self
    }
}

/// A started container
///
/// Owned by the test case that started it. The address is only handed out
/// while the handle is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    image: String,
    name: String,
    id: String,
    address: SocketAddr,
    state: ContainerState,
}

impl ContainerHandle {
    /// Creates a handle for a container that has not passed readiness yet
    pub fn starting(
        image: impl Into<String>,
        name: impl Into<String>,
        id: impl Into<String>,
        address: SocketAddr,
    ) -> Self {
        Self {
            image: image.into(),
            name: name.into(),
            id: id.into(),
            address,
            state: ContainerState::Starting,
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.state == ContainerState::Stopped
    }

    /// host:port of the published service port, if running
    pub fn address(&self) -> Option<SocketAddr> {
        self.is_running().then_some(self.address)
    }

    /// http://host:port base URL, if running
    pub fn base_url(&self) -> Option<String> {
        self.address().map(|addr| format!("http://{}", addr))
    }

    pub fn mark_running(&mut self) {
        if self.state == ContainerState::Starting {
            self.state = ContainerState::Running;
        }
    }

    pub fn mark_stopped(&mut self) {
        self.state = ContainerState::Stopped;
    }
}

//! Container-runtime control plane.
//!
//! Everything the engines know about a target comes through [`ContainerRuntime`]:
//! static attributes from `inspect`, command output from `exec`, and byte-exact
//! file writes. [`Target`] wraps one inspected container and puts a deadline on
//! every call so an unresponsive target cannot stall a batch.

pub mod docker;
pub mod http;
pub mod mock;

use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub use docker::DockerRuntime;
pub use http::{HttpClient, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use mock::{MockRuntime, MockTarget};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("target not found: {0}")]
    NotFound(String),

    #[error("{operation} timed out after {}s", .timeout.as_secs())]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("container runtime error: {0}")]
    Api(String),

    #[error("exec `{command}` failed: {message}")]
    Exec { command: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortBinding {
    pub container_port: u16,
    pub protocol: String,
    pub host_port: Option<u16>,
}

/// Static attributes of a running container.
#[derive(Debug, Clone, Serialize)]
pub struct TargetInfo {
    pub id: String,
    pub name: String,
    pub env: Vec<(String, String)>,
    pub ports: Vec<PortBinding>,
    /// Address on the container network, if attached to one
    pub ip_address: Option<String>,
    pub working_dir: String,
}

impl TargetInfo {
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list_targets(&self) -> Result<Vec<TargetSummary>, RuntimeError>;

    async fn inspect(&self, target: &str) -> Result<TargetInfo, RuntimeError>;

    /// Runs `cmd` as an argv vector. No shell is involved.
    async fn exec(&self, target: &str, cmd: &[&str]) -> Result<ExecOutput, RuntimeError>;

    /// Writes `content` verbatim to the absolute `path`, replacing any existing file.
    async fn write_file(
        &self,
        target: &str,
        path: &str,
        content: &[u8],
    ) -> Result<(), RuntimeError>;
}

pub(crate) async fn with_timeout<T, F>(
    operation: &str,
    timeout: Duration,
    fut: F,
) -> Result<T, RuntimeError>
where
    F: Future<Output = Result<T, RuntimeError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(RuntimeError::Timeout {
            operation: operation.to_string(),
            timeout,
        }),
    }
}

/// An inspected container plus the runtime handle used to reach it.
#[derive(Clone)]
pub struct Target {
    runtime: Arc<dyn ContainerRuntime>,
    info: Arc<TargetInfo>,
    timeout: Duration,
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.info.id)
            .field("name", &self.info.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Target {
    pub async fn open(
        runtime: Arc<dyn ContainerRuntime>,
        id: &str,
        timeout: Duration,
    ) -> Result<Self, RuntimeError> {
        let info = with_timeout("inspect", timeout, runtime.inspect(id)).await?;
        Ok(Self {
            runtime,
            info: Arc::new(info),
            timeout,
        })
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &TargetInfo {
        &self.info
    }

    pub fn probe_timeout(&self) -> Duration {
        self.timeout
    }

    /// Absolute path of `relative` under the container's working directory.
    pub fn path(&self, relative: &str) -> String {
        if relative.starts_with('/') {
            return relative.to_string();
        }
        Path::new(&self.info.working_dir)
            .join(relative)
            .to_string_lossy()
            .into_owned()
    }

    pub async fn exec(&self, cmd: &[&str]) -> Result<ExecOutput, RuntimeError> {
        self.exec_with_timeout(cmd, self.timeout).await
    }

    pub async fn exec_with_timeout(
        &self,
        cmd: &[&str],
        timeout: Duration,
    ) -> Result<ExecOutput, RuntimeError> {
        debug!(target_id = %self.info.id, command = %cmd.join(" "), "exec");
        with_timeout(
            &format!("exec `{}`", cmd.join(" ")),
            timeout,
            self.runtime.exec(&self.info.id, cmd),
        )
        .await
    }

    /// File content, or `None` when the file does not exist or is unreadable.
    pub async fn read_file(&self, path: &str) -> Result<Option<String>, RuntimeError> {
        let output = self.exec(&["cat", path]).await?;
        Ok(output.is_success().then_some(output.stdout))
    }

    pub async fn file_exists(&self, path: &str) -> Result<bool, RuntimeError> {
        Ok(self.exec(&["test", "-f", path]).await?.is_success())
    }

    pub async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), RuntimeError> {
        debug!(target_id = %self.info.id, path, bytes = content.len(), "write file");
        with_timeout(
            &format!("write {}", path),
            self.timeout,
            self.runtime.write_file(&self.info.id, path, content),
        )
        .await
    }

    /// Removes `path`. Returns false when the removal command failed.
    pub async fn remove_file(&self, path: &str) -> Result<bool, RuntimeError> {
        Ok(self.exec(&["rm", "-f", path]).await?.is_success())
    }
}

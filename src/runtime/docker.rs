//! Docker Engine API via bollard

use super::{ContainerRuntime, ExecOutput, PortBinding, RuntimeError, TargetInfo, TargetSummary};
use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, ListContainersOptions, LogOutput, UploadToContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::ContainerInspectResponse;
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// `Docker` wraps a pooled hyper client; clones share the connection pool, so one
/// handle serves every concurrent scan and instrumentation.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Api(format!("failed to connect to Docker: {}", e)))?;
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// True when the daemon answers a version request.
    pub async fn ping(&self) -> bool {
        match self.docker.version().await {
            Ok(v) => {
                debug!(
                    api_version = v.api_version.as_deref().unwrap_or("unknown"),
                    "Docker daemon reachable"
                );
                true
            }
            Err(e) => {
                debug!(error = %e, "Docker daemon unreachable");
                false
            }
        }
    }
}

fn map_error(target: &str, err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound(target.to_string()),
        other => RuntimeError::Api(other.to_string()),
    }
}

fn parse_port_key(key: &str) -> Option<(u16, String)> {
    let (port, protocol) = key.split_once('/').unwrap_or((key, "tcp"));
    Some((port.parse().ok()?, protocol.to_string()))
}

fn target_info(requested: &str, inspect: ContainerInspectResponse) -> TargetInfo {
    let config = inspect.config.unwrap_or_default();
    let network = inspect.network_settings.unwrap_or_default();

    let env = config
        .env
        .unwrap_or_default()
        .into_iter()
        .map(|entry| match entry.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (entry, String::new()),
        })
        .collect();

    // Published bindings first; exposed-only ports fill in without a host port.
    let mut ports: BTreeMap<(u16, String), Option<u16>> = BTreeMap::new();
    for (key, bindings) in network.ports.unwrap_or_default() {
        let Some(port_key) = parse_port_key(&key) else {
            continue;
        };
        let host_port = bindings
            .unwrap_or_default()
            .into_iter()
            .find_map(|b| b.host_port.and_then(|p| p.parse::<u16>().ok()));
        ports.insert(port_key, host_port);
    }
    for key in config.exposed_ports.unwrap_or_default().keys() {
        if let Some(port_key) = parse_port_key(key) {
            ports.entry(port_key).or_insert(None);
        }
    }

    let ip_address = network
        .ip_address
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            network.networks.and_then(|networks| {
                networks
                    .into_values()
                    .find_map(|n| n.ip_address.filter(|ip| !ip.is_empty()))
            })
        });

    TargetInfo {
        id: inspect.id.unwrap_or_else(|| requested.to_string()),
        name: inspect
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| requested.to_string()),
        env,
        ports: ports
            .into_iter()
            .map(|((container_port, protocol), host_port)| PortBinding {
                container_port,
                protocol,
                host_port,
            })
            .collect(),
        ip_address,
        working_dir: config
            .working_dir
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "/".to_string()),
    }
}

fn single_file_archive(file_name: &str, content: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, file_name, content)?;
    builder.into_inner()
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_targets(&self) -> Result<Vec<TargetSummary>, RuntimeError> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.chars().take(12).collect());
                Some(TargetSummary { id, name })
            })
            .collect())
    }

    async fn inspect(&self, target: &str) -> Result<TargetInfo, RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(target, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_error(target, e))?;
        Ok(target_info(target, inspect))
    }

    async fn exec(&self, target: &str, cmd: &[&str]) -> Result<ExecOutput, RuntimeError> {
        let command = cmd.join(" ");
        let exec_error = |e: BollardError| match map_error(target, e) {
            RuntimeError::Api(message) => RuntimeError::Exec {
                command: command.clone(),
                message,
            },
            other => other,
        };

        let exec = self
            .docker
            .create_exec(
                target,
                CreateExecOptions::<String> {
                    cmd: Some(cmd.iter().map(|s| s.to_string()).collect()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(exec_error)?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        if let StartExecResults::Attached { mut output, .. } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(exec_error)?
        {
            while let Some(chunk) = output.next().await {
                match chunk.map_err(exec_error)? {
                    LogOutput::StdOut { message } => stdout.extend_from_slice(&message),
                    LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                    _ => {}
                }
            }
        }

        let exit_code = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(exec_error)?
            .exit_code
            .unwrap_or(-1);

        Ok(ExecOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    async fn write_file(
        &self,
        target: &str,
        path: &str,
        content: &[u8],
    ) -> Result<(), RuntimeError> {
        let path = Path::new(path);
        let (Some(dir), Some(file_name)) = (path.parent(), path.file_name()) else {
            return Err(RuntimeError::Api(format!(
                "not a file path: {}",
                path.display()
            )));
        };

        let archive = single_file_archive(&file_name.to_string_lossy(), content)
            .map_err(|e| RuntimeError::Api(format!("failed to build archive: {}", e)))?;

        self.docker
            .upload_to_container(
                target,
                Some(UploadToContainerOptions {
                    path: dir.to_string_lossy().into_owned(),
                    ..Default::default()
                }),
                Bytes::from(archive),
            )
            .await
            .map_err(|e| map_error(target, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerConfig, EndpointSettings, NetworkSettings};
    use std::collections::HashMap;

    #[test]
    fn test_target_info_from_inspect() {
        let mut ports = HashMap::new();
        ports.insert(
            "5000/tcp".to_string(),
            Some(vec![bollard::models::PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some("15000".to_string()),
            }]),
        );
        let mut exposed = HashMap::new();
        exposed.insert("9090/tcp".to_string(), HashMap::new());
        let mut networks = HashMap::new();
        networks.insert(
            "obs".to_string(),
            EndpointSettings {
                ip_address: Some("172.20.0.5".to_string()),
                ..Default::default()
            },
        );

        let inspect = ContainerInspectResponse {
            id: Some("abc123".to_string()),
            name: Some("/shop-api".to_string()),
            config: Some(ContainerConfig {
                env: Some(vec!["FLASK_APP=app.py".to_string(), "EMPTY".to_string()]),
                working_dir: Some("/srv".to_string()),
                exposed_ports: Some(exposed),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                ports: Some(ports),
                ip_address: Some(String::new()),
                networks: Some(networks),
                ..Default::default()
            }),
            ..Default::default()
        };

        let info = target_info("shop-api", inspect);
        assert_eq!(info.id, "abc123");
        assert_eq!(info.name, "shop-api");
        assert_eq!(info.env_var("FLASK_APP"), Some("app.py"));
        assert_eq!(info.env_var("EMPTY"), Some(""));
        assert_eq!(info.working_dir, "/srv");
        assert_eq!(info.ip_address.as_deref(), Some("172.20.0.5"));
        assert_eq!(
            info.ports,
            vec![
                PortBinding {
                    container_port: 5000,
                    protocol: "tcp".to_string(),
                    host_port: Some(15000),
                },
                PortBinding {
                    container_port: 9090,
                    protocol: "tcp".to_string(),
                    host_port: None,
                },
            ]
        );
    }

    #[test]
    fn test_not_found_mapping() {
        let err = map_error(
            "gone",
            BollardError::DockerResponseServerError {
                status_code: 404,
                message: "No such container".to_string(),
            },
        );
        assert!(matches!(err, RuntimeError::NotFound(id) if id == "gone"));
    }

    #[test]
    fn test_single_file_archive() {
        let archive = single_file_archive("otel_init.py", b"import os\n").unwrap();
        let mut reader = tar::Archive::new(archive.as_slice());
        let mut entries = reader.entries().unwrap();
        let entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_string_lossy(), "otel_init.py");
        assert_eq!(entry.header().size().unwrap(), 10);
    }
}

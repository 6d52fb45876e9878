//! In-memory container runtime for tests and dry runs.
//!
//! Understands the handful of commands the engines issue on their own (`cat`,
//! `test -f`, `rm -f`, `ls`) against an in-memory filesystem; anything else must be
//! registered with [`MockTarget::with_command`] or exits 127.

use super::{ContainerRuntime, ExecOutput, PortBinding, RuntimeError, TargetInfo, TargetSummary};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MockTarget {
    info: TargetInfo,
    files: BTreeMap<String, Vec<u8>>,
    commands: Vec<(String, ExecOutput)>,
    executed: Vec<String>,
    exec_delays: Vec<(String, Duration)>,
    panic_on_exec: bool,
    panic_on_write: bool,
    fail_writes: bool,
}

impl MockTarget {
    pub fn new(id: &str) -> Self {
        Self {
            info: TargetInfo {
                id: id.to_string(),
                name: id.to_string(),
                env: Vec::new(),
                ports: Vec::new(),
                ip_address: None,
                working_dir: "/app".to_string(),
            },
            files: BTreeMap::new(),
            commands: Vec::new(),
            executed: Vec::new(),
            exec_delays: Vec::new(),
            panic_on_exec: false,
            panic_on_write: false,
            fail_writes: false,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.info.name = name.to_string();
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.info.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_port(mut self, container_port: u16, host_port: Option<u16>) -> Self {
        self.info.ports.push(PortBinding {
            container_port,
            protocol: "tcp".to_string(),
            host_port,
        });
        self
    }

    pub fn with_ip(mut self, ip: &str) -> Self {
        self.info.ip_address = Some(ip.to_string());
        self
    }

    pub fn with_working_dir(mut self, dir: &str) -> Self {
        self.info.working_dir = dir.to_string();
        self
    }

    /// Relative paths land under the working directory.
    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        let path = self.absolute(path);
        self.files.insert(path, content.as_bytes().to_vec());
        self
    }

    /// Canned output for every command line starting with `prefix`. The longest
    /// matching prefix wins.
    pub fn with_command(mut self, prefix: &str, output: ExecOutput) -> Self {
        self.commands.push((prefix.to_string(), output));
        self
    }

    /// Shorthand for a successful `ps` listing.
    pub fn with_processes(self, listing: &str) -> Self {
        self.with_command("ps", ExecOutput::success(listing))
    }

    pub fn with_exec_delay(self, delay: Duration) -> Self {
        self.with_command_delay("", delay)
    }

    /// Sleeps before running command lines starting with `prefix`. The longest
    /// matching prefix wins.
    pub fn with_command_delay(mut self, prefix: &str, delay: Duration) -> Self {
        self.exec_delays.push((prefix.to_string(), delay));
        self
    }

    fn delay_for(&self, line: &str) -> Option<Duration> {
        self.exec_delays
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, delay)| *delay)
    }

    pub fn with_panic_on_exec(mut self) -> Self {
        self.panic_on_exec = true;
        self
    }

    pub fn with_panic_on_write(mut self) -> Self {
        self.panic_on_write = true;
        self
    }

    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    fn absolute(&self, path: &str) -> String {
        if path.starts_with('/') {
            path.to_string()
        } else {
            Path::new(&self.info.working_dir)
                .join(path)
                .to_string_lossy()
                .into_owned()
        }
    }

    fn run(&mut self, cmd: &[&str]) -> ExecOutput {
        let line = cmd.join(" ");
        self.executed.push(line.clone());

        if let Some((_, output)) = self
            .commands
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
        {
            return output.clone();
        }

        match cmd {
            ["cat", path] => match self.files.get(*path) {
                Some(bytes) => ExecOutput::success(String::from_utf8_lossy(bytes)),
                None => ExecOutput::failure(1, format!("cat: {}: No such file or directory", path)),
            },
            ["test", "-f", path] => {
                if self.files.contains_key(*path) {
                    ExecOutput::success("")
                } else {
                    ExecOutput::failure(1, "")
                }
            }
            ["rm", "-f", path] => {
                self.files.remove(*path);
                ExecOutput::success("")
            }
            ["ls", dir] => {
                let prefix = format!("{}/", dir.trim_end_matches('/'));
                let mut names: Vec<&str> = self
                    .files
                    .keys()
                    .filter_map(|p| p.strip_prefix(&prefix))
                    .filter_map(|rest| rest.split('/').next())
                    .collect();
                names.dedup();
                if names.is_empty() {
                    ExecOutput::failure(2, format!("ls: cannot access '{}'", dir))
                } else {
                    ExecOutput::success(names.join("\n") + "\n")
                }
            }
            _ => ExecOutput::failure(127, format!("{}: command not found", cmd[0])),
        }
    }
}

/// Targets are kept in insertion order and resolved by id or name.
#[derive(Debug, Default)]
pub struct MockRuntime {
    targets: RwLock<Vec<MockTarget>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_target(&self, target: MockTarget) {
        self.write().push(target);
    }

    /// Current content of `path` inside `target`.
    pub fn file(&self, target: &str, path: &str) -> Option<String> {
        let targets = self.read();
        let t = find(&targets, target)?;
        t.files
            .get(&t.absolute(path))
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Command lines executed in `target`, oldest first.
    pub fn executed(&self, target: &str) -> Vec<String> {
        find(&self.read(), target)
            .map(|t| t.executed.clone())
            .unwrap_or_default()
    }

    // A panicking caller must not take the other targets down with it.
    fn read(&self) -> RwLockReadGuard<'_, Vec<MockTarget>> {
        self.targets.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<MockTarget>> {
        self.targets.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn find<'a>(targets: &'a [MockTarget], key: &str) -> Option<&'a MockTarget> {
    targets
        .iter()
        .find(|t| t.info.id == key || t.info.name == key)
}

fn find_mut<'a>(targets: &'a mut [MockTarget], key: &str) -> Option<&'a mut MockTarget> {
    targets
        .iter_mut()
        .find(|t| t.info.id == key || t.info.name == key)
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn list_targets(&self) -> Result<Vec<TargetSummary>, RuntimeError> {
        Ok(self
            .read()
            .iter()
            .map(|t| TargetSummary {
                id: t.info.id.clone(),
                name: t.info.name.clone(),
            })
            .collect())
    }

    async fn inspect(&self, target: &str) -> Result<TargetInfo, RuntimeError> {
        find(&self.read(), target)
            .map(|t| t.info.clone())
            .ok_or_else(|| RuntimeError::NotFound(target.to_string()))
    }

    async fn exec(&self, target: &str, cmd: &[&str]) -> Result<ExecOutput, RuntimeError> {
        if cmd.is_empty() {
            return Err(RuntimeError::Exec {
                command: String::new(),
                message: "empty command".to_string(),
            });
        }

        let (delay, panics) = {
            let targets = self.read();
            let t = find(&targets, target)
                .ok_or_else(|| RuntimeError::NotFound(target.to_string()))?;
            (t.delay_for(&cmd.join(" ")), t.panic_on_exec)
        };

        if panics {
            panic!("injected exec panic in {}", target);
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut targets = self.write();
        let t = find_mut(&mut targets, target)
            .ok_or_else(|| RuntimeError::NotFound(target.to_string()))?;
        Ok(t.run(cmd))
    }

    async fn write_file(
        &self,
        target: &str,
        path: &str,
        content: &[u8],
    ) -> Result<(), RuntimeError> {
        let panics = {
            let mut targets = self.write();
            let t = find_mut(&mut targets, target)
                .ok_or_else(|| RuntimeError::NotFound(target.to_string()))?;
            if t.fail_writes {
                return Err(RuntimeError::Api(format!("write to {} denied", path)));
            }
            if !t.panic_on_write {
                t.files.insert(path.to_string(), content.to_vec());
            }
            t.panic_on_write
        };

        if panics {
            panic!("injected write panic in {}", target);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registered_command_longest_prefix_wins() {
        let runtime = MockRuntime::new();
        runtime.add_target(
            MockTarget::new("t")
                .with_command("pip", ExecOutput::failure(1, "generic"))
                .with_command("pip show", ExecOutput::success("Name: opentelemetry-api")),
        );

        let out = runtime
            .exec("t", &["pip", "show", "opentelemetry-api"])
            .await
            .unwrap();
        assert!(out.is_success());

        let out = runtime.exec("t", &["pip", "install", "x"]).await.unwrap();
        assert_eq!(out.stderr, "generic");
        assert_eq!(runtime.executed("t").len(), 2);
    }

    #[test]
    fn test_command_delay_matches_prefix() {
        let target = MockTarget::new("t")
            .with_exec_delay(Duration::from_millis(1))
            .with_command_delay("pip install", Duration::from_secs(30));
        assert_eq!(target.delay_for("pip install -r req.txt"), Some(Duration::from_secs(30)));
        assert_eq!(target.delay_for("ps aux"), Some(Duration::from_millis(1)));
        assert_eq!(MockTarget::new("t").delay_for("ps aux"), None);
    }

    #[tokio::test]
    async fn test_unknown_command_exits_127() {
        let runtime = MockRuntime::new();
        runtime.add_target(MockTarget::new("t"));
        let out = runtime.exec("t", &["ps", "aux"]).await.unwrap();
        assert_eq!(out.exit_code, 127);
    }

    #[tokio::test]
    async fn test_ls_lists_direct_children() {
        let runtime = MockRuntime::new();
        runtime.add_target(
            MockTarget::new("t")
                .with_file("/proc/1/cmdline", "python\0app.py\0")
                .with_file("/proc/12/cmdline", "sh\0"),
        );
        let out = runtime.exec("t", &["ls", "/proc"]).await.unwrap();
        assert_eq!(out.stdout, "1\n12\n");
    }

    #[tokio::test]
    async fn test_lookup_by_name_and_write() {
        let runtime = MockRuntime::new();
        runtime.add_target(MockTarget::new("abc").with_name("web"));
        runtime.write_file("web", "/app/x.py", b"x = 1").await.unwrap();
        assert_eq!(runtime.file("abc", "x.py").as_deref(), Some("x = 1"));
        assert!(matches!(
            runtime.inspect("nope").await,
            Err(RuntimeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let runtime = MockRuntime::new();
        runtime.add_target(MockTarget::new("t").with_failing_writes());
        assert!(matches!(
            runtime.write_file("t", "/app/a", b"a").await,
            Err(RuntimeError::Api(_))
        ));
        assert_eq!(runtime.file("t", "/app/a"), None);
    }
}

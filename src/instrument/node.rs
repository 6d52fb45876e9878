use super::bootstrap::node_bootstrap;
use super::patch::{is_esm_source, is_patched, node_require_path, patch_node};
use super::{InstrumentContext, Instrumentor, StepError, RESTART_NOTE};
use crate::manifest::node::{add_dependencies, is_module_package, main_entry};
use crate::runtime::Target;
use crate::stack::Framework;
use async_trait::async_trait;
use tracing::{debug, info};

pub const BOOTSTRAP_FILE: &str = "otel.js";
const PACKAGE_JSON: &str = "package.json";
const SDK_PACKAGE: &str = "@opentelemetry/sdk-trace-node";

const BASE_PACKAGES: &[(&str, &str)] = &[
    ("@opentelemetry/sdk-trace-node", "^1.17.0"),
    ("@opentelemetry/sdk-trace-base", "^1.17.0"),
    ("@opentelemetry/resources", "^1.17.0"),
    ("@opentelemetry/semantic-conventions", "^1.17.0"),
    ("@opentelemetry/exporter-trace-otlp-grpc", "^0.43.0"),
    ("@opentelemetry/instrumentation", "^0.43.0"),
    ("@opentelemetry/instrumentation-http", "^0.43.0"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFramework {
    Express,
    NestJs,
}

impl NodeFramework {
    pub fn framework(self) -> Framework {
        match self {
            Self::Express => Framework::Express,
            Self::NestJs => Framework::NestJs,
        }
    }

    fn instrumentation_package(self) -> (&'static str, &'static str) {
        match self {
            Self::Express => ("@opentelemetry/instrumentation-express", "^0.33.0"),
            Self::NestJs => ("@opentelemetry/instrumentation-nestjs-core", "^0.33.0"),
        }
    }

    /// Fallback entrypoints when `package.json` has no usable `main`.
    fn entrypoints(self) -> &'static [&'static str] {
        match self {
            Self::Express => &["app.js", "server.js", "index.js"],
            Self::NestJs => &["dist/main.js", "main.js", "index.js"],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NodeInstrumentor {
    flavor: NodeFramework,
}

impl NodeInstrumentor {
    pub fn new(flavor: NodeFramework) -> Self {
        Self { flavor }
    }

    fn packages(&self) -> Vec<(&'static str, &'static str)> {
        let mut packages = BASE_PACKAGES.to_vec();
        packages.push(self.flavor.instrumentation_package());
        packages
    }

    async fn read_package_json(&self, target: &Target) -> Result<String, StepError> {
        const STEP: &str = "update package.json";
        target
            .read_file(&target.path(PACKAGE_JSON))
            .await
            .map_err(|e| StepError::runtime(STEP, e))?
            .ok_or_else(|| StepError::new(STEP, format!("{} not found", PACKAGE_JSON)))
    }

    async fn add_packages(&self, target: &Target, package_json: &str) -> Result<String, StepError> {
        const STEP: &str = "update package.json";
        let updated =
            add_dependencies(package_json, &self.packages()).map_err(|e| StepError::new(STEP, e.to_string()))?;

        match updated {
            Some(updated) => {
                target
                    .write_file(&target.path(PACKAGE_JSON), updated.as_bytes())
                    .await
                    .map_err(|e| StepError::runtime(STEP, e))?;
                Ok(format!("Added OpenTelemetry packages to {}", PACKAGE_JSON))
            }
            None => Ok(format!("{} already lists the OpenTelemetry packages", PACKAGE_JSON)),
        }
    }

    async fn write_bootstrap(&self, target: &Target, ctx: &InstrumentContext) -> Result<String, StepError> {
        let source = node_bootstrap(self.flavor.framework(), &ctx.service_name, &ctx.collector_endpoint);
        target
            .write_file(&target.path(BOOTSTRAP_FILE), source.as_bytes())
            .await
            .map_err(|e| StepError::runtime("write bootstrap", e))?;
        Ok(format!("Created {}", BOOTSTRAP_FILE))
    }

    /// `main` from package.json first, then the framework's usual entry files.
    fn entry_candidates(&self, package_json: &str) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        if let Some(main) = main_entry(package_json) {
            let main = main.trim_start_matches("./").to_string();
            if main.ends_with(".js") {
                candidates.push(main);
            }
        }
        for entry in self.flavor.entrypoints() {
            if !candidates.iter().any(|c| c == entry) {
                candidates.push(entry.to_string());
            }
        }
        candidates
    }

    async fn patch_entrypoint(&self, target: &Target, package_json: &str) -> Result<String, StepError> {
        const STEP: &str = "patch entrypoint";
        let candidates = self.entry_candidates(package_json);

        for candidate in &candidates {
            let path = target.path(candidate);
            let Some(source) = target
                .read_file(&path)
                .await
                .map_err(|e| StepError::runtime(STEP, e))?
            else {
                continue;
            };

            if is_patched(&source) {
                return Ok(format!("{} already requires {}", candidate, BOOTSTRAP_FILE));
            }
            if is_esm_source(&source) {
                return Err(StepError::new(
                    STEP,
                    format!("{} is an ES module; require() is not available there", candidate),
                ));
            }
            let require = node_require_path(candidate, BOOTSTRAP_FILE);
            if let Some(patched) = patch_node(&source, &require) {
                target
                    .write_file(&path, patched.as_bytes())
                    .await
                    .map_err(|e| StepError::runtime(STEP, e))?;
            }
            return Ok(format!("Modified {} to require {}", candidate, BOOTSTRAP_FILE));
        }

        Err(StepError::new(
            STEP,
            format!("no entrypoint found (tried {})", candidates.join(", ")),
        ))
    }

    async fn install(&self, target: &Target, ctx: &InstrumentContext) -> Result<String, StepError> {
        const STEP: &str = "install dependencies";
        let working_dir = target.info().working_dir.clone();
        let output = target
            .exec_with_timeout(
                &["npm", "install", "--no-audit", "--no-fund", "--prefix", &working_dir],
                ctx.install_timeout,
            )
            .await
            .map_err(|e| StepError::runtime(STEP, e))?;
        if !output.is_success() {
            return Err(StepError::new(
                STEP,
                format!("npm exited with {}: {}", output.exit_code, output.stderr.trim()),
            ));
        }
        Ok("Installed OpenTelemetry packages".to_string())
    }
}

#[async_trait]
impl Instrumentor for NodeInstrumentor {
    fn framework(&self) -> Framework {
        self.flavor.framework()
    }

    fn bootstrap_file(&self) -> &'static str {
        BOOTSTRAP_FILE
    }

    async fn instrument(
        &self,
        target: &Target,
        ctx: &InstrumentContext,
        modifications: &mut Vec<String>,
    ) -> Result<(), StepError> {
        let package_json = self.read_package_json(target).await?;
        if is_module_package(&package_json) {
            return Err(StepError::new(
                "update package.json",
                "ES module packages (\"type\": \"module\") are not supported",
            ));
        }
        modifications.push(self.add_packages(target, &package_json).await?);
        modifications.push(self.write_bootstrap(target, ctx).await?);
        modifications.push(self.patch_entrypoint(target, &package_json).await?);
        modifications.push(self.install(target, ctx).await?);
        modifications.push(RESTART_NOTE.to_string());

        info!(
            target_id = %target.id(),
            framework = %self.flavor.framework(),
            steps = modifications.len(),
            "Node.js instrumentation applied"
        );
        Ok(())
    }

    async fn verify(&self, target: &Target) -> bool {
        match target.file_exists(&target.path(BOOTSTRAP_FILE)).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                debug!(target_id = %target.id(), error = %e, "Bootstrap check failed");
                return false;
            }
        }

        let script = format!("require.resolve('{}')", SDK_PACKAGE);
        match target.exec(&["node", "-e", &script]).await {
            Ok(output) => output.is_success(),
            Err(e) => {
                debug!(target_id = %target.id(), error = %e, "Package check failed");
                false
            }
        }
    }
}

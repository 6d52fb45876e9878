use super::bootstrap::python_bootstrap;
use super::patch::{is_patched, patch_python};
use super::{InstrumentContext, Instrumentor, StepError, RESTART_NOTE};
use crate::manifest::python::append_requirements;
use crate::runtime::Target;
use crate::stack::Framework;
use async_trait::async_trait;
use tracing::{debug, info};

pub const BOOTSTRAP_FILE: &str = "otel_init.py";
const BOOTSTRAP_MODULE: &str = "otel_init";
const REQUIREMENTS_FILE: &str = "requirements.txt";

const BASE_REQUIREMENTS: &[&str] = &[
    "opentelemetry-api>=1.21.0",
    "opentelemetry-sdk>=1.21.0",
    "opentelemetry-exporter-otlp>=1.21.0",
    "opentelemetry-instrumentation-requests>=0.42b0",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PythonFramework {
    Flask,
    Django,
    FastApi,
}

impl PythonFramework {
    pub fn framework(self) -> Framework {
        match self {
            Self::Flask => Framework::Flask,
            Self::Django => Framework::Django,
            Self::FastApi => Framework::FastApi,
        }
    }

    fn instrumentation_requirement(self) -> &'static str {
        match self {
            Self::Flask => "opentelemetry-instrumentation-flask>=0.42b0",
            Self::Django => "opentelemetry-instrumentation-django>=0.42b0",
            Self::FastApi => "opentelemetry-instrumentation-fastapi>=0.42b0",
        }
    }

    /// Entrypoint candidates relative to the working directory, most likely first.
    fn entrypoints(self) -> &'static [&'static str] {
        match self {
            Self::Flask => &["app.py", "wsgi.py", "main.py", "application.py"],
            Self::Django => &["manage.py", "wsgi.py", "asgi.py"],
            Self::FastApi => &["main.py", "app.py", "app/main.py"],
        }
    }
}

/// Flask, Django and FastAPI share one strategy; only the instrumentation
/// package and entrypoint candidates differ.
#[derive(Debug, Clone, Copy)]
pub struct PythonInstrumentor {
    flavor: PythonFramework,
}

impl PythonInstrumentor {
    pub fn new(flavor: PythonFramework) -> Self {
        Self { flavor }
    }

    fn requirements(&self) -> Vec<&'static str> {
        let mut reqs = BASE_REQUIREMENTS.to_vec();
        reqs.push(self.flavor.instrumentation_requirement());
        reqs
    }

    async fn add_requirements(&self, target: &Target) -> Result<String, StepError> {
        const STEP: &str = "update requirements";
        let path = target.path(REQUIREMENTS_FILE);
        let existing = target
            .read_file(&path)
            .await
            .map_err(|e| StepError::runtime(STEP, e))?
            .unwrap_or_default();

        match append_requirements(&existing, &self.requirements()) {
            Some(updated) => {
                target
                    .write_file(&path, updated.as_bytes())
                    .await
                    .map_err(|e| StepError::runtime(STEP, e))?;
                Ok(format!("Added OpenTelemetry packages to {}", REQUIREMENTS_FILE))
            }
            None => Ok(format!("{} already lists the OpenTelemetry packages", REQUIREMENTS_FILE)),
        }
    }

    async fn write_bootstrap(&self, target: &Target, ctx: &InstrumentContext) -> Result<String, StepError> {
        let source = python_bootstrap(self.flavor.framework(), &ctx.service_name, &ctx.collector_endpoint);
        target
            .write_file(&target.path(BOOTSTRAP_FILE), source.as_bytes())
            .await
            .map_err(|e| StepError::runtime("write bootstrap", e))?;
        Ok(format!("Created {}", BOOTSTRAP_FILE))
    }

    async fn patch_entrypoint(&self, target: &Target) -> Result<String, StepError> {
        const STEP: &str = "patch entrypoint";
        for candidate in self.flavor.entrypoints() {
            let path = target.path(candidate);
            let Some(source) = target
                .read_file(&path)
                .await
                .map_err(|e| StepError::runtime(STEP, e))?
            else {
                continue;
            };

            if is_patched(&source) {
                return Ok(format!("{} already loads {}", candidate, BOOTSTRAP_MODULE));
            }
            if let Some(patched) = patch_python(&source, BOOTSTRAP_MODULE) {
                target
                    .write_file(&path, patched.as_bytes())
                    .await
                    .map_err(|e| StepError::runtime(STEP, e))?;
            }
            return Ok(format!("Modified {} to load {}", candidate, BOOTSTRAP_MODULE));
        }

        Err(StepError::new(
            STEP,
            format!("no entrypoint found (tried {})", self.flavor.entrypoints().join(", ")),
        ))
    }

    async fn install(&self, target: &Target, ctx: &InstrumentContext) -> Result<String, StepError> {
        const STEP: &str = "install dependencies";
        let requirements = target.path(REQUIREMENTS_FILE);
        let output = target
            .exec_with_timeout(&["pip", "install", "--no-cache-dir", "-r", &requirements], ctx.install_timeout)
            .await
            .map_err(|e| StepError::runtime(STEP, e))?;
        if !output.is_success() {
            return Err(StepError::new(
                STEP,
                format!("pip exited with {}: {}", output.exit_code, output.stderr.trim()),
            ));
        }
        Ok("Installed OpenTelemetry packages".to_string())
    }
}

#[async_trait]
impl Instrumentor for PythonInstrumentor {
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
        modifications.push(self.add_requirements(target).await?);
        modifications.push(self.write_bootstrap(target, ctx).await?);
        modifications.push(self.patch_entrypoint(target).await?);
        modifications.push(self.install(target, ctx).await?);
        modifications.push(RESTART_NOTE.to_string());

        info!(
            target_id = %target.id(),
            framework = %self.flavor.framework(),
            steps = modifications.len(),
            "Python instrumentation applied"
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

        match target.exec(&["pip", "show", "opentelemetry-api"]).await {
            Ok(output) => output.is_success(),
            Err(e) => {
                debug!(target_id = %target.id(), error = %e, "Package check failed");
                false
            }
        }
    }
}

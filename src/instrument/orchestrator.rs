use super::{
    InstrumentContext, InstrumentationResult, InstrumentationStatus, Instrumentor, NodeFramework,
    NodeInstrumentor, PythonFramework, PythonInstrumentor,
};
use crate::config::ObsConfig;
use crate::detection::{DetectionResult, FrameworkDetector};
use crate::runtime::{ContainerRuntime, HttpClient, RuntimeError, Target};
use crate::stack::Framework;
use crate::util::batch::run_isolated;
use chrono::Utc;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Strategy for a framework. Adding a `Framework` variant fails to compile until
/// it is handled here.
pub fn instrumentor_for(framework: Framework) -> Option<Box<dyn Instrumentor>> {
    match framework {
        Framework::Flask => Some(Box::new(PythonInstrumentor::new(PythonFramework::Flask))),
        Framework::Django => Some(Box::new(PythonInstrumentor::new(PythonFramework::Django))),
        Framework::FastApi => Some(Box::new(PythonInstrumentor::new(PythonFramework::FastApi))),
        Framework::Express => Some(Box::new(NodeInstrumentor::new(NodeFramework::Express))),
        Framework::NestJs => Some(Box::new(NodeInstrumentor::new(NodeFramework::NestJs))),
        Framework::SpringBoot | Framework::Unknown => None,
    }
}

/// What an instrumentation run has established before its deadline.
#[derive(Default)]
struct Progress {
    target_name: Option<String>,
    framework: Option<Framework>,
    modifications: Vec<String>,
}

/// Detects, then drives the matching instrumentor. Cheap to clone.
#[derive(Clone)]
pub struct InstrumentationOrchestrator {
    detector: FrameworkDetector,
    config: Arc<ObsConfig>,
}

impl InstrumentationOrchestrator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, http: Arc<dyn HttpClient>, config: ObsConfig) -> Self {
        Self {
            detector: FrameworkDetector::new(runtime, http, &config),
            config: Arc::new(config),
        }
    }

    pub fn detector(&self) -> &FrameworkDetector {
        &self.detector
    }

    pub fn config(&self) -> &ObsConfig {
        &self.config
    }

    pub fn supported_frameworks() -> Vec<Framework> {
        Framework::known()
            .filter(|f| instrumentor_for(*f).is_some())
            .collect()
    }

    async fn open(&self, target_id: &str) -> Result<Target, RuntimeError> {
        Target::open(self.detector.runtime().clone(), target_id, self.config.probe_timeout()).await
    }

    /// Opens and detects the target, then resolves its instrumentor.
    async fn resolve(&self, target_id: &str) -> Result<(Target, Box<dyn Instrumentor>), String> {
        let target = self.open(target_id).await.map_err(|e| e.to_string())?;
        let detection = self.detector.detect_target(&target).await;
        let instrumentor = instrumentor_for(detection.framework)
            .ok_or_else(|| format!("no instrumentor for {}", detection.framework))?;
        Ok((target, instrumentor))
    }

    /// Runs `work` under the per-target deadline, yielding `None` on timeout.
    async fn with_deadline<T>(&self, target_id: &str, operation: &str, work: impl Future<Output = T>) -> Option<T> {
        let timeout = self.config.target_timeout();
        match tokio::time::timeout(timeout, work).await {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(target_id, operation, timeout_secs = timeout.as_secs(), "Operation timed out");
                None
            }
        }
    }

    /// Detects and instruments one target. Never fails: every problem is reported
    /// as a `Failed` result carrying the steps applied so far.
    pub async fn instrument(&self, target_id: &str) -> InstrumentationResult {
        let mut progress = Progress::default();
        let outcome = self
            .with_deadline(target_id, "instrument", self.instrument_inner(target_id, &mut progress))
            .await;

        outcome.unwrap_or_else(|| {
            InstrumentationResult::failed(
                target_id,
                progress.target_name.unwrap_or_else(|| target_id.to_string()),
                progress.framework.unwrap_or(Framework::Unknown),
                progress.modifications,
                format!("timed out after {}s", self.config.target_timeout_secs),
            )
        })
    }

    async fn instrument_inner(&self, target_id: &str, progress: &mut Progress) -> InstrumentationResult {
        let target = match self.open(target_id).await {
            Ok(target) => target,
            Err(RuntimeError::NotFound(_)) => {
                warn!(target_id, "Target not found");
                return InstrumentationResult::failed(
                    target_id,
                    target_id,
                    Framework::Unknown,
                    Vec::new(),
                    format!("Target {} not found", target_id),
                );
            }
            Err(e) => {
                return InstrumentationResult::failed(target_id, target_id, Framework::Unknown, Vec::new(), e.to_string())
            }
        };
        progress.target_name = Some(target.name().to_string());

        let detection = self.detector.detect_target(&target).await;
        progress.framework = Some(detection.framework);
        self.apply(&target, &detection, &mut progress.modifications).await
    }

    async fn apply(
        &self,
        target: &Target,
        detection: &DetectionResult,
        modifications: &mut Vec<String>,
    ) -> InstrumentationResult {
        if !detection.is_known() {
            return InstrumentationResult::failed(
                target.id(),
                target.name(),
                Framework::Unknown,
                Vec::new(),
                "Could not detect framework",
            );
        }

        let Some(instrumentor) = instrumentor_for(detection.framework) else {
            return InstrumentationResult::failed(
                target.id(),
                target.name(),
                detection.framework,
                Vec::new(),
                format!("Instrumentation not supported for {}", detection.framework.name()),
            );
        };

        let ctx = InstrumentContext {
            service_name: self.config.service_name(target.name()),
            collector_endpoint: self.config.collector_endpoint.clone(),
            install_timeout: self.config.install_timeout(),
        };

        match instrumentor.instrument(target, &ctx, modifications).await {
            Ok(()) => {
                info!(
                    target_id = %target.id(),
                    framework = %detection.framework,
                    service_name = %ctx.service_name,
                    "Target instrumented"
                );
                InstrumentationResult {
                    target_id: target.id().to_string(),
                    target_name: target.name().to_string(),
                    framework: detection.framework,
                    status: InstrumentationStatus::Instrumented,
                    modifications: std::mem::take(modifications),
                    error: None,
                    trace_endpoint: Some(self.config.collector_endpoint.clone()),
                    metrics_endpoint: Some(self.config.metrics_endpoint.clone()),
                    logs_endpoint: self.config.logs_endpoint.clone(),
                    instrumented_at: Some(Utc::now()),
                }
            }
            Err(e) => {
                warn!(
                    target_id = %target.id(),
                    framework = %detection.framework,
                    step = e.step,
                    error = %e.message,
                    applied = modifications.len(),
                    "Instrumentation failed"
                );
                InstrumentationResult::failed(
                    target.id(),
                    target.name(),
                    detection.framework,
                    std::mem::take(modifications),
                    e.to_string(),
                )
            }
        }
    }

    /// True when the bootstrap is in place and the telemetry packages resolve.
    pub async fn verify(&self, target_id: &str) -> bool {
        let check = async {
            match self.resolve(target_id).await {
                Ok((target, instrumentor)) => instrumentor.verify(&target).await,
                Err(message) => {
                    warn!(target_id, error = %message, "Cannot verify target");
                    false
                }
            }
        };
        self.with_deadline(target_id, "verify", check).await.unwrap_or(false)
    }

    /// Removes the injected bootstrap. Manifest entries are left in place.
    pub async fn rollback(&self, target_id: &str) -> bool {
        let work = async {
            match self.resolve(target_id).await {
                Ok((target, instrumentor)) => {
                    let removed = instrumentor.rollback(&target).await;
                    info!(target_id, removed, "Rollback finished");
                    removed
                }
                Err(message) => {
                    warn!(target_id, error = %message, "Cannot roll back target");
                    false
                }
            }
        };
        self.with_deadline(target_id, "rollback", work).await.unwrap_or(false)
    }

    pub async fn status(&self, target_id: &str) -> InstrumentationStatus {
        if self.verify(target_id).await {
            InstrumentationStatus::Instrumented
        } else {
            InstrumentationStatus::NotInstrumented
        }
    }

    /// Instruments every id independently with bounded concurrency. A panic while
    /// instrumenting one target becomes a `Failed` entry for that target only.
    pub async fn instrument_many(&self, target_ids: &[String]) -> BTreeMap<String, InstrumentationResult> {
        let results = run_isolated(target_ids.to_vec(), self.config.max_concurrency, |id| {
            let orchestrator = self.clone();
            async move { orchestrator.instrument(&id).await }
        })
        .await;

        results
            .into_iter()
            .map(|(id, outcome)| {
                let result = outcome.unwrap_or_else(|message| {
                    warn!(target_id = %id, error = %message, "Instrumentation aborted");
                    InstrumentationResult::failed(id.clone(), id.clone(), Framework::Unknown, Vec::new(), message)
                });
                (id, result)
            })
            .collect()
    }

    pub async fn instrument_all(&self) -> Result<BTreeMap<String, InstrumentationResult>, RuntimeError> {
        let ids = self.running_targets().await?;
        Ok(self.instrument_many(&ids).await)
    }

    pub async fn verify_many(&self, target_ids: &[String]) -> BTreeMap<String, bool> {
        let results = run_isolated(target_ids.to_vec(), self.config.max_concurrency, |id| {
            let orchestrator = self.clone();
            async move { orchestrator.verify(&id).await }
        })
        .await;
        results.into_iter().map(|(id, ok)| (id, ok.unwrap_or(false))).collect()
    }

    pub async fn rollback_many(&self, target_ids: &[String]) -> BTreeMap<String, bool> {
        let results = run_isolated(target_ids.to_vec(), self.config.max_concurrency, |id| {
            let orchestrator = self.clone();
            async move { orchestrator.rollback(&id).await }
        })
        .await;
        results.into_iter().map(|(id, ok)| (id, ok.unwrap_or(false))).collect()
    }

    async fn running_targets(&self) -> Result<Vec<String>, RuntimeError> {
        Ok(self
            .detector
            .runtime()
            .list_targets()
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect())
    }
}

//! Telemetry injection into running targets.
//!
//! An [`Instrumentor`] owns one language's strategy: add exporter packages to the
//! manifest, write a generated bootstrap file, make the entrypoint load it once,
//! and install dependencies. Every step is idempotent, so re-running on an
//! instrumented target is safe. The [`InstrumentationOrchestrator`] picks the
//! strategy from a detection result and handles deadlines and batches.

pub mod bootstrap;
pub mod node;
pub mod orchestrator;
pub mod patch;
pub mod python;

pub use node::{NodeFramework, NodeInstrumentor};
pub use orchestrator::{instrumentor_for, InstrumentationOrchestrator};
pub use python::{PythonFramework, PythonInstrumentor};

use crate::runtime::{RuntimeError, Target};
use crate::stack::Framework;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Unique string written into patched entrypoints.
pub const ENTRYPOINT_MARKER: &str = "obsinject: telemetry bootstrap";

pub const RESTART_NOTE: &str = "Restart the container to activate instrumentation";

crate::define_id_enum! {
    InstrumentationStatus {
        NotInstrumented => "not_instrumented" : "Not instrumented",
        Instrumented => "instrumented" : "Instrumented",
        Failed => "failed" : "Failed",
    }
}

/// A single instrumentation step that could not complete.
#[derive(Debug, Clone, Error)]
#[error("{step}: {message}")]
pub struct StepError {
    pub step: &'static str,
    pub message: String,
}

impl StepError {
    pub fn new(step: &'static str, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }

    pub fn runtime(step: &'static str, err: RuntimeError) -> Self {
        Self::new(step, err.to_string())
    }
}

/// Values an instrumentor writes into the target.
#[derive(Debug, Clone)]
pub struct InstrumentContext {
    pub service_name: String,
    pub collector_endpoint: String,
    pub install_timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentationResult {
    pub target_id: String,
    pub target_name: String,
    pub framework: Framework,
    pub status: InstrumentationStatus,
    /// Steps applied, in order. Kept on failure so callers can see partial state.
    pub modifications: Vec<String>,
    pub error: Option<String>,
    pub trace_endpoint: Option<String>,
    pub metrics_endpoint: Option<String>,
    pub logs_endpoint: Option<String>,
    pub instrumented_at: Option<DateTime<Utc>>,
}

impl InstrumentationResult {
    pub fn failed(
        target_id: impl Into<String>,
        target_name: impl Into<String>,
        framework: Framework,
        modifications: Vec<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            target_name: target_name.into(),
            framework,
            status: InstrumentationStatus::Failed,
            modifications,
            error: Some(error.into()),
            trace_endpoint: None,
            metrics_endpoint: None,
            logs_endpoint: None,
            instrumented_at: None,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.status == InstrumentationStatus::Instrumented
    }

    /// Configured telemetry endpoints keyed by signal.
    pub fn endpoints(&self) -> BTreeMap<&'static str, &str> {
        let mut endpoints = BTreeMap::new();
        if let Some(ref metrics) = self.metrics_endpoint {
            endpoints.insert("metrics", metrics.as_str());
        }
        if let Some(ref traces) = self.trace_endpoint {
            endpoints.insert("traces", traces.as_str());
        }
        if let Some(ref logs) = self.logs_endpoint {
            endpoints.insert("logs", logs.as_str());
        }
        endpoints
    }
}

#[async_trait]
pub trait Instrumentor: Send + Sync {
    fn framework(&self) -> Framework;

    /// Bootstrap file name, relative to the working directory.
    fn bootstrap_file(&self) -> &'static str;

    /// Runs the steps in order, appending a line to `modifications` after each one.
    /// Stops at the first failing step.
    async fn instrument(
        &self,
        target: &Target,
        ctx: &InstrumentContext,
        modifications: &mut Vec<String>,
    ) -> Result<(), StepError>;

    /// Bootstrap present and telemetry packages resolvable.
    async fn verify(&self, target: &Target) -> bool;

    /// Removes the bootstrap file. Manifest entries stay.
    async fn rollback(&self, target: &Target) -> bool {
        let path = target.path(self.bootstrap_file());
        match target.remove_file(&path).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(target_id = %target.id(), path = %path, error = %e, "Rollback failed");
                false
            }
        }
    }
}

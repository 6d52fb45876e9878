//! obsinject - zero-instrumentation framework detection and OpenTelemetry injection
//!
//! obsinject looks at a running container from the outside (manifests, files on disk,
//! the process list, environment variables, HTTP responses and exposed ports) and
//! decides which web framework it runs. It then retrofits an OpenTelemetry bootstrap
//! into the container without rebuilding its image.
//!
//! # Core Concepts
//!
//! - **Scanners**: six independent probes, each producing per-framework [`Evidence`]
//! - **Detection**: [`FrameworkDetector`] weighs the evidence into one
//!   [`DetectionResult`] with a capped confidence and an optional version
//! - **Instrumentation**: [`InstrumentationOrchestrator`] picks the framework's
//!   [`Instrumentor`] and applies idempotent steps, recording each one
//! - **Runtime seam**: everything reaches the container through
//!   [`ContainerRuntime`]; [`DockerRuntime`] talks to Docker, [`MockRuntime`] is in-memory
//!
//! # Example
//!
//! ```no_run
//! use obsinject::{DockerRuntime, InstrumentationOrchestrator, ObsConfig, ReqwestHttpClient};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let orchestrator = InstrumentationOrchestrator::new(
//!     Arc::new(DockerRuntime::connect()?),
//!     Arc::new(ReqwestHttpClient::new()?),
//!     ObsConfig::default(),
//! );
//!
//! let detection = orchestrator.detector().detect("web").await?;
//! println!("{} ({:.0}%)", detection.framework, detection.confidence * 100.0);
//!
//! let result = orchestrator.instrument("web").await;
//! for step in &result.modifications {
//!     println!("- {}", step);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod detection;
pub mod instrument;
pub mod manifest;
pub mod runtime;
pub mod stack;
pub mod util;

pub use config::{CategoryWeights, ConfigError, ObsConfig};
pub use detection::{
    DetectError, DetectionResult, Evidence, EvidenceCategory, FrameworkDetector, Scanner,
};
pub use instrument::{
    InstrumentationOrchestrator, InstrumentationResult, InstrumentationStatus, Instrumentor,
    StepError,
};
pub use runtime::{
    ContainerRuntime, DockerRuntime, HttpClient, MockHttpClient, MockRuntime, MockTarget,
    ReqwestHttpClient, RuntimeError, Target,
};
pub use stack::{Framework, Language, SignatureRegistry};
pub use util::{init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

//! Framework detection.
//!
//! Six [`scanners`] each inspect one surface of a target and emit [`Evidence`].
//! [`FrameworkDetector`] runs them concurrently and merges their findings with
//! per-category weights into a single [`DetectionResult`].
//!
//! # Example
//!
//! ```no_run
//! use obsinject::detection::FrameworkDetector;
//! use obsinject::runtime::{DockerRuntime, ReqwestHttpClient};
//! use obsinject::ObsConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ObsConfig::default();
//! let detector = FrameworkDetector::new(
//!     Arc::new(DockerRuntime::connect()?),
//!     Arc::new(ReqwestHttpClient::new()?),
//!     &config,
//! );
//!
//! let result = detector.detect("shop-api").await?;
//! println!("{} ({:.0}%)", result.framework, result.confidence * 100.0);
//! # Ok(())
//! # }
//! ```

pub mod detector;
pub mod evidence;
pub mod result;
pub mod scanners;

pub use detector::{combine, Classification, DetectError, FrameworkDetector, TIE_BREAK_ORDER};
pub use evidence::{Evidence, EvidenceCategory};
pub use result::{DetectionResult, CONFIDENT_THRESHOLD};
pub use scanners::{Indicator, Scanner};

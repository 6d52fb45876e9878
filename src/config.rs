//! Configuration management for obsinject
//!
//! Settings come from built-in defaults, optionally overridden by a TOML file, and
//! finally by environment variables.
//!
//! # Environment Variables
//!
//! - `OBSINJECT_COLLECTOR_ENDPOINT`: OTLP endpoint written into bootstrap code - default: "http://otel-collector:4317"
//! - `OBSINJECT_METRICS_ENDPOINT`: Metrics endpoint reported in results - default: "http://localhost:9090/metrics"
//! - `OBSINJECT_LOGS_ENDPOINT`: Logs endpoint reported in results - default: unset
//! - `OBSINJECT_SERVICE_PREFIX`: Prefix of generated service names - default: "obs-stack"
//! - `OBSINJECT_PROBE_TIMEOUT`: Seconds allowed for a single exec/HTTP probe - default: "5"
//! - `OBSINJECT_INSTALL_TIMEOUT`: Seconds allowed for dependency installation - default: "300"
//! - `OBSINJECT_TARGET_TIMEOUT`: Overall seconds allowed per target operation - default: "600"
//! - `OBSINJECT_MAX_CONCURRENCY`: Targets processed at once in batch operations - default: "4"
//! - `OBSINJECT_WEIGHT_{PACKAGE,FILE,PROCESS,ENV,HTTP,PORT}`: Evidence category weights
//! - `OBSINJECT_LOG_LEVEL`: Logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use obsinject::ObsConfig;
//!
//! let config = ObsConfig::default();
//! config.validate().expect("Invalid configuration");
//! println!("{}", config.service_name("shop-api"));
//! ```

use crate::detection::EvidenceCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_COLLECTOR_ENDPOINT: &str = "http://otel-collector:4317";
const DEFAULT_METRICS_ENDPOINT: &str = "http://localhost:9090/metrics";
const DEFAULT_SERVICE_PREFIX: &str = "obs-stack";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_INSTALL_TIMEOUT_SECS: u64 = 300;
const DEFAULT_TARGET_TIMEOUT_SECS: u64 = 600;
const DEFAULT_MAX_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Multipliers applied to each scanner's raw scores before they are summed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryWeights {
    pub package: f64,
    pub file: f64,
    pub process: f64,
    pub env: f64,
    pub http: f64,
    pub port: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            package: 0.45,
            file: 0.35,
            process: 0.30,
            env: 0.25,
            http: 0.20,
            port: 0.10,
        }
    }
}

impl CategoryWeights {
    pub fn get(&self, category: EvidenceCategory) -> f64 {
        match category {
            EvidenceCategory::Package => self.package,
            EvidenceCategory::File => self.file,
            EvidenceCategory::Process => self.process,
            EvidenceCategory::Env => self.env,
            EvidenceCategory::Http => self.http,
            EvidenceCategory::Port => self.port,
        }
    }

    fn get_mut(&mut self, category: EvidenceCategory) -> &mut f64 {
        match category {
            EvidenceCategory::Package => &mut self.package,
            EvidenceCategory::File => &mut self.file,
            EvidenceCategory::Process => &mut self.process,
            EvidenceCategory::Env => &mut self.env,
            EvidenceCategory::Http => &mut self.http,
            EvidenceCategory::Port => &mut self.port,
        }
    }
}

/// Every field optional so a file may override any subset.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    collector_endpoint: Option<String>,
    metrics_endpoint: Option<String>,
    logs_endpoint: Option<String>,
    service_prefix: Option<String>,
    probe_timeout_secs: Option<u64>,
    install_timeout_secs: Option<u64>,
    target_timeout_secs: Option<u64>,
    max_concurrency: Option<usize>,
    log_level: Option<String>,
    weights: Option<CategoryWeights>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObsConfig {
    /// OTLP endpoint the injected bootstrap exports to
    pub collector_endpoint: String,

    pub metrics_endpoint: String,

    pub logs_endpoint: Option<String>,

    /// Service names are `<prefix>-<container name>`
    pub service_prefix: String,

    pub probe_timeout_secs: u64,

    pub install_timeout_secs: u64,

    /// Deadline for one target's whole detect or instrument operation
    pub target_timeout_secs: u64,

    pub max_concurrency: usize,

    pub weights: CategoryWeights,

    pub log_level: String,
}

impl Default for ObsConfig {
    /// Built-in defaults with `OBSINJECT_*` environment overrides applied.
    fn default() -> Self {
        let mut config = Self::builtin();
        config.apply_env();
        config
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl ObsConfig {
    /// Defaults only, ignoring the environment.
    pub fn builtin() -> Self {
        Self {
            collector_endpoint: DEFAULT_COLLECTOR_ENDPOINT.to_string(),
            metrics_endpoint: DEFAULT_METRICS_ENDPOINT.to_string(),
            logs_endpoint: None,
            service_prefix: DEFAULT_SERVICE_PREFIX.to_string(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            install_timeout_secs: DEFAULT_INSTALL_TIMEOUT_SECS,
            target_timeout_secs: DEFAULT_TARGET_TIMEOUT_SECS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            weights: CategoryWeights::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    /// Loads a TOML file over the defaults; environment variables still win.
    ///
    /// ```toml
    /// collector_endpoint = "http://collector:4317"
    /// max_concurrency = 8
    ///
    /// [weights]
    /// package = 0.5
    /// ```
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env();
        Ok(config)
    }

    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(content)?;
        let mut config = Self::builtin();

        if let Some(v) = file.collector_endpoint {
            config.collector_endpoint = v;
        }
        if let Some(v) = file.metrics_endpoint {
            config.metrics_endpoint = v;
        }
        if file.logs_endpoint.is_some() {
            config.logs_endpoint = file.logs_endpoint;
        }
        if let Some(v) = file.service_prefix {
            config.service_prefix = v;
        }
        if let Some(v) = file.probe_timeout_secs {
            config.probe_timeout_secs = v;
        }
        if let Some(v) = file.install_timeout_secs {
            config.install_timeout_secs = v;
        }
        if let Some(v) = file.target_timeout_secs {
            config.target_timeout_secs = v;
        }
        if let Some(v) = file.max_concurrency {
            config.max_concurrency = v;
        }
        if let Some(v) = file.log_level {
            config.log_level = v.to_lowercase();
        }
        if let Some(v) = file.weights {
            config.weights = v;
        }

        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var("OBSINJECT_COLLECTOR_ENDPOINT") {
            self.collector_endpoint = v;
        }
        if let Ok(v) = env::var("OBSINJECT_METRICS_ENDPOINT") {
            self.metrics_endpoint = v;
        }
        if let Ok(v) = env::var("OBSINJECT_LOGS_ENDPOINT") {
            self.logs_endpoint = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("OBSINJECT_SERVICE_PREFIX") {
            self.service_prefix = v;
        }
        if let Some(v) = env_parsed("OBSINJECT_PROBE_TIMEOUT") {
            self.probe_timeout_secs = v;
        }
        if let Some(v) = env_parsed("OBSINJECT_INSTALL_TIMEOUT") {
            self.install_timeout_secs = v;
        }
        if let Some(v) = env_parsed("OBSINJECT_TARGET_TIMEOUT") {
            self.target_timeout_secs = v;
        }
        if let Some(v) = env_parsed("OBSINJECT_MAX_CONCURRENCY") {
            self.max_concurrency = v;
        }
        if let Ok(v) = env::var("OBSINJECT_LOG_LEVEL") {
            self.log_level = v.to_lowercase();
        }

        for category in EvidenceCategory::all_variants() {
            let key = format!("OBSINJECT_WEIGHT_{}", category.key().to_uppercase());
            if let Some(v) = env_parsed::<f64>(&key) {
                *self.weights.get_mut(*category) = v;
            }
        }
    }

    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` for zero timeouts or concurrency, an
    /// empty collector endpoint, a negative or non-finite weight, or an unknown log level.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collector_endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Collector endpoint must not be empty".to_string(),
            ));
        }

        for (name, secs) in [
            ("Probe timeout", self.probe_timeout_secs),
            ("Install timeout", self.install_timeout_secs),
            ("Target timeout", self.target_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be at least 1 second",
                    name
                )));
            }
        }

        if self.max_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "Max concurrency must be at least 1".to_string(),
            ));
        }

        for category in EvidenceCategory::all_variants() {
            let weight = self.weights.get(*category);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "Weight for {} must be a non-negative number, got {}",
                    category, weight
                )));
            }
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    pub fn target_timeout(&self) -> Duration {
        Duration::from_secs(self.target_timeout_secs)
    }

    pub fn service_name(&self, container_name: &str) -> String {
        format!("{}-{}", self.service_prefix, container_name)
    }

    pub fn to_display_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();

        map.insert(
            "collector_endpoint".to_string(),
            self.collector_endpoint.clone(),
        );
        map.insert("metrics_endpoint".to_string(), self.metrics_endpoint.clone());
        if let Some(ref logs) = self.logs_endpoint {
            map.insert("logs_endpoint".to_string(), logs.clone());
        }
        map.insert("service_prefix".to_string(), self.service_prefix.clone());
        map.insert(
            "probe_timeout_secs".to_string(),
            self.probe_timeout_secs.to_string(),
        );
        map.insert(
            "install_timeout_secs".to_string(),
            self.install_timeout_secs.to_string(),
        );
        map.insert(
            "target_timeout_secs".to_string(),
            self.target_timeout_secs.to_string(),
        );
        map.insert(
            "max_concurrency".to_string(),
            self.max_concurrency.to_string(),
        );
        for category in EvidenceCategory::all_variants() {
            map.insert(
                format!("weight_{}", category.key()),
                format!("{:.2}", self.weights.get(*category)),
            );
        }
        map.insert("log_level".to_string(), self.log_level.clone());

        map
    }
}

impl fmt::Display for ObsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "obsinject Configuration:")?;
        writeln!(f, "  Collector Endpoint: {}", self.collector_endpoint)?;
        writeln!(f, "  Metrics Endpoint: {}", self.metrics_endpoint)?;
        if let Some(ref logs) = self.logs_endpoint {
            writeln!(f, "  Logs Endpoint: {}", logs)?;
        }
        writeln!(f, "  Service Prefix: {}", self.service_prefix)?;
        writeln!(f, "  Probe Timeout: {}s", self.probe_timeout_secs)?;
        writeln!(f, "  Install Timeout: {}s", self.install_timeout_secs)?;
        writeln!(f, "  Target Timeout: {}s", self.target_timeout_secs)?;
        writeln!(f, "  Max Concurrency: {}", self.max_concurrency)?;
        write!(f, "  Weights:")?;
        for category in EvidenceCategory::all_variants() {
            write!(f, " {}={:.2}", category.key(), self.weights.get(*category))?;
        }
        writeln!(f)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    fn test_builtin_defaults() {
        let config = ObsConfig::builtin();

        assert_eq!(config.collector_endpoint, DEFAULT_COLLECTOR_ENDPOINT);
        assert_eq!(config.logs_endpoint, None);
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.weights, CategoryWeights::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _guards = vec![
            EnvGuard::set("OBSINJECT_COLLECTOR_ENDPOINT", "http://collector:4317"),
            EnvGuard::set("OBSINJECT_LOGS_ENDPOINT", "http://loki:3100"),
            EnvGuard::set("OBSINJECT_PROBE_TIMEOUT", "2"),
            EnvGuard::set("OBSINJECT_MAX_CONCURRENCY", "16"),
            EnvGuard::set("OBSINJECT_WEIGHT_PORT", "0.05"),
            EnvGuard::set("OBSINJECT_LOG_LEVEL", "DEBUG"),
        ];

        let config = ObsConfig::default();

        assert_eq!(config.collector_endpoint, "http://collector:4317");
        assert_eq!(config.logs_endpoint.as_deref(), Some("http://loki:3100"));
        assert_eq!(config.probe_timeout_secs, 2);
        assert_eq!(config.max_concurrency, 16);
        assert_eq!(config.weights.port, 0.05);
        assert_eq!(config.weights.package, 0.45);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    #[serial]
    fn test_unparseable_env_value_keeps_default() {
        let _guard = EnvGuard::set("OBSINJECT_MAX_CONCURRENCY", "many");
        assert_eq!(ObsConfig::default().max_concurrency, DEFAULT_MAX_CONCURRENCY);
    }

    #[test]
    #[serial]
    fn test_from_file_with_env_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
service_prefix = "acme"
target_timeout_secs = 120

[weights]
package = 0.6
http = 0.0
"#
        )
        .unwrap();

        let _guard = EnvGuard::set("OBSINJECT_TARGET_TIMEOUT", "90");
        let config = ObsConfig::from_file(file.path()).unwrap();

        assert_eq!(config.service_name("shop"), "acme-shop");
        assert_eq!(config.target_timeout_secs, 90);
        assert_eq!(config.weights.package, 0.6);
        assert_eq!(config.weights.http, 0.0);
        assert_eq!(config.weights.file, 0.35);
    }

    #[test]
    fn test_from_file_errors() {
        assert!(matches!(
            ObsConfig::from_file("/nonexistent/obsinject.toml"),
            Err(ConfigError::Io { .. })
        ));
        assert!(matches!(
            ObsConfig::from_toml("unknown_key = 1"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ObsConfig::builtin();
        config.probe_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ObsConfig::builtin();
        config.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = ObsConfig::builtin();
        config.weights.env = -0.1;
        assert!(config.validate().is_err());

        let mut config = ObsConfig::builtin();
        config.weights.http = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = ObsConfig::builtin();
        config.collector_endpoint = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = ObsConfig::builtin();
        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_display() {
        let display = format!("{}", ObsConfig::builtin());
        assert!(display.contains("obsinject Configuration:"));
        assert!(display.contains("package=0.45"));
        assert_eq!(
            ObsConfig::builtin().to_display_map().get("weight_port"),
            Some(&"0.10".to_string())
        );
    }
}

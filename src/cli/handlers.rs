//! Command handlers. Each returns the process exit code.

use super::commands::{CliArgs, Commands, SignaturesArgs};
use super::output::{OutputFormat, OutputFormatter};
use crate::config::ObsConfig;
use crate::instrument::InstrumentationOrchestrator;
use crate::runtime::{DockerRuntime, ReqwestHttpClient};
use crate::stack::SignatureRegistry;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, error};

pub const EXIT_OK: i32 = 0;
/// The operation ran but reported failure (unknown framework, failed step, ...)
pub const EXIT_FAILED: i32 = 1;
/// Configuration or runtime connection problem
pub const EXIT_SETUP: i32 = 2;

pub fn load_config(args: &CliArgs) -> Result<ObsConfig> {
    let config = match args.config {
        Some(ref path) => ObsConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ObsConfig::default(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn connect(config: ObsConfig) -> Result<InstrumentationOrchestrator> {
    let runtime = DockerRuntime::connect().context("Failed to connect to the Docker daemon")?;
    let http = ReqwestHttpClient::new().context("Failed to build HTTP client")?;
    Ok(InstrumentationOrchestrator::new(Arc::new(runtime), Arc::new(http), config))
}

fn emit(rendered: Result<String>) -> bool {
    match rendered {
        Ok(text) => {
            print!("{}", text);
            if !text.ends_with('\n') {
                println!();
            }
            true
        }
        Err(e) => {
            error!("{:#}", e);
            false
        }
    }
}

fn exit_code(printed: bool, success: bool) -> i32 {
    if printed && success {
        EXIT_OK
    } else {
        EXIT_FAILED
    }
}

pub async fn handle(args: &CliArgs) -> i32 {
    let formatter = OutputFormatter::new(OutputFormat::from(args.format));

    if let Commands::Signatures(ref sig_args) = args.command {
        return handle_signatures(sig_args, &formatter);
    }

    let orchestrator = match load_config(args).and_then(connect) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            return EXIT_SETUP;
        }
    };
    debug!(config = ?orchestrator.config(), "Configuration loaded");

    match args.command {
        Commands::Detect(ref target) => match orchestrator.detector().detect(&target.target).await {
            Ok(result) => exit_code(emit(formatter.format_detection(&result)), result.is_known()),
            Err(e) => {
                eprintln!("Error: {}", e);
                EXIT_FAILED
            }
        },
        Commands::DetectAll => match orchestrator.detector().detect_all().await {
            Ok(results) => {
                let all_ok = results.values().all(|r| r.is_ok());
                exit_code(emit(formatter.format_detections(&results)), all_ok)
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                EXIT_SETUP
            }
        },
        Commands::Instrument(ref target) => {
            let result = orchestrator.instrument(&target.target).await;
            exit_code(emit(formatter.format_instrumentation(&result)), result.is_successful())
        }
        Commands::InstrumentAll => match orchestrator.instrument_all().await {
            Ok(results) => {
                let all_ok = results.values().all(|r| r.is_successful());
                exit_code(emit(formatter.format_instrumentations(&results)), all_ok)
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                EXIT_SETUP
            }
        },
        Commands::Verify(ref target) => {
            let ok = orchestrator.verify(&target.target).await;
            exit_code(emit(formatter.format_check(&target.target, "verify", ok)), ok)
        }
        Commands::Rollback(ref target) => {
            let ok = orchestrator.rollback(&target.target).await;
            exit_code(emit(formatter.format_check(&target.target, "rollback", ok)), ok)
        }
        Commands::Status(ref target) => {
            let status = orchestrator.status(&target.target).await;
            exit_code(emit(formatter.format_status(&target.target, status)), true)
        }
        Commands::Indicators => {
            let indicators = orchestrator.detector().indicators();
            exit_code(emit(formatter.format_indicators(&indicators)), true)
        }
        Commands::Signatures(ref sig_args) => handle_signatures(sig_args, &formatter),
    }
}

fn handle_signatures(args: &SignaturesArgs, formatter: &OutputFormatter) -> i32 {
    let registry = SignatureRegistry::global();
    let signatures = match args.language {
        Some(language) => registry.by_language(language),
        None => registry.all().collect(),
    };
    exit_code(emit(formatter.format_signatures(&signatures)), true)
}

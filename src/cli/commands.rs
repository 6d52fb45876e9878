use crate::stack::Language;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Detect web frameworks in running containers and inject OpenTelemetry
#[derive(Parser, Debug)]
#[command(
    name = "obsinject",
    about = "Detect web frameworks in running containers and inject OpenTelemetry",
    version,
    long_about = "obsinject inspects running containers (manifests, files, processes, \
                  environment, HTTP responses and ports) to identify the web framework, then \
                  retrofits an OpenTelemetry bootstrap without rebuilding the image."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'f',
        long,
        global = true,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'c',
        long,
        global = true,
        value_name = "FILE",
        help = "TOML configuration file (OBSINJECT_* variables still override it)"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - only log errors"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Detect the framework running in a container",
        long_about = "Runs every scanner against one container and prints the winning framework, \
                      its confidence and version, plus the raw evidence.\n\n\
                      Examples:\n  \
                      obsinject detect web\n  \
                      obsinject detect 3f2a9c --format json"
    )]
    Detect(TargetArgs),

    #[command(about = "Detect frameworks in every running container")]
    DetectAll,

    #[command(
        about = "Inject OpenTelemetry into a container",
        long_about = "Detects the framework, adds telemetry packages to the manifest, writes the \
                      bootstrap, patches the entrypoint and installs dependencies. Safe to re-run.\n\n\
                      Examples:\n  \
                      obsinject instrument web\n  \
                      OBSINJECT_COLLECTOR_ENDPOINT=http://collector:4317 obsinject instrument api"
    )]
    Instrument(TargetArgs),

    #[command(about = "Inject OpenTelemetry into every running container")]
    InstrumentAll,

    #[command(about = "Check that a container's instrumentation is in place")]
    Verify(TargetArgs),

    #[command(about = "Remove the injected bootstrap from a container")]
    Rollback(TargetArgs),

    #[command(about = "Show whether a container is instrumented")]
    Status(TargetArgs),

    #[command(about = "List framework signatures")]
    Signatures(SignaturesArgs),

    #[command(about = "Dump every scanner's lookup table")]
    Indicators,
}

#[derive(Parser, Debug, Clone)]
pub struct TargetArgs {
    #[arg(value_name = "TARGET", help = "Container name or id")]
    pub target: String,
}

#[derive(Parser, Debug, Clone)]
pub struct SignaturesArgs {
    #[arg(
        short = 'l',
        long,
        value_parser = parse_language,
        help = "Only show frameworks for this language (python, nodejs, java)"
    )]
    pub language: Option<Language>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_language(s: &str) -> Result<Language, String> {
    Language::from_key(&s.to_lowercase())
        .or_else(|| Language::from_name(s))
        .filter(|l| *l != Language::Unknown)
        .ok_or_else(|| format!("Invalid language: {}. Valid options: python, nodejs, java", s))
}

use obsinject::cli::commands::CliArgs;
use obsinject::cli::handlers::handle;
use obsinject::util::logging::{self, parse_level, LoggingConfig};
use obsinject::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("obsinject v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = handle(&args).await;
    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(ref level_str) = args.log_level {
        parse_level(level_str).unwrap_or_else(|| {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        })
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        env::var("OBSINJECT_LOG_LEVEL")
            .ok()
            .and_then(|v| parse_level(&v))
            .unwrap_or(Level::INFO)
    };

    let config = if args.log_json {
        LoggingConfig::json(level)
    } else {
        LoggingConfig::with_level(level)
    };
    logging::init_logging(config);
}

pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, OutputFormatArg, SignaturesArgs, TargetArgs};
pub use output::{OutputFormat, OutputFormatter};

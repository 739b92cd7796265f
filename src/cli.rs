//! CLI argument parsing for the type-pollution demo driver

use clap::Parser;
use std::path::PathBuf;

use crate::config::AgentConfig;
use crate::report::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "type-pollution")]
#[command(version)]
#[command(
    about = "Run a type-check workload under the type pollution agent and report the worst call sites",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub agent: AgentConfig,

    /// Report format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Append reports to a file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Worker threads running the workload
    #[arg(short = 't', long = "threads", value_name = "N", default_value = "4")]
    pub threads: usize,

    /// How long the workload runs, in milliseconds
    #[arg(short = 'd', long = "duration-ms", value_name = "MS", default_value = "1000")]
    pub duration_ms: u64,

    /// Enable debug logging to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

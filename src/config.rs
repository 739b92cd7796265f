//! Agent configuration
//!
//! Every option is a long flag that falls back to a `TYPE_POLLUTION_*`
//! environment variable, so a host program can configure the agent without
//! passing arguments through.

use clap::Parser;
use std::time::Duration;

use crate::error::AgentError;
use crate::filter::UnitFilter;
use crate::recorder::{Capacity, DEFAULT_FULL_TRACES_LIMIT, DEFAULT_TOP_TRACES};

/// Default number of frames in a compact trace
pub const DEFAULT_TRACE_DEPTH: usize = 5;

/// Default metronome period for full captures (milliseconds)
pub const DEFAULT_FULL_TRACES_MS: u64 = 1000;

// Agent options: flags, each backed by an environment variable. No doc
// comment here: it would become the about text of commands flattening this.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Prune call sites with no activity since the previous report
    #[arg(long = "cleanup", env = "TYPE_POLLUTION_CLEANUP")]
    pub cleanup: bool,

    /// Capture full stack traces, throttled by the sampling clock
    #[arg(long = "full-traces", env = "TYPE_POLLUTION_FULL_TRACES")]
    pub full_traces: bool,

    /// Sampling clock period for full stack traces, in milliseconds
    #[arg(
        long = "full-traces-ms",
        env = "TYPE_POLLUTION_FULL_TRACES_MS",
        value_name = "MS",
        default_value_t = DEFAULT_FULL_TRACES_MS
    )]
    pub full_traces_ms: u64,

    /// Periodic report interval in seconds (0 = report only at shutdown)
    #[arg(
        long = "report-interval",
        env = "TYPE_POLLUTION_REPORT_INTERVAL",
        value_name = "SECS",
        default_value_t = 0
    )]
    pub report_interval: u64,

    /// Frames kept in each representative trace (0 disables trace capture)
    #[arg(
        long = "trace-depth",
        env = "TYPE_POLLUTION_TRACE_DEPTH",
        value_name = "FRAMES",
        default_value_t = DEFAULT_TRACE_DEPTH
    )]
    pub trace_depth: usize,

    /// Distinct representative traces kept per call site
    #[arg(
        long = "top-traces",
        env = "TYPE_POLLUTION_TOP_TRACES",
        value_name = "N",
        default_value_t = DEFAULT_TOP_TRACES
    )]
    pub top_traces: usize,

    /// Full stack traces kept per call site
    #[arg(
        long = "full-traces-limit",
        env = "TYPE_POLLUTION_FULL_TRACES_LIMIT",
        value_name = "N",
        default_value_t = DEFAULT_FULL_TRACES_LIMIT
    )]
    pub full_traces_limit: usize,

    /// Comma-separated unit name prefixes eligible for instrumentation
    #[arg(long = "include", env = "TYPE_POLLUTION_INCLUDE", value_name = "PREFIXES")]
    pub include: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            cleanup: false,
            full_traces: false,
            full_traces_ms: DEFAULT_FULL_TRACES_MS,
            report_interval: 0,
            trace_depth: DEFAULT_TRACE_DEPTH,
            top_traces: DEFAULT_TOP_TRACES,
            full_traces_limit: DEFAULT_FULL_TRACES_LIMIT,
            include: None,
        }
    }
}

impl AgentConfig {
    /// Read the configuration from `TYPE_POLLUTION_*` environment variables
    pub fn from_env() -> Result<Self, AgentError> {
        let config = Self::try_parse_from(["type-pollution-agent"])
            .map_err(|e| AgentError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the agent cannot run with
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.full_traces && self.full_traces_ms == 0 {
            return Err(AgentError::InvalidConfig(
                "full-traces-ms must be > 0 when full traces are enabled".to_string(),
            ));
        }
        if self.trace_depth > 0 && self.top_traces == 0 {
            return Err(AgentError::InvalidConfig(
                "top-traces must be > 0 when trace-depth is > 0".to_string(),
            ));
        }
        self.unit_filter()?;
        Ok(())
    }

    /// Periodic report interval, `None` when only the shutdown report fires
    pub fn report_interval(&self) -> Option<Duration> {
        (self.report_interval > 0).then(|| Duration::from_secs(self.report_interval))
    }

    pub fn metronome_period(&self) -> Duration {
        Duration::from_millis(self.full_traces_ms)
    }

    pub fn capacity(&self) -> Capacity {
        Capacity {
            top_stack_traces: self.top_traces,
            full_stack_frames: self.full_traces_limit,
        }
    }

    pub fn unit_filter(&self) -> Result<UnitFilter, AgentError> {
        UnitFilter::from_args(self.include.as_deref())
            .map_err(|e| AgentError::InvalidConfig(e.to_string()))
    }
}

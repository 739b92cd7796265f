//! Error types for the agent and report sinks

use thiserror::Error;

/// Errors raised while writing a report to its sink
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while attaching the agent
///
/// Nothing on the recording path returns these: type checks in the host
/// program never observe a failure.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

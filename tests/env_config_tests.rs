//! Agent configuration from `TYPE_POLLUTION_*` environment variables
//!
//! These tests mutate the process environment, so they run serially.

use serial_test::serial;
use std::time::Duration;
use type_pollution::config::{AgentConfig, DEFAULT_FULL_TRACES_MS, DEFAULT_TRACE_DEPTH};
use type_pollution::error::AgentError;

const VARS: &[&str] = &[
    "TYPE_POLLUTION_CLEANUP",
    "TYPE_POLLUTION_FULL_TRACES",
    "TYPE_POLLUTION_FULL_TRACES_MS",
    "TYPE_POLLUTION_REPORT_INTERVAL",
    "TYPE_POLLUTION_TRACE_DEPTH",
    "TYPE_POLLUTION_TOP_TRACES",
    "TYPE_POLLUTION_FULL_TRACES_LIMIT",
    "TYPE_POLLUTION_INCLUDE",
];

/// Run `f` with exactly `vars` set among the agent's variables
fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
    for name in VARS {
        std::env::remove_var(name);
    }
    for (name, value) in vars {
        std::env::set_var(name, value);
    }
    let result = f();
    for name in VARS {
        std::env::remove_var(name);
    }
    result
}

#[test]
#[serial]
fn test_from_env_defaults() {
    let config = with_env(&[], AgentConfig::from_env).unwrap();
    assert_eq!(config, AgentConfig::default());
    assert_eq!(config.trace_depth, DEFAULT_TRACE_DEPTH);
    assert_eq!(config.full_traces_ms, DEFAULT_FULL_TRACES_MS);
    assert_eq!(config.report_interval(), None);
}

#[test]
#[serial]
fn test_from_env_reads_every_option() {
    let config = with_env(
        &[
            ("TYPE_POLLUTION_CLEANUP", "true"),
            ("TYPE_POLLUTION_FULL_TRACES", "true"),
            ("TYPE_POLLUTION_FULL_TRACES_MS", "250"),
            ("TYPE_POLLUTION_REPORT_INTERVAL", "3"),
            ("TYPE_POLLUTION_TRACE_DEPTH", "8"),
            ("TYPE_POLLUTION_TOP_TRACES", "2"),
            ("TYPE_POLLUTION_FULL_TRACES_LIMIT", "4"),
            ("TYPE_POLLUTION_INCLUDE", "app::,app::render"),
        ],
        AgentConfig::from_env,
    )
    .unwrap();

    assert!(config.cleanup);
    assert!(config.full_traces);
    assert_eq!(config.metronome_period(), Duration::from_millis(250));
    assert_eq!(config.report_interval(), Some(Duration::from_secs(3)));
    assert_eq!(config.trace_depth, 8);
    assert_eq!(config.capacity().top_stack_traces, 2);
    assert_eq!(config.capacity().full_stack_frames, 4);

    let filter = config.unit_filter().unwrap();
    assert!(filter.accepts("app::render::shapes"));
    assert!(!filter.accepts("app::layout"));
}

#[test]
#[serial]
fn test_from_env_rejects_malformed_number() {
    let result = with_env(
        &[("TYPE_POLLUTION_REPORT_INTERVAL", "soon")],
        AgentConfig::from_env,
    );
    assert!(matches!(result, Err(AgentError::InvalidConfig(_))));
}

#[test]
#[serial]
fn test_from_env_rejects_zero_metronome_period() {
    let result = with_env(
        &[
            ("TYPE_POLLUTION_FULL_TRACES", "true"),
            ("TYPE_POLLUTION_FULL_TRACES_MS", "0"),
        ],
        AgentConfig::from_env,
    );
    let err = result.unwrap_err();
    assert!(err.to_string().contains("full-traces-ms"));
}

#[test]
#[serial]
fn test_from_env_rejects_bad_include() {
    let result = with_env(
        &[("TYPE_POLLUTION_INCLUDE", "app::, app::render")],
        AgentConfig::from_env,
    );
    // Items are trimmed, so only inner whitespace is an error
    assert_eq!(
        result.unwrap().unit_filter().unwrap().prefixes(),
        &["app::".to_string(), "app::render".to_string()]
    );

    let result = with_env(
        &[("TYPE_POLLUTION_INCLUDE", "app render")],
        AgentConfig::from_env,
    );
    assert!(matches!(result, Err(AgentError::InvalidConfig(_))));
}

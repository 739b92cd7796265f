//! Type pollution detector
//!
//! Records, per call site, how often a dynamic type check runs and which
//! concrete types it sees, then reports the sites ranked by check volume.
//! Sites observing many different types degrade dispatch and inline caches;
//! the report shows where they are and which call paths reach them.
//!
//! The pieces, leaves first:
//!
//! - [`recorder`]: concurrent registry behind the `record` hot path
//! - [`sampler`] and [`metronome`]: bounded stack capture
//! - [`snapshot`]: ordered, immutable copies of the registry
//! - [`emitter`] and [`report`]: periodic and shutdown reports and their sinks
//! - [`probe`], [`filter`], [`agent`]: the instrumentation surface and bootstrap

pub mod agent;
pub mod cli;
pub mod config;
pub mod demo;
pub mod emitter;
pub mod error;
pub mod filter;
pub mod metronome;
pub mod probe;
pub mod recorder;
pub mod report;
pub mod sampler;
pub mod site;
pub mod snapshot;

//! Attaching the agent to a host program
//!
//! [`Agent::attach`] builds the registry, starts the sampling clock when full
//! traces are enabled and schedules periodic reports. The returned `Agent` is
//! the shutdown hook: dropping it (or calling [`Agent::shutdown`]) emits the
//! final report exactly once.
//!
//! ```no_run
//! use type_pollution::agent::Agent;
//! use type_pollution::config::AgentConfig;
//! use type_pollution::report::{ConsoleSink, OutputFormat};
//! use std::sync::Arc;
//!
//! let agent = Agent::attach(
//!     AgentConfig::from_env()?,
//!     Arc::new(ConsoleSink::stdout(OutputFormat::Text)),
//! )?;
//! let site = agent.probe().site("app::render", 1);
//! site.instance_of::<u32>(&7u32);
//! // final report printed when `agent` is dropped
//! # Ok::<(), type_pollution::error::AgentError>(())
//! ```

use std::sync::Arc;

use crate::config::AgentConfig;
use crate::emitter::{EmitterState, ReportEmitter};
use crate::error::AgentError;
use crate::metronome::Metronome;
use crate::probe::Probe;
use crate::recorder::Recorder;
use crate::report::{Report, ReportSink};
use crate::sampler::StackSampler;

/// A running type-pollution agent
#[derive(Debug)]
pub struct Agent {
    config: AgentConfig,
    recorder: Arc<Recorder>,
    metronome: Option<Arc<Metronome>>,
    emitter: ReportEmitter,
    probe: Probe,
}

impl Agent {
    /// Validate `config` and start the agent's background tasks
    pub fn attach(config: AgentConfig, sink: Arc<dyn ReportSink>) -> Result<Self, AgentError> {
        Self::attach_with_sampler(
            config.clone(),
            StackSampler::new(config.trace_depth, config.full_traces),
            sink,
        )
    }

    /// Like [`Agent::attach`], with a caller-provided stack sampler
    pub fn attach_with_sampler(
        config: AgentConfig,
        sampler: StackSampler,
        sink: Arc<dyn ReportSink>,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let filter = config.unit_filter()?;

        let mut recorder = Recorder::new(sampler, config.capacity());
        let metronome = if config.full_traces {
            let metronome = Arc::new(Metronome::new(config.metronome_period()));
            metronome.start()?;
            recorder = recorder.with_metronome(Arc::clone(&metronome));
            Some(metronome)
        } else {
            None
        };
        let recorder = Arc::new(recorder);

        let emitter = ReportEmitter::new(
            Arc::clone(&recorder),
            sink,
            config.cleanup,
            config.full_traces,
        );
        if let Some(interval) = config.report_interval() {
            emitter.schedule(interval)?;
        }

        let probe = Probe::new(Arc::clone(&recorder), filter, config.trace_depth > 0);

        tracing::info!(
            cleanup = config.cleanup,
            full_traces = config.full_traces,
            report_interval_secs = config.report_interval,
            trace_depth = config.trace_depth,
            include = config.include.as_deref().unwrap_or("*"),
            "type pollution agent attached"
        );

        Ok(Agent {
            config,
            recorder,
            metronome,
            emitter,
            probe,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Instrumentation handle for type-check sites
    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    pub fn metronome(&self) -> Option<&Arc<Metronome>> {
        self.metronome.as_ref()
    }

    pub fn emitter_state(&self) -> EmitterState {
        self.emitter.state()
    }

    /// Emit the final report now instead of at drop
    pub fn shutdown(&self) -> Option<Report> {
        self.emitter.shutdown()
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.emitter.shutdown();
    }
}

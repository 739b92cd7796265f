//! Report emission triggers
//!
//! Two triggers ask for a report:
//!
//! - **periodic**: a detached scheduler thread waits `interval`, emits, and
//!   waits again (fixed delay: a slow emission pushes the next tick back instead
//!   of causing catch-up runs)
//! - **shutdown**: [`ReportEmitter::shutdown`] emits a final report, at most
//!   once, and stops the scheduler
//!
//! ```text
//! Idle ──schedule──▶ Scheduled ──tick──▶ Emitting ──▶ Scheduled
//!   └──────────────────┴──shutdown──▶ Emitting(final) ──▶ Terminated
//! ```
//!
//! Both triggers build their own snapshot through the same routine. Emissions
//! are serialized, so a tick firing while shutdown begins either completes
//! before the final report or is skipped.

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{AgentError, ReportError};
use crate::recorder::Recorder;
use crate::report::{Report, ReportSink, ReportTrigger};

/// Lifecycle of the emitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    /// No periodic trigger configured
    Idle,
    /// Waiting for the next periodic tick
    Scheduled,
    /// Building and writing a report
    Emitting,
    /// Final report done, no further triggers
    Terminated,
}

struct EmitterShared {
    recorder: Arc<Recorder>,
    sink: Arc<dyn ReportSink>,
    prune: bool,
    full_traces: bool,
    sequence: AtomicU64,
    state: Mutex<EmitterState>,
    /// Held for the whole build-and-write of one report
    emit_lock: Mutex<()>,
    terminated: AtomicBool,
}

impl EmitterShared {
    fn set_state(&self, state: EmitterState) {
        *self.state.lock() = state;
    }

    /// Build one snapshot and hand it to the sink
    fn emit(&self, trigger: ReportTrigger) -> Result<Option<Report>, ReportError> {
        let _serialized = self.emit_lock.lock();
        if trigger == ReportTrigger::Periodic && self.terminated.load(Ordering::Acquire) {
            return Ok(None);
        }
        self.set_state(EmitterState::Emitting);

        let snapshot = self.recorder.snapshot(self.prune);
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        let report = Report::new(sequence, trigger, self.full_traces, snapshot);
        let written = self.sink.emit(&report);

        if trigger == ReportTrigger::Periodic {
            self.set_state(EmitterState::Scheduled);
        }
        tracing::debug!(
            sequence,
            ?trigger,
            entries = report.entries.len(),
            misses = self.recorder.misses(),
            "report emitted"
        );

        written.map(|()| Some(report))
    }

    /// Emit, logging instead of propagating errors and panics
    fn emit_logged(&self, trigger: ReportTrigger) -> Option<Report> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.emit(trigger))) {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::warn!(?trigger, "failed to emit report: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!(?trigger, "report emission panicked");
                None
            }
        }
    }
}

/// Owns the periodic and shutdown triggers for one recorder
pub struct ReportEmitter {
    shared: Arc<EmitterShared>,
    stop: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ReportEmitter {
    /// Create an idle emitter
    ///
    /// `full_traces` only controls whether reports render full captures.
    pub fn new(
        recorder: Arc<Recorder>,
        sink: Arc<dyn ReportSink>,
        prune: bool,
        full_traces: bool,
    ) -> Self {
        ReportEmitter {
            shared: Arc::new(EmitterShared {
                recorder,
                sink,
                prune,
                full_traces,
                sequence: AtomicU64::new(0),
                state: Mutex::new(EmitterState::Idle),
                emit_lock: Mutex::new(()),
                terminated: AtomicBool::new(false),
            }),
            stop: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> EmitterState {
        *self.shared.state.lock()
    }

    /// Number of reports emitted so far
    pub fn emitted(&self) -> u64 {
        self.shared.sequence.load(Ordering::Acquire)
    }

    /// Start the periodic trigger
    ///
    /// A zero interval leaves the emitter idle: only the shutdown report fires.
    /// Scheduling twice, or after shutdown, is a no-op.
    pub fn schedule(&self, interval: Duration) -> Result<(), AgentError> {
        if interval.is_zero() || self.shared.terminated.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("type-pollution-reporter".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        shared.emit_logged(ReportTrigger::Periodic);
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|source| AgentError::Spawn {
                name: "reporter",
                source,
            })?;

        *worker = Some(handle);
        *self.stop.lock() = Some(stop_tx);
        self.shared.set_state(EmitterState::Scheduled);
        tracing::debug!(interval_ms = interval.as_millis() as u64, "periodic reports scheduled");
        Ok(())
    }

    /// Emit the final report and stop the periodic trigger
    ///
    /// Runs at most once; later calls return `None`. Failures are logged and
    /// yield `None`.
    pub fn shutdown(&self) -> Option<Report> {
        if self.shared.terminated.swap(true, Ordering::AcqRel) {
            return None;
        }

        // Dropping the sender wakes the scheduler and ends its loop
        drop(self.stop.lock().take());

        let report = self.shared.emit_logged(ReportTrigger::Shutdown);
        self.shared.set_state(EmitterState::Terminated);

        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        tracing::debug!("report emitter terminated");
        report
    }
}

impl std::fmt::Debug for ReportEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportEmitter")
            .field("state", &self.state())
            .field("emitted", &self.emitted())
            .field("prune", &self.shared.prune)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemorySink;
    use crate::site::{CallSite, ObservedType};

    fn recorder_with_site() -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::default());
        recorder.record(
            &CallSite::new("app::render", 1),
            &ObservedType::named("app::Circle"),
            false,
        );
        recorder
    }

    #[test]
    fn test_idle_without_interval() {
        let sink = Arc::new(MemorySink::new());
        let emitter = ReportEmitter::new(recorder_with_site(), sink.clone(), false, false);
        emitter.schedule(Duration::ZERO).unwrap();
        assert_eq!(emitter.state(), EmitterState::Idle);

        let report = emitter.shutdown().unwrap();
        assert_eq!(report.trigger, ReportTrigger::Shutdown);
        assert_eq!(report.entries.len(), 1);
        assert_eq!(emitter.state(), EmitterState::Terminated);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_shutdown_runs_once() {
        let sink = Arc::new(MemorySink::new());
        let emitter = ReportEmitter::new(recorder_with_site(), sink.clone(), false, false);
        assert!(emitter.shutdown().is_some());
        assert!(emitter.shutdown().is_none());
        assert_eq!(sink.len(), 1);
        assert_eq!(emitter.emitted(), 1);
    }

    #[test]
    fn test_schedule_after_shutdown_is_noop() {
        let sink = Arc::new(MemorySink::new());
        let emitter = ReportEmitter::new(recorder_with_site(), sink.clone(), false, false);
        emitter.shutdown();
        emitter.schedule(Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(60));
        assert_eq!(sink.len(), 1);
        assert_eq!(emitter.state(), EmitterState::Terminated);
    }

    #[test]
    fn test_periodic_then_shutdown_sequence() {
        let sink = Arc::new(MemorySink::new());
        let emitter = ReportEmitter::new(recorder_with_site(), sink.clone(), false, false);
        emitter.schedule(Duration::from_millis(100)).unwrap();
        assert_eq!(emitter.state(), EmitterState::Scheduled);

        thread::sleep(Duration::from_millis(250));
        emitter.shutdown();

        let reports = sink.reports();
        let (last, periodic) = reports.split_last().unwrap();
        assert!(!periodic.is_empty());
        assert!(periodic
            .iter()
            .all(|r| r.trigger == ReportTrigger::Periodic));
        assert_eq!(last.trigger, ReportTrigger::Shutdown);

        let sequences: Vec<u64> = reports.iter().map(|r| r.sequence).collect();
        let expected: Vec<u64> = (1..=reports.len() as u64).collect();
        assert_eq!(sequences, expected);
    }

    #[test]
    fn test_failing_sink_keeps_schedule() {
        struct FailingSink {
            attempts: AtomicU64,
        }
        impl ReportSink for FailingSink {
            fn emit(&self, _report: &Report) -> Result<(), ReportError> {
                let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
                if attempt == 0 {
                    panic!("sink panicked");
                }
                Err(ReportError::Io(std::io::Error::other("disk full")))
            }
        }

        let sink = Arc::new(FailingSink {
            attempts: AtomicU64::new(0),
        });
        let emitter = ReportEmitter::new(recorder_with_site(), sink.clone(), false, false);
        emitter.schedule(Duration::from_millis(30)).unwrap();
        thread::sleep(Duration::from_millis(200));

        assert!(sink.attempts.load(Ordering::SeqCst) >= 3);
        assert!(emitter.shutdown().is_none());
    }

    #[test]
    fn test_fixed_delay_no_catch_up() {
        struct SlowSink {
            emits: AtomicU64,
        }
        impl ReportSink for SlowSink {
            fn emit(&self, _report: &Report) -> Result<(), ReportError> {
                self.emits.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(150));
                Ok(())
            }
        }

        let sink = Arc::new(SlowSink {
            emits: AtomicU64::new(0),
        });
        let emitter = ReportEmitter::new(recorder_with_site(), sink.clone(), false, false);
        emitter.schedule(Duration::from_millis(50)).unwrap();
        thread::sleep(Duration::from_millis(420));

        // Ticks at ~50 and ~250; a fixed-rate schedule would have fired ~8 times
        let periodic = sink.emits.load(Ordering::SeqCst);
        assert!((1..=3).contains(&periodic), "periodic emits: {}", periodic);
        emitter.shutdown();
    }

    #[test]
    fn test_prune_applies_to_emitted_snapshots() {
        let recorder = recorder_with_site();
        let sink = Arc::new(MemorySink::new());
        let emitter = ReportEmitter::new(Arc::clone(&recorder), sink.clone(), true, false);
        emitter.shutdown();
        assert_eq!(sink.reports()[0].entries.len(), 1);
        // First pass treats the site as active
        assert_eq!(recorder.len(), 1);
    }
}

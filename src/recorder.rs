//! Call-site registry and the `record` hot path
//!
//! Every instrumented type check lands in [`Recorder::record`], potentially
//! millions of times per second from many threads. The registry is a sharded
//! concurrent map from [`CallSite`] to a [`SiteEntry`] whose fields carry their
//! own synchronization:
//!
//! ```text
//! record(site, type, capture)
//!   ├─ shard read lock ── entry.update_count += 1        (atomic)
//!   │                  └─ entry.seen_types ∪= {type}     (rwlock, write only when new)
//!   ├─ shard lock released
//!   ├─ walk stack, instruction pointers only             (no registry lock held)
//!   ├─ shard read lock ── entry.seen_stacks ∪= {fingerprint}
//!   ├─ symbolize only when the fingerprint is new        (no registry lock held)
//!   └─ shard read lock ── append traces under entry mutex (bounded)
//! ```
//!
//! A site that keeps being reached through the same few call paths therefore
//! pays for an unwind per capture-eligible event, never for symbolization.
//!
//! Snapshots with pruning walk the map with `retain`, which holds each shard's
//! write lock while that shard is copied and pruned. A concurrent update to a
//! site therefore lands either before the copy (and is reported) or after the
//! prune decision (on a surviving entry, or on a freshly created one), never
//! into an entry that is being discarded.

use dashmap::DashMap;
use fnv::{FnvBuildHasher, FnvHashSet};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::metronome::{Metronome, NEVER_CAPTURED};
use crate::sampler::{StackFrame, StackSampler};
use crate::site::{CallSite, ObservedType};
use crate::snapshot::{SiteSnapshot, Snapshot};

/// Default number of distinct compact traces kept per site
pub const DEFAULT_TOP_TRACES: usize = 5;

/// Default number of full captures kept per site
pub const DEFAULT_FULL_TRACES_LIMIT: usize = 5;

/// Distinct call paths examined per site before compact capture stops
pub const SEEN_STACKS_LIMIT: usize = 64;

/// Retention caps for per-site stack collections
///
/// Caps are first-come: once full, new stacks are dropped and the stored ones
/// are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub top_stack_traces: usize,
    pub full_stack_frames: usize,
}

impl Default for Capacity {
    fn default() -> Self {
        Capacity {
            top_stack_traces: DEFAULT_TOP_TRACES,
            full_stack_frames: DEFAULT_FULL_TRACES_LIMIT,
        }
    }
}

/// Live statistics for one call site, owned by the registry
#[derive(Debug)]
struct SiteEntry {
    update_count: AtomicU64,
    /// Update count at creation or at the last pruning pass
    baseline: u64,
    seen_types: RwLock<Vec<ObservedType>>,
    top_stack_traces: Mutex<Vec<String>>,
    /// Fingerprints of every raw stack already symbolized (or being)
    seen_stacks: Mutex<FnvHashSet<u64>>,
    full_stack_frames: Mutex<Vec<Vec<StackFrame>>>,
    last_full_tick: AtomicU64,
}

/// Which stacks one event should capture once registry locks are released
#[derive(Debug, Clone, Copy, Default)]
struct CapturePlan {
    compact: bool,
    full: bool,
}

impl SiteEntry {
    fn new() -> Self {
        SiteEntry {
            update_count: AtomicU64::new(0),
            baseline: 0,
            seen_types: RwLock::new(Vec::new()),
            top_stack_traces: Mutex::new(Vec::new()),
            seen_stacks: Mutex::new(FnvHashSet::default()),
            full_stack_frames: Mutex::new(Vec::new()),
            last_full_tick: AtomicU64::new(NEVER_CAPTURED),
        }
    }

    fn observe(&self, observed: &ObservedType) {
        self.update_count.fetch_add(1, Ordering::AcqRel);

        if self.seen_types.read().contains(observed) {
            return;
        }
        let mut seen = self.seen_types.write();
        if !seen.contains(observed) {
            seen.push(observed.clone());
        }
    }

    fn top_traces_full(&self, capacity: usize) -> bool {
        self.top_stack_traces.lock().len() >= capacity
    }

    fn stack_budget_spent(&self) -> bool {
        self.seen_stacks.lock().len() >= SEEN_STACKS_LIMIT
    }

    /// `true` when `fingerprint` is new to this site and should be symbolized
    fn claim_stack(&self, fingerprint: u64) -> bool {
        let mut seen = self.seen_stacks.lock();
        seen.len() < SEEN_STACKS_LIMIT && seen.insert(fingerprint)
    }

    fn full_traces_full(&self, capacity: usize) -> bool {
        self.full_stack_frames.lock().len() >= capacity
    }

    /// Duplicates are rejected before the capacity check
    fn add_compact(&self, trace: String, capacity: usize) {
        let mut traces = self.top_stack_traces.lock();
        if traces.contains(&trace) || traces.len() >= capacity {
            return;
        }
        traces.push(trace);
    }

    fn add_full(&self, frames: Vec<StackFrame>, capacity: usize) {
        let mut captures = self.full_stack_frames.lock();
        if captures.len() < capacity {
            captures.push(frames);
        }
    }

    fn to_snapshot(&self, site: &CallSite, update_count: u64) -> SiteSnapshot {
        SiteSnapshot {
            site: site.clone(),
            update_count,
            seen_types: self.seen_types.read().clone(),
            top_stack_traces: self.top_stack_traces.lock().clone(),
            full_stack_frames: self.full_stack_frames.lock().clone(),
        }
    }
}

/// Process-wide registry of type-check statistics
///
/// Built once by the agent and shared (via `Arc`) between the instrumentation
/// probes and the report emitter.
pub struct Recorder {
    sites: DashMap<CallSite, SiteEntry, FnvBuildHasher>,
    sampler: StackSampler,
    metronome: Option<Arc<Metronome>>,
    capacity: Capacity,
    misses: AtomicU64,
}

impl Recorder {
    /// Create a registry with the given sampler and retention caps
    pub fn new(sampler: StackSampler, capacity: Capacity) -> Self {
        Recorder {
            sites: DashMap::with_hasher(FnvBuildHasher::default()),
            sampler,
            metronome: None,
            capacity,
            misses: AtomicU64::new(0),
        }
    }

    /// Gate full captures on a sampling clock
    ///
    /// Without a metronome every eligible event takes a full capture until the
    /// site's cap is reached.
    pub fn with_metronome(mut self, metronome: Arc<Metronome>) -> Self {
        self.metronome = Some(metronome);
        self
    }

    pub fn sampler(&self) -> &StackSampler {
        &self.sampler
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Record one type-check event at `site`
    ///
    /// Never fails and never panics into the caller: a fault while recording
    /// drops the event and bumps [`Recorder::misses`].
    pub fn record(&self, site: &CallSite, observed: &ObservedType, capture_stack: bool) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.record_event(site, observed, capture_stack)
        }));
        if outcome.is_err() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(site = %site, "type check event dropped after recorder fault");
        }
    }

    fn record_event(&self, site: &CallSite, observed: &ObservedType, capture_stack: bool) {
        let plan = match self.sites.get(site) {
            Some(entry) => self.observe(&entry, observed, capture_stack),
            None => {
                // Losers of a concurrent first insert update the winner's entry
                let entry = self
                    .sites
                    .entry(site.clone())
                    .or_insert_with(SiteEntry::new);
                self.observe(&entry, observed, capture_stack)
            }
        };

        if !plan.compact && !plan.full {
            return;
        }

        let compact = if plan.compact {
            self.sampler
                .walk()
                .filter(|stack| {
                    self.sites
                        .get(site)
                        .is_some_and(|entry| entry.claim_stack(stack.fingerprint()))
                })
                .and_then(|stack| self.sampler.render(&stack))
        } else {
            None
        };
        let full = if plan.full { self.sampler.full() } else { None };

        // A site pruned while we were unwinding simply loses these stacks
        if let Some(entry) = self.sites.get(site) {
            if let Some(trace) = compact {
                entry.add_compact(trace, self.capacity.top_stack_traces);
            }
            if let Some(frames) = full {
                entry.add_full(frames, self.capacity.full_stack_frames);
            }
        }
    }

    fn observe(&self, entry: &SiteEntry, observed: &ObservedType, capture_stack: bool) -> CapturePlan {
        entry.observe(observed);

        let compact = capture_stack
            && self.sampler.compact_enabled()
            && !entry.top_traces_full(self.capacity.top_stack_traces)
            && !entry.stack_budget_spent();

        let full = self.sampler.full_traces_enabled()
            && !entry.full_traces_full(self.capacity.full_stack_frames)
            && self
                .metronome
                .as_ref()
                .map_or(true, |metronome| metronome.try_claim(&entry.last_full_tick));

        CapturePlan { compact, full }
    }

    /// Copy every site into an ordered snapshot
    ///
    /// With `prune`, sites whose update count has not moved since their
    /// creation or since the previous pruning pass are removed in the same
    /// pass. They still appear in the snapshot returned here.
    pub fn snapshot(&self, prune: bool) -> Snapshot {
        let mut entries = Vec::with_capacity(self.sites.len());

        if prune {
            let mut pruned = 0usize;
            self.sites.retain(|site, entry| {
                let count = entry.update_count.load(Ordering::Acquire);
                entries.push(entry.to_snapshot(site, count));
                let active = count != entry.baseline;
                entry.baseline = count;
                if !active {
                    pruned += 1;
                }
                active
            });
            if pruned > 0 {
                tracing::debug!(pruned, "pruned stale call sites");
            }
        } else {
            for item in self.sites.iter() {
                let count = item.value().update_count.load(Ordering::Acquire);
                entries.push(item.value().to_snapshot(item.key(), count));
            }
        }

        Snapshot::from_unordered(entries)
    }

    /// Copy of a single site's statistics
    pub fn get(&self, site: &CallSite) -> Option<SiteSnapshot> {
        self.sites.get(site).map(|entry| {
            let count = entry.update_count.load(Ordering::Acquire);
            entry.to_snapshot(site, count)
        })
    }

    /// Number of sites currently tracked
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Events lost to faults inside `record`
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Recorder::new(StackSampler::disabled(), Capacity::default())
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("sites", &self.sites.len())
            .field("sampler", &self.sampler)
            .field("capacity", &self.capacity)
            .field("misses", &self.misses())
            .finish()
    }
}

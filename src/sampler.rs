//! Stack sampling for recording events
//!
//! Two forms of stack are captured for a type-check event:
//!
//! - a **compact** trace: the innermost `depth` frames of the caller rendered
//!   into one string, cheap enough to dedupe and store as a representative path
//! - a **full** capture: every frame, unabridged, taken only when full traces
//!   are enabled and the [`Metronome`](crate::metronome::Metronome) allows it
//!
//! Capture is split in two steps. [`StackSampler::walk`] only unwinds and
//! collects instruction pointers into a [`RawStack`]; symbolization happens in
//! [`StackSampler::render`], which the recorder calls only for stacks whose
//! fingerprint the site has not seen yet.
//!
//! Frames of the unwinder and the recording path (probe, recorder, sampler)
//! are cut off so traces start at the instrumented code. Frames without a
//! symbol (stripped binaries) are kept and shown by address.

use fnv::FnvHasher;
use serde::{Deserialize, Serialize};
use std::ffi::c_void;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Separator between frames of a compact trace
pub const COMPACT_FRAME_SEPARATOR: &str = "\n\t";

/// Extra frames walked for a compact trace to get past the recording path
pub const RECORDING_PATH_FRAMES: usize = 32;

/// Symbol prefixes of the unwinder and the recording path
const AGENT_SYMBOL_PREFIXES: &[&str] = &[
    "backtrace::",
    "type_pollution::probe::",
    "type_pollution::recorder::",
    "type_pollution::sampler::",
];

/// A single resolved stack frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Demangled symbol name without hash suffix
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl StackFrame {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            file: None,
            line: None,
        }
    }

    /// Frame whose address has no symbol, shown as the address
    pub fn unresolved(ip: usize) -> Self {
        Self::new(format!("{:#x}", ip))
    }

    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}({}:{})", self.symbol, file, line),
            (Some(file), None) => write!(f, "{}({})", self.symbol, file),
            _ => write!(f, "{}(Unknown Source)", self.symbol),
        }
    }
}

/// Unresolved stack: instruction pointers, innermost first
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RawStack {
    ips: Vec<usize>,
}

impl RawStack {
    pub fn new(ips: Vec<usize>) -> Self {
        Self { ips }
    }

    pub fn ips(&self) -> &[usize] {
        &self.ips
    }

    pub fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }

    /// Identity of the call path, used to skip symbolizing known stacks
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        self.ips.hash(&mut hasher);
        hasher.finish()
    }
}

/// Source of stacks for the current thread
///
/// The production source walks the real stack; tests substitute a scripted one.
pub trait StackSource: Send + Sync {
    /// Unwind the caller's stack without symbolizing, at most `limit` frames
    fn walk(&self, limit: Option<usize>) -> RawStack;

    /// Symbolize `stack`, starting at the first frame past the recording path
    fn resolve(&self, stack: &RawStack) -> Vec<StackFrame>;
}

/// Walks the calling thread's stack with the `backtrace` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct BacktraceSource;

impl StackSource for BacktraceSource {
    fn walk(&self, limit: Option<usize>) -> RawStack {
        let mut ips = Vec::with_capacity(limit.unwrap_or(64).min(128));
        backtrace::trace(|frame| {
            ips.push(frame.ip() as usize);
            limit.map_or(true, |max| ips.len() < max)
        });
        RawStack::new(ips)
    }

    fn resolve(&self, stack: &RawStack) -> Vec<StackFrame> {
        let mut frames = Vec::with_capacity(stack.ips().len());
        // Everything up to the outermost agent frame is the agent's own call chain
        let mut caller_start = 0;

        for &ip in stack.ips() {
            let before = frames.len();
            // One address yields several symbols when calls were inlined
            backtrace::resolve(ip as *mut c_void, |symbol| {
                let Some(name) = symbol.name() else {
                    return;
                };
                // `{:#}` drops the trailing hash of legacy-mangled symbols
                let symbol_name = format!("{:#}", name);
                if is_agent_frame(&symbol_name) {
                    caller_start = frames.len() + 1;
                }

                let mut resolved = StackFrame::new(symbol_name);
                if let Some(path) = symbol.filename() {
                    resolved.file = Some(path.display().to_string());
                }
                resolved.line = symbol.lineno();
                frames.push(resolved);
            });
            if frames.len() == before {
                frames.push(StackFrame::unresolved(ip));
            }
        }

        frames.split_off(caller_start.min(frames.len()))
    }
}

fn is_agent_frame(symbol: &str) -> bool {
    let path = symbol.trim_start_matches('<');
    AGENT_SYMBOL_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

/// Decides what stack information one recording event captures
pub struct StackSampler {
    source: Box<dyn StackSource>,
    /// Frames kept in a compact trace (0 disables compact capture)
    depth: usize,
    full_traces: bool,
}

impl StackSampler {
    pub fn new(depth: usize, full_traces: bool) -> Self {
        Self::with_source(Box::new(BacktraceSource), depth, full_traces)
    }

    pub fn with_source(source: Box<dyn StackSource>, depth: usize, full_traces: bool) -> Self {
        Self {
            source,
            depth,
            full_traces,
        }
    }

    /// Sampler that never captures anything
    pub fn disabled() -> Self {
        Self::new(0, false)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn compact_enabled(&self) -> bool {
        self.depth > 0
    }

    pub fn full_traces_enabled(&self) -> bool {
        self.full_traces
    }

    /// Unresolved stack for a compact trace, `None` when disabled
    ///
    /// Bounded to `depth` caller frames plus the recording path.
    pub fn walk(&self) -> Option<RawStack> {
        if !self.compact_enabled() {
            return None;
        }
        Some(
            self.source
                .walk(Some(self.depth.saturating_add(RECORDING_PATH_FRAMES))),
        )
    }

    /// Symbolize `stack` into a compact trace, `None` when nothing resolves
    pub fn render(&self, stack: &RawStack) -> Option<String> {
        let mut frames = self.source.resolve(stack);
        frames.truncate(self.depth);
        if frames.is_empty() {
            return None;
        }
        Some(render_compact(&frames))
    }

    /// Compact trace of the current stack, walked and symbolized in one go
    pub fn compact(&self) -> Option<String> {
        let stack = self.walk()?;
        self.render(&stack)
    }

    /// Full, untruncated capture of the current stack
    pub fn full(&self) -> Option<Vec<StackFrame>> {
        if !self.full_traces {
            return None;
        }
        let stack = self.source.walk(None);
        Some(self.source.resolve(&stack))
    }
}

impl fmt::Debug for StackSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackSampler")
            .field("depth", &self.depth)
            .field("full_traces", &self.full_traces)
            .finish()
    }
}

/// Render frames as one compact, dedupable string
pub fn render_compact(frames: &[StackFrame]) -> String {
    frames
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(COMPACT_FRAME_SEPARATOR)
}

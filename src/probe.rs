//! Instrumentation hooks for type checks
//!
//! Whatever rewrites the host program (a macro, a code generator, a binary
//! rewriter) asks the [`Probe`] for a [`SiteProbe`] once per type-check
//! location and then routes every execution of that check through it. The
//! check itself is performed unchanged; recording is a side effect.
//!
//! ```
//! use type_pollution::probe::Probe;
//! use type_pollution::recorder::Recorder;
//! use type_pollution::filter::UnitFilter;
//! use std::sync::Arc;
//!
//! struct Circle;
//! struct Square;
//!
//! let recorder = Arc::new(Recorder::default());
//! let probe = Probe::new(Arc::clone(&recorder), UnitFilter::all(), false);
//! let site = probe.site("shapes::render", 12);
//!
//! assert!(site.instance_of::<Circle>(&Circle));
//! assert!(!site.instance_of::<Circle>(&Square));
//!
//! let entry = recorder.get(site.call_site()).unwrap();
//! assert_eq!(entry.update_count, 2);
//! assert_eq!(entry.seen_types.len(), 2);
//! ```

use std::any::Any;
use std::borrow::Cow;
use std::sync::Arc;

use crate::filter::UnitFilter;
use crate::recorder::Recorder;
use crate::site::{CallSite, Observed};

/// Hands out per-site probes, applying the unit filter at instrumentation time
#[derive(Debug, Clone)]
pub struct Probe {
    recorder: Arc<Recorder>,
    filter: UnitFilter,
    capture_stacks: bool,
}

impl Probe {
    pub fn new(recorder: Arc<Recorder>, filter: UnitFilter, capture_stacks: bool) -> Self {
        Probe {
            recorder,
            filter,
            capture_stacks,
        }
    }

    pub fn filter(&self) -> &UnitFilter {
        &self.filter
    }

    /// Instrument the type check at `location` inside `unit`
    ///
    /// Units rejected by the filter get a pass-through probe that performs the
    /// check without recording.
    pub fn site(&self, unit: impl Into<Cow<'static, str>>, location: u32) -> SiteProbe {
        let call_site = CallSite::new(unit, location);
        let recorder = if self.filter.accepts(call_site.unit()) {
            Some(Arc::clone(&self.recorder))
        } else {
            tracing::debug!(site = %call_site, "unit not eligible, site left uninstrumented");
            None
        };

        SiteProbe {
            call_site,
            recorder,
            capture_stack: self.capture_stacks,
        }
    }
}

/// Instrumented type check at one call site
#[derive(Debug, Clone)]
pub struct SiteProbe {
    call_site: CallSite,
    recorder: Option<Arc<Recorder>>,
    capture_stack: bool,
}

impl SiteProbe {
    pub fn call_site(&self) -> &CallSite {
        &self.call_site
    }

    /// Whether events at this site reach the recorder
    pub fn is_instrumented(&self) -> bool {
        self.recorder.is_some()
    }

    /// Report an event for `value` without performing a check
    pub fn observe(&self, value: &dyn Observed) {
        if let Some(recorder) = &self.recorder {
            recorder.record(&self.call_site, &value.observed_type(), self.capture_stack);
        }
    }

    /// `value is T`, reporting the dynamic type of `value`
    pub fn instance_of<T: Any>(&self, value: &dyn Observed) -> bool {
        self.observe(value);
        value.as_any().is::<T>()
    }

    /// Checked downcast, reporting the dynamic type of `value`
    pub fn downcast_ref<'a, T: Any>(&self, value: &'a dyn Observed) -> Option<&'a T> {
        self.observe(value);
        value.as_any().downcast_ref::<T>()
    }
}

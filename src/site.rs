//! Call-site identity and observed types
//!
//! A call site is the pair (executable unit, location inside the unit). The
//! unit is usually a module path or function path, the location a discriminator
//! handed out by whatever instruments the unit (a line number, a bytecode
//! offset, a counter).

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::borrow::Cow;
use std::fmt;

/// Stable identity of one instrumented type-check location
///
/// Ordering is by unit name, then location. Reports use it to break ties
/// between sites with equal update counts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSite {
    unit: Cow<'static, str>,
    location: u32,
}

impl CallSite {
    /// Create a call site from a unit name and an intra-unit location
    pub fn new(unit: impl Into<Cow<'static, str>>, location: u32) -> Self {
        Self {
            unit: unit.into(),
            location,
        }
    }

    /// Name of the executable unit containing the check
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Location discriminator within the unit
    pub fn location(&self) -> u32 {
        self.location
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit, self.location)
    }
}

/// A concrete type observed by a type check
///
/// Identity is the type name. Names produced by [`std::any::type_name`] are
/// borrowed, so cloning an `ObservedType` on the hot path does not allocate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservedType {
    name: Cow<'static, str>,
}

impl ObservedType {
    /// The observed type for `T`
    pub fn of<T: ?Sized + Any>() -> Self {
        Self {
            name: Cow::Borrowed(std::any::type_name::<T>()),
        }
    }

    /// An observed type known only by name (e.g. reported by a foreign runtime)
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ObservedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A value whose dynamic concrete type can be reported
///
/// Blanket-implemented for every `'static` type, so any `&T` coerces to
/// `&dyn Observed` and still reports `T` rather than the trait object.
pub trait Observed: Any {
    /// Concrete type of `self`
    fn observed_type(&self) -> ObservedType;

    /// Upcast for the actual type check
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> Observed for T {
    fn observed_type(&self) -> ObservedType {
        ObservedType::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

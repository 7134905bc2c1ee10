//! VM value representation.
//!
//! This module provides the [`Value`] enum: either a pointer-free immediate
//! (null, boolean, number) or a handle to an object owned by the heap.

use std::fmt;

/// Handle to a garbage-collected heap object.
///
/// A handle names a slot in the heap registry together with the generation
/// the slot had when the object was allocated. Once the object is swept the
/// slot's generation advances, so stale handles are detected instead of
/// silently aliasing a newer object.
///
/// # Examples
///
/// ```
/// use core_types::ObjId;
///
/// let id = ObjId::new(3, 1);
/// assert_eq!(id.index(), 3);
/// assert_eq!(id.generation(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId {
    index: u32,
    generation: u32,
}

impl ObjId {
    /// Create a handle for registry slot `index` at `generation`
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Registry slot this handle points at
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Generation of the slot when the object was allocated
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Represents any VM value.
///
/// Immediates are stored inline; everything else is an [`ObjId`] into the
/// heap. Values are `Copy`: copying a value never copies the object it
/// refers to.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// let null = Value::Null;
/// let number = Value::Num(3.0);
///
/// assert!(!null.is_truthy());
/// assert!(number.is_truthy());
/// assert_eq!(number.to_string(), "3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    /// The null singleton
    #[default]
    Null,
    /// Boolean true or false
    Bool(bool),
    /// IEEE 754 double-precision number
    Num(f64),
    /// Reference to a heap object
    Obj(ObjId),
}

impl Value {
    /// Returns whether this value counts as true in a condition.
    ///
    /// Only `null` and `false` are falsy. Zero, empty strings and empty
    /// lists are all truthy.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_types::Value;
    ///
    /// assert!(!Value::Null.is_truthy());
    /// assert!(!Value::Bool(false).is_truthy());
    /// assert!(Value::Num(0.0).is_truthy());
    /// ```
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    /// Returns true for the null singleton
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the number if this is a `Num`
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean if this is a `Bool`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the heap handle if this value references an object
    pub fn as_obj(&self) -> Option<ObjId> {
        match self {
            Value::Obj(id) => Some(*id),
            _ => None,
        }
    }

    /// Short name of the value's representation, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Num(_) => "num",
            Value::Obj(_) => "object",
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<ObjId> for Value {
    fn from(id: ObjId) -> Self {
        Value::Obj(id)
    }
}

/// Formats a number the way the language prints it.
///
/// Integer-valued numbers print without a fractional part.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// assert_eq!(Value::Num(7.0).to_string(), "7");
/// assert_eq!(Value::Num(0.5).to_string(), "0.5");
/// assert_eq!(Value::Num(f64::NAN).to_string(), "nan");
/// ```
fn format_num(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        write!(f, "nan")
    } else if n.is_infinite() {
        if n.is_sign_positive() {
            write!(f, "infinity")
        } else {
            write!(f, "-infinity")
        }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Num(n) => format_num(f, *n),
            Value::Obj(id) => write!(f, "<object {}>", id),
        }
    }
}

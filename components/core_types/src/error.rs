//! Error types reported by the VM and its components.
//!
//! Errors fall into three propagation classes:
//! - recoverable results for the compiler ([`SymbolError::Duplicate`]);
//! - language-level faults the running program observes ([`RuntimeError`]),
//!   which unwind the fiber but leave the VM consistent;
//! - resource exhaustion and malformed input ([`VmError::Overflow`],
//!   [`GcError`], [`BytecodeError`]), which are fatal to the current
//!   `interpret` call.

use std::fmt;

use thiserror::Error;

use crate::{ConfigError, ObjId, StackFrame};

/// Which bounded resource overflowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowKind {
    /// The fiber's value stack
    ValueStack,
    /// The fiber's call-frame stack
    CallFrames,
}

impl fmt::Display for OverflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowKind::ValueStack => write!(f, "value stack"),
            OverflowKind::CallFrames => write!(f, "call frame stack"),
        }
    }
}

/// Failures from the symbol tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    /// `add` was called with a name that is already interned
    #[error("symbol '{0}' is already defined")]
    Duplicate(String),
    /// The table reached its configured capacity
    #[error("symbol table is full ({limit} symbols)")]
    Overflow {
        /// Configured maximum number of symbols
        limit: usize,
    },
}

/// Failures from the garbage-collected heap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GcError {
    /// The heap limit would be exceeded even after a full collection
    #[error("out of memory: {requested} more bytes with {live} live exceeds the {limit} byte limit")]
    OutOfMemory {
        /// Size of the allocation that failed
        requested: usize,
        /// Bytes still live after collecting
        live: usize,
        /// Configured heap limit
        limit: usize,
    },
    /// `unpin` was called while nothing is pinned
    #[error("unpin called with no pinned roots")]
    PinStackEmpty,
    /// A pin token was released while a more recent pin is still held
    #[error("pinned roots released out of order: token for depth {token_depth}, {depth} roots pinned")]
    PinOrder {
        /// Stack depth the token was issued at
        token_depth: usize,
        /// Current number of pinned roots
        depth: usize,
    },
    /// A handle refers to a slot that was swept or never allocated
    #[error("dangling object handle {0}")]
    DanglingHandle(ObjId),
}

/// Malformed instruction streams and stack discipline violations.
///
/// These indicate a front-end defect rather than a program fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    /// Byte does not name an opcode
    #[error("unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode {
        /// Offset of the opcode byte
        offset: usize,
        /// The offending byte
        opcode: u8,
    },
    /// Instruction stream ends inside an operand
    #[error("truncated operand for {opcode} at offset {offset}")]
    Truncated {
        /// Offset of the opcode byte
        offset: usize,
        /// Opcode mnemonic
        opcode: &'static str,
    },
    /// The instruction pointer ran off the end of a function
    #[error("function '{function}' has no END before offset {offset}")]
    MissingEnd {
        /// Function name
        function: String,
        /// Offset that was read
        offset: usize,
    },
    /// A jump or loop target lies outside the function
    #[error("jump at offset {offset} targets outside the function")]
    JumpOutOfRange {
        /// Offset of the jump instruction
        offset: usize,
    },
    /// Constant index beyond the function's constant pool
    #[error("constant {index} out of range (pool has {len})")]
    ConstantOutOfRange {
        /// Requested constant index
        index: usize,
        /// Constant pool length
        len: usize,
    },
    /// Local slot beyond the current frame's window
    #[error("local slot {slot} outside the frame window of {window} slots")]
    LocalOutOfRange {
        /// Requested slot
        slot: usize,
        /// Current window size
        window: usize,
    },
    /// Global slot with no corresponding global symbol
    #[error("global slot {slot} is not declared")]
    GlobalOutOfRange {
        /// Requested slot
        slot: usize,
    },
    /// A pop found nothing above the current frame's window start
    #[error("value stack underflow")]
    StackUnderflow,
    /// A function's constant pool has no room for another entry
    #[error("constant pool is full ({limit} constants)")]
    TooManyConstants {
        /// Maximum number of constants addressable by an operand
        limit: usize,
    },
    /// A jump distance does not fit its operand
    #[error("jump at offset {offset} spans {distance} bytes, more than an operand can encode")]
    JumpTooFar {
        /// Offset of the jump operand
        offset: usize,
        /// Requested distance in bytes
        distance: usize,
    },
    /// A constant was not the kind of object the instruction needs
    #[error("constant {index} is not a {expected}")]
    WrongConstant {
        /// Constant index
        index: usize,
        /// Expected kind
        expected: &'static str,
    },
}

/// The kind of language-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// The receiver's class has no method for the called symbol
    DoesNotUnderstand,
    /// An operand had the wrong type
    TypeError,
    /// A method body was called with the wrong number of arguments
    ArityMismatch,
    /// A field index beyond the receiver's field count
    FieldOutOfRange,
    /// A list index outside the list
    IndexOutOfRange,
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeErrorKind::DoesNotUnderstand => "DoesNotUnderstand",
            RuntimeErrorKind::TypeError => "TypeError",
            RuntimeErrorKind::ArityMismatch => "ArityMismatch",
            RuntimeErrorKind::FieldOutOfRange => "FieldOutOfRange",
            RuntimeErrorKind::IndexOutOfRange => "IndexOutOfRange",
        };
        write!(f, "{}", name)
    }
}

/// An error raised by the running program.
///
/// The stack is captured innermost-frame first when the error unwinds the
/// fiber.
///
/// # Examples
///
/// ```
/// use core_types::{RuntimeError, RuntimeErrorKind};
///
/// let error = RuntimeError::new(RuntimeErrorKind::TypeError, "right operand must be a num");
/// assert_eq!(error.to_string(), "TypeError: right operand must be a num");
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
    /// The type of error
    pub kind: RuntimeErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Call stack at the time of the error
    pub stack: Vec<StackFrame>,
}

impl RuntimeError {
    /// Create an error with an empty stack trace
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: Vec::new(),
        }
    }

    /// Shorthand for a [`RuntimeErrorKind::TypeError`]
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::TypeError, message)
    }
}

/// Top-level error returned by VM operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// A bounded stack exceeded its configured capacity
    #[error("{kind} overflow (limit {limit})")]
    Overflow {
        /// Which stack overflowed
        kind: OverflowKind,
        /// Configured capacity
        limit: usize,
    },
    /// Heap failure
    #[error(transparent)]
    Heap(#[from] GcError),
    /// Symbol table failure
    #[error(transparent)]
    Symbol(#[from] SymbolError),
    /// Malformed bytecode
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),
    /// Language-level error raised by the program
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    /// The VM was created with an unusable configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl VmError {
    /// Whether the error leaves the VM unusable for the current unit.
    ///
    /// Runtime errors and duplicate symbols are ordinary results; everything
    /// else comes from resource exhaustion or corrupt input.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            VmError::Runtime(_) | VmError::Symbol(SymbolError::Duplicate(_))
        )
    }

    /// The runtime error, if this is one
    pub fn as_runtime(&self) -> Option<&RuntimeError> {
        match self {
            VmError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for VM operations
pub type VmResult<T> = Result<T, VmError>;

//! Stack frame records for runtime error traces.

use std::fmt;

/// Represents a single frame in a captured call stack.
///
/// # Examples
///
/// ```
/// use core_types::StackFrame;
///
/// let frame = StackFrame {
///     function_name: "area".to_string(),
///     ip: 12,
/// };
///
/// assert_eq!(frame.to_string(), "at area (offset 12)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Name of the function executing in this frame
    pub function_name: String,
    /// Bytecode offset of the next instruction in this frame
    pub ip: usize,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {} (offset {})", self.function_name, self.ip)
    }
}

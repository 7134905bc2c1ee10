//! Call frame for function call stack management

use std::rc::Rc;

use core_types::ObjId;

/// Call frame representing a function invocation
///
/// Stored on the fiber's frame stack. The frame's window on the value stack
/// starts at `stack_start`: slot 0 is the receiver, then the parameters,
/// then locals and temporaries.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    /// Function being executed
    pub function: ObjId,
    /// Offset of the next instruction in the function's code
    pub ip: usize,
    /// First value-stack slot of this activation
    pub stack_start: usize,
    /// The function's code, shared with the heap object
    pub(crate) code: Rc<[u8]>,
}

impl CallFrame {
    /// Create a new call frame
    pub fn new(function: ObjId, code: Rc<[u8]>, stack_start: usize) -> Self {
        Self {
            function,
            ip: 0,
            stack_start,
            code,
        }
    }

    /// The function's encoded instructions
    pub fn code(&self) -> &[u8] {
        &self.code
    }
}

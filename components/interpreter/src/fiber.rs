//! The single call stack a VM runs on.
//!
//! A fiber owns a value stack and a stack of call frames, both bounded by
//! the VM configuration. Exceeding either bound is an overflow error rather
//! than a reallocation.

use core_types::{BytecodeError, OverflowKind, Value, VmConfig, VmError, VmResult};
use memory_manager::{RootSet, Visitor};

use crate::call_frame::CallFrame;

/// Value stack plus frame stack
#[derive(Debug, Clone)]
pub struct Fiber {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    max_slots: usize,
    max_frames: usize,
}

impl Fiber {
    /// Create an empty fiber with the capacities from `config`
    pub fn new(config: &VmConfig) -> Self {
        Self {
            stack: Vec::with_capacity(config.max_stack_slots.min(256)),
            frames: Vec::with_capacity(config.max_call_frames.min(64)),
            max_slots: config.max_stack_slots,
            max_frames: config.max_call_frames,
        }
    }

    /// Drop every value and frame
    pub fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
    }

    /// Push a value, failing once the stack is full
    pub fn push(&mut self, value: Value) -> VmResult<()> {
        if self.stack.len() >= self.max_slots {
            return Err(VmError::Overflow {
                kind: OverflowKind::ValueStack,
                limit: self.max_slots,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pop a value from the current frame's window
    pub fn pop(&mut self) -> VmResult<Value> {
        if self.stack.len() <= self.window_start() {
            return Err(BytecodeError::StackUnderflow.into());
        }
        self.stack.pop().ok_or_else(|| BytecodeError::StackUnderflow.into())
    }

    /// The value `distance` slots below the top, within the current window
    pub fn peek(&self, distance: usize) -> VmResult<Value> {
        let len = self.stack.len();
        if distance >= len.saturating_sub(self.window_start()) {
            return Err(BytecodeError::StackUnderflow.into());
        }
        Ok(self.stack[len - 1 - distance])
    }

    /// Overwrite the value `distance` slots below the top
    pub fn set_peek(&mut self, distance: usize, value: Value) -> VmResult<()> {
        let len = self.stack.len();
        if distance >= len.saturating_sub(self.window_start()) {
            return Err(BytecodeError::StackUnderflow.into());
        }
        self.stack[len - 1 - distance] = value;
        Ok(())
    }

    /// Read local `slot` of the current frame
    pub fn local(&self, slot: usize) -> VmResult<Value> {
        let index = self.local_index(slot)?;
        Ok(self.stack[index])
    }

    /// Write local `slot` of the current frame
    pub fn set_local(&mut self, slot: usize, value: Value) -> VmResult<()> {
        let index = self.local_index(slot)?;
        self.stack[index] = value;
        Ok(())
    }

    fn local_index(&self, slot: usize) -> VmResult<usize> {
        let start = self.window_start();
        let window = self.stack.len() - start;
        if slot >= window {
            return Err(BytecodeError::LocalOutOfRange { slot, window }.into());
        }
        Ok(start + slot)
    }

    /// Drop values until the stack is `len` slots tall
    pub fn truncate(&mut self, len: usize) {
        self.stack.truncate(len);
    }

    /// Push an activation record
    pub fn push_frame(&mut self, frame: CallFrame) -> VmResult<()> {
        if self.frames.len() >= self.max_frames {
            return Err(VmError::Overflow {
                kind: OverflowKind::CallFrames,
                limit: self.max_frames,
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Pop the innermost activation record
    pub fn pop_frame(&mut self) -> Option<CallFrame> {
        self.frames.pop()
    }

    /// The innermost frame
    pub fn frame(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// The innermost frame, mutably
    pub fn frame_mut(&mut self) -> Option<&mut CallFrame> {
        self.frames.last_mut()
    }

    /// Frames from outermost to innermost
    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    /// Every value on the stack, bottom first
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Current stack height
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Number of live frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn window_start(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.stack_start)
    }
}

impl RootSet for Fiber {
    fn visit_roots(&self, visitor: &mut impl Visitor) {
        for value in &self.stack {
            visitor.visit(*value);
        }
        for frame in &self.frames {
            visitor.visit_obj(frame.function);
        }
    }
}

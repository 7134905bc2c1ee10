//! Interpreter loop.
//!
//! Fetches, decodes and executes one instruction at a time from the
//! innermost frame of the VM's fiber until the outermost frame ends.
//! Every instruction either completes or fails as a whole; the collector
//! only runs inside allocations made by `CLASS`, `SUBCLASS`, `LIST` and
//! primitives.

use bytecode_system::{Instruction, MethodKind};
use core_types::{BytecodeError, ObjId, RuntimeError, RuntimeErrorKind, Value, VmError, VmResult};
use memory_manager::{Method, Obj};

use crate::core_lib::{Args, PrimitiveOutcome};
use crate::vm::Vm;

/// Whether the outermost frame has finished
enum Flow {
    Continue,
    Halt(Value),
}

impl Vm {
    /// Run instructions until the outermost frame executes `END`
    pub(crate) fn run_loop(&mut self) -> VmResult<Value> {
        loop {
            let (offset, instruction) = self.fetch()?;
            if log::log_enabled!(log::Level::Trace) {
                log::trace!(
                    "{:>3} {:04} {:<24} {:?}",
                    self.fiber.depth(),
                    offset,
                    format!("{:?}", instruction),
                    self.fiber.stack()
                );
            }
            if let Flow::Halt(result) = self.execute(offset, instruction)? {
                return Ok(result);
            }
        }
    }

    /// Decode the instruction at the current frame's ip and advance past it
    fn fetch(&mut self) -> VmResult<(usize, Instruction)> {
        let frame = self.fiber.frame().ok_or(BytecodeError::StackUnderflow)?;
        let offset = frame.ip;
        if offset >= frame.code().len() {
            let function = frame.function;
            return Err(BytecodeError::MissingEnd {
                function: self.function_ref(function)?.name.clone(),
                offset,
            }
            .into());
        }
        let (instruction, next) = Instruction::decode(frame.code(), offset)?;
        if let Some(frame) = self.fiber.frame_mut() {
            frame.ip = next;
        }
        Ok((offset, instruction))
    }

    fn execute(&mut self, offset: usize, instruction: Instruction) -> VmResult<Flow> {
        match instruction {
            Instruction::Constant(index) => {
                let value = self.constant(index)?;
                self.fiber.push(value)?;
            }
            Instruction::Null => self.fiber.push(Value::Null)?,
            Instruction::False => self.fiber.push(Value::Bool(false))?,
            Instruction::True => self.fiber.push(Value::Bool(true))?,
            Instruction::Class { num_fields } => {
                let class = self.new_class(self.classes.object, usize::from(num_fields), "")?;
                self.fiber.push(Value::Obj(class))?;
            }
            Instruction::Subclass { num_fields } => {
                // The superclass stays on the stack until the subclass exists.
                let superclass = self.class_operand(self.fiber.peek(0)?, "superclass")?;
                let class = self.new_class(superclass, usize::from(num_fields), "")?;
                self.fiber.pop()?;
                self.fiber.push(Value::Obj(class))?;
            }
            Instruction::Method {
                kind,
                symbol,
                constant,
            } => self.bind_method(kind, usize::from(symbol), constant)?,
            Instruction::List(count) => {
                let count = usize::from(count);
                if count > 0 {
                    self.fiber.peek(count - 1)?;
                }
                let len = self.fiber.stack_len();
                let elements = self.fiber.stack()[len - count..].to_vec();
                let list = self.allocate(Obj::List(elements))?;
                self.fiber.truncate(len - count);
                self.fiber.push(Value::Obj(list))?;
            }
            Instruction::LoadLocal(slot) => {
                let value = self.fiber.local(usize::from(slot))?;
                self.fiber.push(value)?;
            }
            Instruction::StoreLocal(slot) => {
                let value = self.fiber.peek(0)?;
                self.fiber.set_local(usize::from(slot), value)?;
            }
            Instruction::LoadGlobal(slot) => {
                let slot = self.global_operand(slot)?;
                let value = self.globals.get(slot).copied().unwrap_or_default();
                self.fiber.push(value)?;
            }
            Instruction::StoreGlobal(slot) => {
                let slot = self.global_operand(slot)?;
                let value = self.fiber.peek(0)?;
                if self.globals.len() <= slot {
                    self.globals.resize(slot + 1, Value::Null);
                }
                self.globals[slot] = value;
                if let Value::Obj(id) = value {
                    if let Some(name) = self.global_symbols.name_of(slot).map(str::to_string) {
                        self.name_class(id, &name)?;
                    }
                }
            }
            Instruction::LoadField(field) => {
                let value = self.field(usize::from(field), None)?;
                self.fiber.push(value)?;
            }
            Instruction::StoreField(field) => {
                let value = self.fiber.peek(0)?;
                self.field(usize::from(field), Some(value))?;
            }
            Instruction::Dup => {
                let value = self.fiber.peek(0)?;
                self.fiber.push(value)?;
            }
            Instruction::Pop => {
                self.fiber.pop()?;
            }
            Instruction::Call { arity, symbol } => {
                self.call_method(usize::from(arity.get()), usize::from(symbol))?
            }
            Instruction::Jump(distance) => self.jump(offset, distance, true)?,
            Instruction::Loop(distance) => {
                // The loop body's result is discarded before repeating it.
                self.fiber.pop()?;
                self.jump(offset, distance, false)?;
            }
            Instruction::JumpIf(distance) => {
                if !self.fiber.pop()?.is_truthy() {
                    self.jump(offset, distance, true)?;
                }
            }
            Instruction::And(distance) => {
                if self.fiber.peek(0)?.is_truthy() {
                    self.fiber.pop()?;
                } else {
                    self.jump(offset, distance, true)?;
                }
            }
            Instruction::Or(distance) => {
                if self.fiber.peek(0)?.is_truthy() {
                    self.jump(offset, distance, true)?;
                } else {
                    self.fiber.pop()?;
                }
            }
            Instruction::Is => {
                let class = self.fiber.pop()?;
                let value = self.fiber.pop()?;
                let class = self.class_operand(class, "right operand of 'is'")?;
                let result = self.is_instance(value, class)?;
                self.fiber.push(Value::Bool(result))?;
            }
            Instruction::End => return self.end_frame(),
        }
        Ok(Flow::Continue)
    }

    fn constant(&self, index: u16) -> VmResult<Value> {
        let function = self.current_function()?;
        let constants = &self.function_ref(function)?.constants;
        constants
            .get(usize::from(index))
            .copied()
            .ok_or_else(|| {
                BytecodeError::ConstantOutOfRange {
                    index: usize::from(index),
                    len: constants.len(),
                }
                .into()
            })
    }

    fn current_function(&self) -> VmResult<ObjId> {
        Ok(self
            .fiber
            .frame()
            .ok_or(BytecodeError::StackUnderflow)?
            .function)
    }

    fn global_operand(&self, slot: u16) -> VmResult<usize> {
        let slot = usize::from(slot);
        if slot >= self.global_symbols.len() {
            return Err(BytecodeError::GlobalOutOfRange { slot }.into());
        }
        Ok(slot)
    }

    fn class_operand(&self, value: Value, role: &str) -> VmResult<ObjId> {
        match value {
            Value::Obj(id) if self.class_ref(id).is_ok() => Ok(id),
            other => Err(RuntimeError::type_error(format!(
                "{} must be a class, got {}",
                role,
                self.display(other)?
            ))
            .into()),
        }
    }

    /// Move the current frame's ip relative to the end of the instruction
    fn jump(&mut self, offset: usize, distance: u16, forward: bool) -> VmResult<()> {
        let frame = self
            .fiber
            .frame_mut()
            .ok_or(BytecodeError::StackUnderflow)?;
        let distance = usize::from(distance);
        let target = if forward {
            frame.ip.checked_add(distance)
        } else {
            frame.ip.checked_sub(distance)
        };
        match target {
            Some(target) if target < frame.code().len() => {
                frame.ip = target;
                Ok(())
            }
            _ => Err(BytecodeError::JumpOutOfRange { offset }.into()),
        }
    }

    /// Bind a function constant on the class at the top of the stack
    fn bind_method(&mut self, kind: MethodKind, symbol: usize, constant: u16) -> VmResult<()> {
        let class = self.class_operand(self.fiber.peek(0)?, "method target")?;
        let body = match self.constant(constant)? {
            Value::Obj(id) if self.function_ref(id).is_ok() => id,
            _ => {
                return Err(BytecodeError::WrongConstant {
                    index: usize::from(constant),
                    expected: "function",
                }
                .into())
            }
        };
        let (target, method) = match kind {
            MethodKind::Instance => (class, Method::Block(body)),
            MethodKind::Static | MethodKind::Constructor => {
                let metaclass = self.class_ref(class)?.metaclass.ok_or_else(|| {
                    RuntimeError::type_error("class has no metaclass for static methods")
                })?;
                let method = if kind == MethodKind::Static {
                    Method::Block(body)
                } else {
                    Method::Ctor(body)
                };
                (metaclass, method)
            }
        };
        self.class_mut(target)?.bind(symbol, method);
        self.heap.reaccount(target)?;
        Ok(())
    }

    /// Read field `index` of the frame's receiver, or write it when given a value
    fn field(&mut self, index: usize, store: Option<Value>) -> VmResult<Value> {
        let receiver = self.fiber.local(0)?;
        let type_error = || RuntimeError::type_error("only instances have fields");
        let id = receiver.as_obj().ok_or_else(type_error)?;
        let instance = self
            .heap
            .get_mut(id)?
            .as_instance_mut()
            .ok_or_else(type_error)?;
        let count = instance.fields.len();
        let slot = instance.fields.get_mut(index).ok_or_else(|| {
            RuntimeError::new(
                RuntimeErrorKind::FieldOutOfRange,
                format!("field {} out of range for an instance with {} fields", index, count),
            )
        })?;
        if let Some(value) = store {
            *slot = value;
        }
        Ok(*slot)
    }

    /// Dispatch method `symbol` on the receiver `arity` slots below the top
    fn call_method(&mut self, arity: usize, symbol: usize) -> VmResult<()> {
        let receiver = self.fiber.peek(arity)?;
        let class = self.class_of(receiver)?;
        let method = self.class_ref(class)?.method(symbol);
        match method {
            Method::None => Err(self.does_not_understand(class, symbol)),
            Method::Primitive(index) => {
                let primitive = *self.primitives.get(index).ok_or_else(|| {
                    RuntimeError::new(
                        RuntimeErrorKind::DoesNotUnderstand,
                        format!("primitive {} is not registered", index),
                    )
                })?;
                if let Some(expected) = primitive.arity {
                    if usize::from(expected) != arity {
                        return Err(self.primitive_arity_mismatch(class, symbol, expected, arity));
                    }
                }
                let len = self.fiber.stack_len();
                let args: Args = self.fiber.stack()[len - arity - 1..].iter().copied().collect();
                match (primitive.body)(self, &args)? {
                    PrimitiveOutcome::Value(result) => {
                        self.fiber.truncate(len - arity - 1);
                        self.fiber.push(result)
                    }
                    PrimitiveOutcome::Call(function) => self.call_function(function, arity + 1),
                }
            }
            Method::Block(function) => {
                self.check_arity(function, arity)?;
                self.call_function(function, arity + 1)
            }
            Method::Ctor(function) => {
                self.check_arity(function, arity)?;
                let class = receiver.as_obj().ok_or(BytecodeError::StackUnderflow)?;
                let instance = self.new_instance(class)?;
                self.fiber.set_peek(arity, Value::Obj(instance))?;
                self.call_function(function, arity + 1)
            }
        }
    }

    fn check_arity(&self, function: ObjId, arity: usize) -> VmResult<()> {
        let body = self.function_ref(function)?;
        if usize::from(body.arity) != arity {
            return Err(RuntimeError::new(
                RuntimeErrorKind::ArityMismatch,
                format!(
                    "method '{}' expects {} arguments, got {}",
                    body.name, body.arity, arity
                ),
            )
            .into());
        }
        Ok(())
    }

    fn primitive_arity_mismatch(
        &self,
        class: ObjId,
        symbol: usize,
        expected: u8,
        arity: usize,
    ) -> VmError {
        let class_name = self
            .class_ref(class)
            .map(|class| class.name.clone())
            .unwrap_or_default();
        let method = self
            .method_symbols
            .name_of(symbol)
            .map_or_else(|| format!("#{}", symbol), str::to_string);
        RuntimeError::new(
            RuntimeErrorKind::ArityMismatch,
            format!(
                "{}.{} expects {} arguments, got {}",
                class_name, method, expected, arity
            ),
        )
        .into()
    }

    fn does_not_understand(&self, class: ObjId, symbol: usize) -> VmError {
        let class_name = self
            .class_ref(class)
            .map(|class| class.name.clone())
            .unwrap_or_default();
        let method = self
            .method_symbols
            .name_of(symbol)
            .map_or_else(|| format!("#{}", symbol), str::to_string);
        RuntimeError::new(
            RuntimeErrorKind::DoesNotUnderstand,
            format!("{} does not implement '{}'", class_name, method),
        )
        .into()
    }

    /// Pop the current frame and hand its result to the caller
    fn end_frame(&mut self) -> VmResult<Flow> {
        let frame = self.fiber.frame().ok_or(BytecodeError::StackUnderflow)?;
        let start = frame.stack_start;
        let result = if self.fiber.stack_len() > start {
            self.fiber.pop()?
        } else {
            Value::Null
        };
        self.fiber.pop_frame();
        self.fiber.truncate(start);
        if self.fiber.depth() == 0 {
            return Ok(Flow::Halt(result));
        }
        self.fiber.push(result)?;
        Ok(Flow::Continue)
    }
}

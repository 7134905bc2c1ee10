//! Virtual Machine for bytecode execution
//!
//! [`Vm`] owns everything a running program can reach: the method and
//! global symbol tables, the global variables, the core classes, the heap
//! and the single fiber. Hosts load compiled chunks into it and run them.

use std::fmt::Write as _;
use std::io::{self, Write};

use bytecode_system::{BytecodeChunk, Constant, SymbolResolver};
use core_types::{
    BytecodeError, ObjId, RuntimeError, StackFrame, SymbolError, Value, VmConfig,
    VmError, VmResult,
};
use memory_manager::{
    CollectionReport, GcStats, Heap, Obj, ObjClass, ObjFn, ObjInstance, PinToken, RootSet,
};

use crate::call_frame::CallFrame;
use crate::core_lib::{self, CoreClasses, PrimitiveEntry};
use crate::fiber::Fiber;
use crate::symbol_table::SymbolTable;

/// Lists nested deeper than this print as `[...]`
const MAX_DISPLAY_DEPTH: usize = 8;

/// Virtual Machine for executing bytecode
///
/// # Example
///
/// ```
/// use bytecode_system::{BytecodeChunk, Instruction};
/// use core_types::{Value, VmConfig};
/// use interpreter::Vm;
///
/// let mut vm = Vm::new(VmConfig::default()).unwrap();
/// let plus = vm.method_symbol_index("+").unwrap();
///
/// let mut chunk = BytecodeChunk::new("main", 0);
/// let three = chunk.add_constant(3.0).unwrap();
/// let four = chunk.add_constant(4.0).unwrap();
/// chunk.emit(Instruction::Constant(three));
/// chunk.emit(Instruction::Constant(four));
/// chunk.emit(Instruction::call(1, plus).unwrap());
/// chunk.emit(Instruction::End);
///
/// assert_eq!(vm.run(&chunk).unwrap(), Value::Num(7.0));
/// ```
pub struct Vm {
    pub(crate) config: VmConfig,
    pub(crate) heap: Heap,
    pub(crate) method_symbols: SymbolTable,
    pub(crate) global_symbols: SymbolTable,
    /// Slot `i` belongs to global symbol `i`
    pub(crate) globals: Vec<Value>,
    pub(crate) classes: CoreClasses,
    pub(crate) primitives: Vec<PrimitiveEntry>,
    pub(crate) fiber: Fiber,
    pub(crate) output: Box<dyn Write>,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("config", &self.config)
            .field("globals", &self.globals.len())
            .field("methods", &self.method_symbols.len())
            .field("live_objects", &self.heap.live_objects())
            .field("frames", &self.fiber.depth())
            .finish()
    }
}

impl Vm {
    /// Create a VM with the core classes installed.
    ///
    /// Fails if `config` is invalid or the core library does not fit in
    /// the configured heap or symbol limits.
    pub fn new(config: VmConfig) -> VmResult<Self> {
        config.validate()?;
        let mut heap = Heap::new(&config);
        let mut method_symbols = SymbolTable::new(config.max_symbols);
        let mut primitives = Vec::new();
        let classes = core_lib::bootstrap(&mut heap, &mut method_symbols, &mut primitives)?;
        method_symbols.protect();

        let mut vm = Self {
            fiber: Fiber::new(&config),
            global_symbols: SymbolTable::new(config.max_symbols),
            globals: Vec::new(),
            heap,
            method_symbols,
            classes,
            primitives,
            output: Box::new(io::stdout()),
            config,
        };
        for (name, class) in vm.classes.named() {
            vm.define_global(name, Value::Obj(class))?;
        }
        vm.global_symbols.protect();
        Ok(vm)
    }

    /// Send `IO.write` output to `output` instead of stdout
    pub fn with_output(mut self, output: Box<dyn Write>) -> Self {
        self.output = output;
        self
    }

    /// The configuration the VM was created with
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Copy `chunk` and its nested functions onto the heap.
    ///
    /// The returned function is unrooted: run it or store it somewhere
    /// reachable before the next allocation.
    pub fn load(&mut self, chunk: &BytecodeChunk) -> VmResult<ObjId> {
        chunk.validate()?;
        self.load_function(chunk)
    }

    fn load_function(&mut self, chunk: &BytecodeChunk) -> VmResult<ObjId> {
        let mut pins = Vec::with_capacity(chunk.constants.len());
        let function = self
            .load_constants(chunk, &mut pins)
            .and_then(|constants| {
                self.allocate(Obj::Fn(ObjFn {
                    name: chunk.name.clone(),
                    arity: chunk.arity,
                    code: chunk.code.as_slice().into(),
                    constants,
                }))
            });
        for token in pins.into_iter().rev() {
            self.heap.unpin(token)?;
        }
        function
    }

    // Every heap constant stays pinned until the function that owns it exists.
    fn load_constants(
        &mut self,
        chunk: &BytecodeChunk,
        pins: &mut Vec<PinToken>,
    ) -> VmResult<Vec<Value>> {
        let mut constants = Vec::with_capacity(chunk.constants.len());
        for constant in &chunk.constants {
            let value = match constant {
                Constant::Null => Value::Null,
                Constant::Bool(b) => Value::Bool(*b),
                Constant::Num(n) => Value::Num(*n),
                Constant::Str(text) => Value::Obj(self.allocate(Obj::Str(text.clone()))?),
                Constant::Fn(nested) => Value::Obj(self.load_function(nested)?),
            };
            if let Value::Obj(id) = value {
                pins.push(self.heap.pin(id));
            }
            constants.push(value);
        }
        Ok(constants)
    }

    /// Run a loaded top-level function on a fresh fiber.
    ///
    /// Returns the value left by the outermost `END`, or null if its window
    /// was empty. A runtime error unwinds the fiber and carries the stack
    /// trace; globals and classes are left as the program last set them.
    pub fn interpret(&mut self, function: ObjId) -> VmResult<Value> {
        self.fiber.reset();
        let result = self
            .call_function(function, 0)
            .and_then(|()| self.run_loop());
        match result {
            Ok(value) => Ok(value),
            Err(mut error) => {
                let stack = self.stack_trace();
                if let VmError::Runtime(runtime) = &mut error {
                    runtime.stack = stack;
                }
                log::debug!(
                    "unwinding {} frames after error: {}",
                    self.fiber.depth(),
                    error
                );
                self.fiber.reset();
                Err(error)
            }
        }
    }

    /// Load `chunk` and interpret it
    pub fn run(&mut self, chunk: &BytecodeChunk) -> VmResult<Value> {
        let function = self.load(chunk)?;
        self.interpret(function)
    }

    /// Push a frame for `function` over the top `num_args` stack values.
    ///
    /// The values are the receiver followed by the parameters, or nothing
    /// for a top-level call. Execution starts at the next loop iteration.
    pub fn call_function(&mut self, function: ObjId, num_args: usize) -> VmResult<()> {
        let code = self.function_ref(function)?.code.clone();
        let stack_start = self
            .fiber
            .stack_len()
            .checked_sub(num_args)
            .ok_or(BytecodeError::StackUnderflow)?;
        self.fiber
            .push_frame(CallFrame::new(function, code, stack_start))
    }

    /// Captured call stack, innermost frame first
    pub fn stack_trace(&self) -> Vec<StackFrame> {
        self.fiber
            .frames()
            .iter()
            .rev()
            .map(|frame| StackFrame {
                function_name: self
                    .function_ref(frame.function)
                    .map(|function| function.name.clone())
                    .unwrap_or_else(|_| "<freed>".to_string()),
                ip: frame.ip,
            })
            .collect()
    }

    /// Value of the global variable `name`, if it has been declared
    pub fn find_global(&self, name: &str) -> Option<Value> {
        let slot = self.global_symbols.find(name)?;
        Some(self.globals.get(slot).copied().unwrap_or_default())
    }

    /// Declare `name` if needed and set it to `value`; returns its slot
    pub fn define_global(&mut self, name: &str, value: Value) -> VmResult<usize> {
        let slot = self.global_slot(name)?;
        self.globals[slot] = value;
        Ok(slot)
    }

    fn global_slot(&mut self, name: &str) -> Result<usize, SymbolError> {
        let slot = self.global_symbols.ensure(name)?;
        if self.globals.len() <= slot {
            self.globals.resize(slot + 1, Value::Null);
        }
        Ok(slot)
    }

    /// Forget every global declared at slot `count` or later.
    ///
    /// The core class globals are never forgotten.
    pub fn truncate_globals(&mut self, count: usize) {
        self.global_symbols.truncate(count);
        self.globals.truncate(self.global_symbols.len());
    }

    /// Method symbol table
    pub fn method_symbols(&self) -> &SymbolTable {
        &self.method_symbols
    }

    /// Method symbol table, for a compiler interning names up front.
    ///
    /// Names bound by the core library are protected and survive `truncate`.
    pub fn method_symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.method_symbols
    }

    /// Global symbol table
    pub fn global_symbols(&self) -> &SymbolTable {
        &self.global_symbols
    }

    /// Operand for method `name`, interning it if new
    pub fn method_symbol_index(&mut self, name: &str) -> Result<u16, SymbolError> {
        let index = self.method_symbols.ensure(name)?;
        operand(index, self.config.max_symbols)
    }

    /// The core classes
    pub fn classes(&self) -> &CoreClasses {
        &self.classes
    }

    /// The heap
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The fiber
    pub fn fiber(&self) -> &Fiber {
        &self.fiber
    }

    /// Run a full collection now
    pub fn collect_garbage(&mut self) -> CollectionReport {
        let rest = (&self.classes, &self.fiber);
        let roots = (&self.globals[..], &rest);
        self.heap.collect(&roots)
    }

    /// Collector statistics
    pub fn gc_stats(&self) -> &GcStats {
        self.heap.stats()
    }

    /// Allocate with every VM root reachable to a triggered collection
    pub(crate) fn allocate(&mut self, object: Obj) -> VmResult<ObjId> {
        let rest = (&self.classes, &self.fiber);
        let roots = (&self.globals[..], &rest);
        Ok(self.heap.allocate(object, &roots)?)
    }

    /// Allocate a string
    pub fn new_string(&mut self, text: impl Into<String>) -> VmResult<Value> {
        Ok(Value::Obj(self.allocate(Obj::Str(text.into()))?))
    }

    /// Allocate an instance of `class` with null fields
    pub(crate) fn new_instance(&mut self, class: ObjId) -> VmResult<ObjId> {
        let num_fields = self.class_ref(class)?.num_fields;
        self.allocate(Obj::Instance(ObjInstance {
            class,
            fields: vec![Value::Null; num_fields],
        }))
    }

    /// Allocate a class inheriting from `superclass`, with its metaclass.
    ///
    /// Method tables are copied from the superclass and the superclass's
    /// metaclass, so later changes to the parent are not inherited.
    pub(crate) fn new_class(
        &mut self,
        superclass: ObjId,
        own_fields: usize,
        name: &str,
    ) -> VmResult<ObjId> {
        let parent = self.class_ref(superclass)?;
        let num_fields = parent.num_fields + own_fields;
        let methods = parent.methods.clone();
        let parent_meta = parent.metaclass.unwrap_or(self.classes.class);

        let mut metaclass = ObjClass::new(metaclass_name(name), 0);
        metaclass.superclass = Some(parent_meta);
        metaclass.methods = self.class_ref(parent_meta)?.methods.clone();
        let metaclass = self.allocate(Obj::Class(metaclass))?;

        let token = self.heap.pin(metaclass);
        let mut class = ObjClass::new(name, num_fields);
        class.metaclass = Some(metaclass);
        class.superclass = Some(superclass);
        class.methods = methods;
        let class = self.allocate(Obj::Class(class));
        self.heap.unpin(token)?;
        class
    }

    /// Give an anonymous class the name it is first stored under
    pub(crate) fn name_class(&mut self, class: ObjId, name: &str) -> VmResult<()> {
        let Some(target) = self.heap.get_mut(class)?.as_class_mut() else {
            return Ok(());
        };
        if !target.name.is_empty() {
            return Ok(());
        }
        target.name = name.to_string();
        let metaclass = target.metaclass;
        self.heap.reaccount(class)?;
        if let Some(metaclass) = metaclass {
            if let Some(meta) = self.heap.get_mut(metaclass)?.as_class_mut() {
                meta.name = metaclass_name(name);
            }
            self.heap.reaccount(metaclass)?;
        }
        Ok(())
    }

    /// The class whose method table handles calls on `value`
    pub fn class_of(&self, value: Value) -> VmResult<ObjId> {
        let classes = &self.classes;
        Ok(match value {
            Value::Null => classes.null,
            Value::Bool(_) => classes.bool,
            Value::Num(_) => classes.num,
            Value::Obj(id) => match self.heap.get(id)? {
                Obj::Class(class) => class.metaclass.unwrap_or(classes.class),
                Obj::Fn(_) => classes.function,
                Obj::List(_) => classes.list,
                Obj::Str(_) => classes.string,
                Obj::Instance(instance) => instance.class,
            },
        })
    }

    /// Whether `value`'s class is `class` or inherits from it
    pub fn is_instance(&self, value: Value, class: ObjId) -> VmResult<bool> {
        let mut current = Some(self.class_of(value)?);
        while let Some(id) = current {
            if id == class {
                return Ok(true);
            }
            current = self.class_ref(id)?.superclass;
        }
        Ok(false)
    }

    pub(crate) fn class_ref(&self, id: ObjId) -> VmResult<&ObjClass> {
        match self.heap.get(id)? {
            Obj::Class(class) => Ok(class),
            other => Err(expected("class", other)),
        }
    }

    pub(crate) fn class_mut(&mut self, id: ObjId) -> VmResult<&mut ObjClass> {
        match self.heap.get_mut(id)? {
            Obj::Class(class) => Ok(class),
            other => Err(expected("class", other)),
        }
    }

    pub(crate) fn function_ref(&self, id: ObjId) -> VmResult<&ObjFn> {
        match self.heap.get(id)? {
            Obj::Fn(function) => Ok(function),
            other => Err(expected("function", other)),
        }
    }

    /// The text of `value` if it is a string
    pub fn as_str(&self, value: Value) -> Option<&str> {
        let id = value.as_obj()?;
        self.heap.get(id).ok()?.as_str()
    }

    /// Render `value` the way `toString` does.
    ///
    /// Strings print without quotes; lists print their elements.
    pub fn display(&self, value: Value) -> VmResult<String> {
        let mut out = String::new();
        self.display_into(value, 0, &mut out)?;
        Ok(out)
    }

    fn display_into(&self, value: Value, depth: usize, out: &mut String) -> VmResult<()> {
        let id = match value {
            Value::Obj(id) => id,
            immediate => {
                let _ = write!(out, "{}", immediate);
                return Ok(());
            }
        };
        match self.heap.get(id)? {
            Obj::Str(text) => out.push_str(text),
            Obj::Class(class) => out.push_str(display_name(&class.name)),
            Obj::Fn(function) => {
                let _ = write!(out, "<fn {}>", function.name);
            }
            Obj::Instance(instance) => {
                let _ = write!(
                    out,
                    "instance of {}",
                    display_name(&self.class_ref(instance.class)?.name)
                );
            }
            Obj::List(elements) => {
                if depth >= MAX_DISPLAY_DEPTH {
                    out.push_str("[...]");
                    return Ok(());
                }
                out.push('[');
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.display_into(*element, depth + 1, out)?;
                }
                out.push(']');
            }
        }
        Ok(())
    }
}

fn expected(kind: &str, found: &Obj) -> VmError {
    RuntimeError::type_error(format!("expected a {}, got a {}", kind, found.kind())).into()
}

fn metaclass_name(name: &str) -> String {
    if name.is_empty() {
        String::new()
    } else {
        format!("{} metaclass", name)
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "<anonymous class>"
    } else {
        name
    }
}

fn operand(index: usize, limit: usize) -> Result<u16, SymbolError> {
    u16::try_from(index).map_err(|_| SymbolError::Overflow { limit })
}

/// Assembled code resolves names against the VM's own tables.
impl SymbolResolver for Vm {
    fn method_symbol(&mut self, name: &str) -> Result<u16, SymbolError> {
        self.method_symbol_index(name)
    }

    fn global_symbol(&mut self, name: &str) -> Result<u16, SymbolError> {
        let slot = self.global_slot(name)?;
        operand(slot, self.config.max_symbols)
    }
}

impl RootSet for CoreClasses {
    fn visit_roots(&self, visitor: &mut impl memory_manager::Visitor) {
        for (_, class) in self.named() {
            visitor.visit_obj(class);
        }
    }
}

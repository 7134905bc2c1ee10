//! Built-in classes and their primitive methods.
//!
//! Primitives are plain functions registered in the VM's primitive table
//! and bound into method tables as [`Method::Primitive`] entries. They
//! receive the receiver and arguments by value while those values are
//! still on the fiber's stack, so anything they allocate cannot free them.

use std::io::Write;

use arrayvec::ArrayVec;
use core_types::{ObjId, RuntimeError, RuntimeErrorKind, Value, VmResult};
use memory_manager::{Heap, Method, Obj, ObjClass};

use crate::symbol_table::SymbolTable;
use crate::vm::Vm;

/// Receiver followed by up to ten arguments
pub type Args = ArrayVec<Value, 11>;

/// A built-in method body
pub type Primitive = fn(&mut Vm, &Args) -> VmResult<PrimitiveOutcome>;

/// A registered primitive and the argument count it accepts
#[derive(Clone, Copy)]
pub(crate) struct PrimitiveEntry {
    pub(crate) body: Primitive,
    /// `None` accepts any argument count
    pub(crate) arity: Option<u8>,
}

/// What a primitive asks the interpreter to do next
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimitiveOutcome {
    /// Replace the receiver and arguments with this value
    Value(Value),
    /// Run this function over the receiver and arguments
    Call(ObjId),
}

/// Handles to the classes every VM starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreClasses {
    /// Root of the class hierarchy
    pub object: ObjId,
    /// Superclass of every metaclass
    pub class: ObjId,
    /// `true` and `false`
    pub bool: ObjId,
    /// `null`
    pub null: ObjId,
    /// Numbers
    pub num: ObjId,
    /// Strings
    pub string: ObjId,
    /// Lists
    pub list: ObjId,
    /// Function objects
    pub function: ObjId,
    /// Console output
    pub io: ObjId,
}

impl CoreClasses {
    /// Global names under which the classes are published
    pub fn named(&self) -> [(&'static str, ObjId); 9] {
        [
            ("Object", self.object),
            ("Class", self.class),
            ("Bool", self.bool),
            ("Null", self.null),
            ("Num", self.num),
            ("String", self.string),
            ("List", self.list),
            ("Fn", self.function),
            ("IO", self.io),
        ]
    }
}

struct Bootstrap<'a> {
    heap: &'a mut Heap,
    symbols: &'a mut SymbolTable,
    primitives: &'a mut Vec<PrimitiveEntry>,
    /// Everything allocated so far; the core classes have no other root yet
    roots: Vec<Value>,
}

impl Bootstrap<'_> {
    fn class(&mut self, name: &str, superclass: Option<ObjId>) -> VmResult<ObjId> {
        let mut class = ObjClass::new(name, 0);
        if let Some(superclass) = superclass {
            class.methods = self.get(superclass)?.methods.clone();
            class.superclass = Some(superclass);
        }
        self.alloc(class)
    }

    fn metaclass(&mut self, target: ObjId, class_class: ObjId) -> VmResult<ObjId> {
        let name = format!("{} metaclass", self.get(target)?.name);
        let mut metaclass = ObjClass::new(name, 0);
        metaclass.methods = self.get(class_class)?.methods.clone();
        metaclass.superclass = Some(class_class);
        let metaclass = self.alloc(metaclass)?;
        self.get_mut(target)?.metaclass = Some(metaclass);
        Ok(metaclass)
    }

    fn alloc(&mut self, class: ObjClass) -> VmResult<ObjId> {
        let id = self.heap.allocate(Obj::Class(class), &self.roots[..])?;
        self.roots.push(Value::Obj(id));
        Ok(id)
    }

    fn primitive(&mut self, class: ObjId, name: &str, arity: u8, body: Primitive) -> VmResult<()> {
        self.bind(class, name, Some(arity), body)
    }

    fn variadic(&mut self, class: ObjId, name: &str, body: Primitive) -> VmResult<()> {
        self.bind(class, name, None, body)
    }

    fn bind(
        &mut self,
        class: ObjId,
        name: &str,
        arity: Option<u8>,
        body: Primitive,
    ) -> VmResult<()> {
        let symbol = self.symbols.ensure(name)?;
        self.primitives.push(PrimitiveEntry { body, arity });
        let method = Method::Primitive(self.primitives.len() - 1);
        self.get_mut(class)?.bind(symbol, method);
        self.heap.reaccount(class)?;
        Ok(())
    }

    fn get(&self, id: ObjId) -> VmResult<&ObjClass> {
        self.heap
            .get(id)?
            .as_class()
            .ok_or_else(|| RuntimeError::type_error("core class is not a class").into())
    }

    fn get_mut(&mut self, id: ObjId) -> VmResult<&mut ObjClass> {
        self.heap
            .get_mut(id)?
            .as_class_mut()
            .ok_or_else(|| RuntimeError::type_error("core class is not a class").into())
    }
}

/// Allocate the core classes and bind their primitives.
///
/// Subclasses copy their parent's method table when created, so each
/// class's own primitives are bound before anything inherits from it.
pub(crate) fn bootstrap(
    heap: &mut Heap,
    symbols: &mut SymbolTable,
    primitives: &mut Vec<PrimitiveEntry>,
) -> VmResult<CoreClasses> {
    let mut boot = Bootstrap {
        heap,
        symbols,
        primitives,
        roots: Vec::new(),
    };

    let object = boot.class("Object", None)?;
    boot.primitive(object, "==", 1, object_eq)?;
    boot.primitive(object, "!=", 1, object_ne)?;
    boot.primitive(object, "toString", 0, to_string)?;
    boot.primitive(object, "type", 0, object_type)?;

    let class = boot.class("Class", Some(object))?;
    boot.primitive(class, "new", 0, class_new)?;
    boot.primitive(class, "name", 0, class_name)?;
    boot.metaclass(object, class)?;
    boot.metaclass(class, class)?;

    let mut define = |name: &str| -> VmResult<ObjId> {
        let id = boot.class(name, Some(object))?;
        boot.metaclass(id, class)?;
        Ok(id)
    };
    let bool_class = define("Bool")?;
    let null = define("Null")?;
    let num = define("Num")?;
    let string = define("String")?;
    let list = define("List")?;
    let function = define("Fn")?;
    let io = define("IO")?;

    boot.primitive(bool_class, "!", 0, bool_not)?;

    let arithmetic: [(&str, u8, Primitive); 11] = [
        ("+", 1, num_add),
        ("-", 1, num_sub),
        ("*", 1, num_mul),
        ("/", 1, num_div),
        ("%", 1, num_mod),
        ("<", 1, num_lt),
        (">", 1, num_gt),
        ("<=", 1, num_le),
        (">=", 1, num_ge),
        ("neg", 0, num_neg),
        ("abs", 0, num_abs),
    ];
    for (name, arity, primitive) in arithmetic {
        boot.primitive(num, name, arity, primitive)?;
    }

    boot.primitive(string, "+", 1, string_plus)?;
    boot.primitive(string, "count", 0, string_count)?;
    boot.primitive(string, "==", 1, string_eq)?;
    boot.primitive(string, "!=", 1, string_ne)?;

    boot.primitive(list, "count", 0, list_count)?;
    boot.primitive(list, "add", 1, list_add)?;
    boot.primitive(list, "[]", 1, list_get)?;
    boot.primitive(list, "[]=", 2, list_set)?;

    // Checked against the function's own arity when called.
    boot.variadic(function, "call", fn_call)?;

    let io_meta = boot
        .get(io)?
        .metaclass
        .ok_or_else(|| RuntimeError::type_error("IO has no metaclass"))?;
    boot.primitive(io_meta, "write", 1, io_write)?;

    log::debug!(
        "core library: {} classes, {} primitives",
        boot.roots.len(),
        boot.primitives.len()
    );

    Ok(CoreClasses {
        object,
        class,
        bool: bool_class,
        null,
        num,
        string,
        list,
        function,
        io,
    })
}

fn value(value: Value) -> VmResult<PrimitiveOutcome> {
    Ok(PrimitiveOutcome::Value(value))
}

fn arg(args: &Args, index: usize) -> Value {
    args.get(index).copied().unwrap_or_default()
}

fn object_eq(_vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    value(Value::Bool(arg(args, 0) == arg(args, 1)))
}

fn object_ne(_vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    value(Value::Bool(arg(args, 0) != arg(args, 1)))
}

fn to_string(vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    let receiver = arg(args, 0);
    if vm.as_str(receiver).is_some() {
        return value(receiver);
    }
    let text = vm.display(receiver)?;
    value(vm.new_string(text)?)
}

fn object_type(vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    let receiver = arg(args, 0);
    let class = match receiver {
        // A class's type is the class it was declared as, not its metaclass.
        Value::Obj(id) if vm.class_ref(id).is_ok() => vm.classes.class,
        other => vm.class_of(other)?,
    };
    value(Value::Obj(class))
}

fn receiver_class(vm: &Vm, args: &Args) -> VmResult<ObjId> {
    match arg(args, 0) {
        Value::Obj(id) if vm.class_ref(id).is_ok() => Ok(id),
        other => {
            let message = format!("{} is not a class", other.type_name());
            Err(RuntimeError::type_error(message).into())
        }
    }
}

fn class_new(vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    let class = receiver_class(vm, args)?;
    value(Value::Obj(vm.new_instance(class)?))
}

fn class_name(vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    let class = receiver_class(vm, args)?;
    let name = vm.class_ref(class)?.name.clone();
    value(vm.new_string(name)?)
}

fn bool_not(_vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    value(Value::Bool(!arg(args, 0).is_truthy()))
}

fn numbers(args: &Args) -> VmResult<(f64, f64)> {
    let left = arg(args, 0)
        .as_num()
        .ok_or_else(|| RuntimeError::type_error("receiver must be a num"))?;
    let right = arg(args, 1)
        .as_num()
        .ok_or_else(|| RuntimeError::type_error("right operand must be a num"))?;
    Ok((left, right))
}

macro_rules! num_binary {
    ($name:ident, $wrap:expr, |$a:ident, $b:ident| $body:expr) => {
        fn $name(_vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
            let ($a, $b) = numbers(args)?;
            value($wrap($body))
        }
    };
}

num_binary!(num_add, Value::Num, |a, b| a + b);
num_binary!(num_sub, Value::Num, |a, b| a - b);
num_binary!(num_mul, Value::Num, |a, b| a * b);
num_binary!(num_div, Value::Num, |a, b| a / b);
num_binary!(num_mod, Value::Num, |a, b| a % b);
num_binary!(num_lt, Value::Bool, |a, b| a < b);
num_binary!(num_gt, Value::Bool, |a, b| a > b);
num_binary!(num_le, Value::Bool, |a, b| a <= b);
num_binary!(num_ge, Value::Bool, |a, b| a >= b);

fn num_neg(_vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    let n = arg(args, 0)
        .as_num()
        .ok_or_else(|| RuntimeError::type_error("receiver must be a num"))?;
    value(Value::Num(-n))
}

fn num_abs(_vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    let n = arg(args, 0)
        .as_num()
        .ok_or_else(|| RuntimeError::type_error("receiver must be a num"))?;
    value(Value::Num(n.abs()))
}

fn string_plus(vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    let left = vm
        .as_str(arg(args, 0))
        .ok_or_else(|| RuntimeError::type_error("receiver must be a string"))?;
    let right = vm
        .as_str(arg(args, 1))
        .ok_or_else(|| RuntimeError::type_error("right operand must be a string"))?;
    let joined = format!("{}{}", left, right);
    value(vm.new_string(joined)?)
}

fn string_count(vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    let text = vm
        .as_str(arg(args, 0))
        .ok_or_else(|| RuntimeError::type_error("receiver must be a string"))?;
    value(Value::Num(text.chars().count() as f64))
}

fn strings_equal(vm: &Vm, args: &Args) -> bool {
    match (vm.as_str(arg(args, 0)), vm.as_str(arg(args, 1))) {
        (Some(left), Some(right)) => left == right,
        _ => arg(args, 0) == arg(args, 1),
    }
}

fn string_eq(vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    value(Value::Bool(strings_equal(vm, args)))
}

fn string_ne(vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    value(Value::Bool(!strings_equal(vm, args)))
}

fn list_id(vm: &Vm, args: &Args) -> VmResult<ObjId> {
    match arg(args, 0) {
        Value::Obj(id) if vm.heap.get(id)?.as_list().is_some() => Ok(id),
        _ => Err(RuntimeError::type_error("receiver must be a list").into()),
    }
}

fn list_len(vm: &Vm, id: ObjId) -> VmResult<usize> {
    Ok(vm.heap.get(id)?.as_list().map_or(0, Vec::len))
}

/// Resolve a possibly negative index against a list of `len` elements
fn list_index(index: Value, len: usize) -> VmResult<usize> {
    let n = index
        .as_num()
        .ok_or_else(|| RuntimeError::type_error("list index must be a num"))?;
    if n.fract() != 0.0 {
        return Err(RuntimeError::type_error("list index must be an integer").into());
    }
    let resolved = if n < 0.0 { len as f64 + n } else { n };
    if resolved < 0.0 || resolved >= len as f64 {
        return Err(RuntimeError::new(
            RuntimeErrorKind::IndexOutOfRange,
            format!("index {} out of bounds for list of {}", n, len),
        )
        .into());
    }
    Ok(resolved as usize)
}

fn list_count(vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    let id = list_id(vm, args)?;
    value(Value::Num(list_len(vm, id)? as f64))
}

fn list_add(vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    let id = list_id(vm, args)?;
    let element = arg(args, 1);
    if let Some(elements) = vm.heap.get_mut(id)?.as_list_mut() {
        elements.push(element);
    }
    vm.heap.reaccount(id)?;
    value(element)
}

fn list_get(vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    let id = list_id(vm, args)?;
    let index = list_index(arg(args, 1), list_len(vm, id)?)?;
    let element = vm
        .heap
        .get(id)?
        .as_list()
        .and_then(|elements| elements.get(index).copied())
        .unwrap_or_default();
    value(element)
}

fn list_set(vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    let id = list_id(vm, args)?;
    let index = list_index(arg(args, 1), list_len(vm, id)?)?;
    let element = arg(args, 2);
    if let Some(elements) = vm.heap.get_mut(id)?.as_list_mut() {
        elements[index] = element;
    }
    value(element)
}

fn fn_call(vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    let id = arg(args, 0)
        .as_obj()
        .ok_or_else(|| RuntimeError::type_error("receiver must be a function"))?;
    let function = vm.function_ref(id)?;
    let given = args.len() - 1;
    if usize::from(function.arity) != given {
        return Err(RuntimeError::new(
            RuntimeErrorKind::ArityMismatch,
            format!(
                "function '{}' expects {} arguments, got {}",
                function.name, function.arity, given
            ),
        )
        .into());
    }
    Ok(PrimitiveOutcome::Call(id))
}

fn io_write(vm: &mut Vm, args: &Args) -> VmResult<PrimitiveOutcome> {
    let argument = arg(args, 1);
    let text = vm.display(argument)?;
    if let Err(e) = writeln!(vm.output, "{}", text) {
        log::warn!("IO.write failed: {}", e);
    }
    value(argument)
}

//! Heap object kinds and their reference edges.
//!
//! Every object the collector manages is an [`Obj`]. Objects refer to each
//! other only through [`ObjId`] handles, so the collector discovers the
//! object graph by asking each object to visit its edges.

use std::mem;
use std::rc::Rc;

use core_types::{ObjId, Value};

/// Receives the outgoing references of an object or root set.
pub trait Visitor {
    /// Called once per referenced value; immediates are ignored by collectors
    fn visit(&mut self, value: Value);

    /// Called once per referenced object handle
    fn visit_obj(&mut self, id: ObjId) {
        self.visit(Value::Obj(id));
    }
}

/// Something that holds references the collector must follow.
pub trait Visitable {
    /// Report every directly referenced value to `visitor`
    fn visit_edges(&self, visitor: &mut impl Visitor);
}

/// One entry in a class's method table, indexed by method symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// No method bound for this symbol
    #[default]
    None,
    /// Built-in operation, indexed into the VM's primitive registry
    Primitive(usize),
    /// Function object run as a method body
    Block(ObjId),
    /// Function object run as a constructor on a fresh instance
    Ctor(ObjId),
}

impl Method {
    /// The function object behind the method, if it has one
    pub fn function(&self) -> Option<ObjId> {
        match self {
            Method::Block(id) | Method::Ctor(id) => Some(*id),
            Method::None | Method::Primitive(_) => None,
        }
    }
}

/// A class: method table plus layout of its instances.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjClass {
    /// Class name, for diagnostics
    pub name: String,
    /// Class whose method table holds this class's static methods.
    ///
    /// `None` only while the core classes are being wired up.
    pub metaclass: Option<ObjId>,
    /// Parent class, if any
    pub superclass: Option<ObjId>,
    /// Method table indexed by method symbol
    pub methods: Vec<Method>,
    /// Fields per instance, including inherited ones
    pub num_fields: usize,
}

impl ObjClass {
    /// Create a class with an empty method table
    pub fn new(name: impl Into<String>, num_fields: usize) -> Self {
        Self {
            name: name.into(),
            metaclass: None,
            superclass: None,
            methods: Vec::new(),
            num_fields,
        }
    }

    /// Look up the method bound to `symbol`
    pub fn method(&self, symbol: usize) -> Method {
        self.methods.get(symbol).copied().unwrap_or_default()
    }

    /// Bind `method` to `symbol`, growing the table as needed
    pub fn bind(&mut self, symbol: usize, method: Method) {
        if symbol >= self.methods.len() {
            self.methods.resize(symbol + 1, Method::None);
        }
        self.methods[symbol] = method;
    }
}

/// A compiled function ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjFn {
    /// Function name, for stack traces
    pub name: String,
    /// Declared parameter count, excluding the receiver
    pub arity: u8,
    /// Encoded instructions; shared so frames can read them without
    /// borrowing the heap
    pub code: Rc<[u8]>,
    /// Constant pool with strings and nested functions already on the heap
    pub constants: Vec<Value>,
}

/// An instance of a user-defined class.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjInstance {
    /// The instance's class
    pub class: ObjId,
    /// Field values, all null at creation
    pub fields: Vec<Value>,
}

/// A garbage-collected object.
#[derive(Debug, Clone, PartialEq)]
pub enum Obj {
    /// Class or metaclass
    Class(ObjClass),
    /// Function
    Fn(ObjFn),
    /// Growable list
    List(Vec<Value>),
    /// Immutable string
    Str(String),
    /// Class instance
    Instance(ObjInstance),
}

impl Obj {
    /// Kind name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Obj::Class(_) => "class",
            Obj::Fn(_) => "function",
            Obj::List(_) => "list",
            Obj::Str(_) => "string",
            Obj::Instance(_) => "instance",
        }
    }

    /// Bytes charged to the collector for this object.
    ///
    /// The estimate counts the enum itself plus the payload it owns. It is
    /// recomputed by `Heap::reaccount` when an object grows.
    pub fn size_bytes(&self) -> usize {
        let payload = match self {
            Obj::Class(class) => {
                class.name.len() + class.methods.len() * mem::size_of::<Method>()
            }
            Obj::Fn(function) => {
                function.name.len()
                    + function.code.len()
                    + function.constants.len() * mem::size_of::<Value>()
            }
            Obj::List(elements) => elements.len() * mem::size_of::<Value>(),
            Obj::Str(text) => text.len(),
            Obj::Instance(instance) => instance.fields.len() * mem::size_of::<Value>(),
        };
        mem::size_of::<Obj>() + payload
    }

    /// Borrow as a class
    pub fn as_class(&self) -> Option<&ObjClass> {
        match self {
            Obj::Class(class) => Some(class),
            _ => None,
        }
    }

    /// Mutably borrow as a class
    pub fn as_class_mut(&mut self) -> Option<&mut ObjClass> {
        match self {
            Obj::Class(class) => Some(class),
            _ => None,
        }
    }

    /// Borrow as a function
    pub fn as_fn(&self) -> Option<&ObjFn> {
        match self {
            Obj::Fn(function) => Some(function),
            _ => None,
        }
    }

    /// Borrow as a list
    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Obj::List(elements) => Some(elements),
            _ => None,
        }
    }

    /// Mutably borrow as a list
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Obj::List(elements) => Some(elements),
            _ => None,
        }
    }

    /// Borrow as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Obj::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Borrow as an instance
    pub fn as_instance(&self) -> Option<&ObjInstance> {
        match self {
            Obj::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    /// Mutably borrow as an instance
    pub fn as_instance_mut(&mut self) -> Option<&mut ObjInstance> {
        match self {
            Obj::Instance(instance) => Some(instance),
            _ => None,
        }
    }
}

impl Visitable for ObjClass {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        if let Some(metaclass) = self.metaclass {
            visitor.visit_obj(metaclass);
        }
        if let Some(superclass) = self.superclass {
            visitor.visit_obj(superclass);
        }
        for method in &self.methods {
            if let Some(function) = method.function() {
                visitor.visit_obj(function);
            }
        }
    }
}

impl Visitable for ObjFn {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        for constant in &self.constants {
            visitor.visit(*constant);
        }
    }
}

impl Visitable for ObjInstance {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        visitor.visit_obj(self.class);
        for field in &self.fields {
            visitor.visit(*field);
        }
    }
}

// Dispatch to the concrete kind, which reports its own edges.
impl Visitable for Obj {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        match self {
            Obj::Class(class) => class.visit_edges(visitor),
            Obj::Fn(function) => function.visit_edges(visitor),
            Obj::List(elements) => {
                for element in elements {
                    visitor.visit(*element);
                }
            }
            Obj::Str(_) => {}
            Obj::Instance(instance) => instance.visit_edges(visitor),
        }
    }
}

//! Runtime values for the embedded module language
//!
//! All value shapes are a closed tagged variant; every consumer matches
//! exhaustively. Callables carry their defining module and dotted qualified
//! name, which is what the introspector and dependency resolver key on.
//! Callable identity is `Rc` pointer identity.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::syntax::ast::FnDef;
use crate::Result;

/// A module-level (or rebound) global namespace, shared by every callable
/// defined in it.
#[derive(Debug, Clone, Default)]
pub struct Namespace(Rc<RefCell<HashMap<String, Value>>>);

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.0.borrow_mut().insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.borrow().contains_key(name)
    }

    /// All entries, sorted by name for deterministic iteration.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        let mut entries: Vec<(String, Value)> = self
            .0
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn ptr_eq(&self, other: &Namespace) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A chain of local frames: the enclosing lexical environment of a closure
/// plus the frame of the currently executing call.
#[derive(Debug, Clone, Default)]
pub struct Env {
    frames: Vec<Rc<RefCell<HashMap<String, Value>>>>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a fresh innermost frame.
    pub fn push_frame(&mut self) {
        self.frames.push(Rc::new(RefCell::new(HashMap::new())));
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.borrow().get(name) {
                return Some(value.clone());
            }
        }
        None
    }

    /// Bind a name in the innermost frame.
    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        if self.frames.is_empty() {
            self.push_frame();
        }
        self.frames
            .last()
            .expect("frame pushed above")
            .borrow_mut()
            .insert(name.into(), value);
    }
}

/// A user-defined function or method.
#[derive(Debug)]
pub struct Function {
    /// Bare name (`f`, or `m` for a method)
    pub name: String,
    /// Dotted name below the module (`f`, `C.m`, `outer.inner`)
    pub qualname: String,
    /// Defining module name
    pub module: String,
    /// Definition tree, shared with other instances of the same def
    pub def: Rc<FnDef>,
    /// The defining module's (or rebound) global namespace
    pub globals: Namespace,
    /// Enclosing local environment for nested functions
    pub captures: Option<Env>,
    /// Default values, evaluated at definition time, aligned with params
    pub defaults: Vec<Option<Value>>,
}

impl Function {
    /// `module.qualname`, the function's binding-path prefix.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.module, self.qualname)
    }
}

/// A class: a named container of methods.
#[derive(Debug)]
pub struct ClassObj {
    pub name: String,
    pub module: String,
    pub line_start: u32,
    pub line_end: u32,
    /// Methods in definition order
    pub methods: Vec<(String, Rc<Function>)>,
}

impl ClassObj {
    pub fn method(&self, name: &str) -> Option<&Rc<Function>> {
        self.methods
            .iter()
            .find(|(method_name, _)| method_name == name)
            .map(|(_, function)| function)
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }
}

/// An instance of a class.
#[derive(Debug)]
pub struct Instance {
    pub class: Rc<ClassObj>,
    pub fields: RefCell<HashMap<String, Value>>,
}

/// A method bound to its receiver.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub function: Rc<Function>,
}

/// A handle to a module's namespace, bound by `import m`.
#[derive(Debug)]
pub struct ModuleRef {
    pub name: String,
    pub namespace: Namespace,
}

/// A builtin function implemented in Rust. Builtins have no retrievable
/// source text.
pub struct NativeFn {
    pub name: &'static str,
    pub handler: fn(&[Value]) -> Result<Value>,
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn").field("name", &self.name).finish()
    }
}

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bool(bool),
    Nil,
    List(Rc<Vec<Value>>),
    Tuple(Rc<Vec<Value>>),
    Map(Rc<Vec<(Value, Value)>>),
    Function(Rc<Function>),
    Class(Rc<ClassObj>),
    Instance(Rc<Instance>),
    BoundMethod(Rc<BoundMethod>),
    Module(Rc<ModuleRef>),
    Native(Rc<NativeFn>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Nil => "nil",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
            Value::BoundMethod(_) => "bound method",
            Value::Module(_) => "module",
            Value::Native(_) => "builtin",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Nil => false,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Tuple(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Function(_)
            | Value::Class(_)
            | Value::Instance(_)
            | Value::BoundMethod(_)
            | Value::Module(_)
            | Value::Native(_) => true,
        }
    }

    /// Whether this value can be invoked.
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Class(_) | Value::BoundMethod(_) | Value::Native(_)
        )
    }

    /// Stable identity for callables, used for cycle detection and memoing.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Function(f) => Some(Rc::as_ptr(f) as usize),
            Value::Class(c) => Some(Rc::as_ptr(c) as usize),
            Value::BoundMethod(b) => Some(Rc::as_ptr(&b.function) as usize),
            Value::Native(n) => Some(Rc::as_ptr(n) as usize),
            _ => None,
        }
    }

    /// The module that owns this value's definition, if it has one.
    pub fn owning_module(&self) -> Option<&str> {
        match self {
            Value::Function(f) => Some(&f.module),
            Value::Class(c) => Some(&c.module),
            Value::BoundMethod(b) => Some(&b.function.module),
            Value::Instance(i) => Some(&i.class.module),
            Value::Module(m) => Some(&m.name),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::BoundMethod(a), Value::BoundMethod(b)) => {
                Rc::ptr_eq(&a.function, &b.function) && a.receiver == b.receiver
            }
            (Value::Module(a), Value::Module(b)) => a.namespace.ptr_eq(&b.namespace),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Nil => write!(f, "nil"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::Function(function) => write!(f, "<function {}>", function.full_name()),
            Value::Class(class) => write!(f, "<class {}>", class.full_name()),
            Value::Instance(instance) => {
                write!(f, "<instance of {}>", instance.class.full_name())
            }
            Value::BoundMethod(bound) => {
                write!(f, "<bound method {}>", bound.function.full_name())
            }
            Value::Module(module) => write!(f, "<module {}>", module.name),
            Value::Native(native) => write!(f, "<builtin {}>", native.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(Value::Int(3).is_truthy());
        assert!(Value::str("x").is_truthy());
        assert!(!Value::List(Rc::new(Vec::new())).is_truthy());
    }

    #[test]
    fn test_numeric_equality_promotes() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::Float(2.5));
    }

    #[test]
    fn test_namespace_shared_between_clones() {
        let ns = Namespace::new();
        let alias = ns.clone();
        ns.set("k", Value::Int(10));
        assert_eq!(alias.get("k"), Some(Value::Int(10)));
        assert!(ns.ptr_eq(&alias));
    }

    #[test]
    fn test_env_lookup_walks_frames() {
        let mut env = Env::new();
        env.push_frame();
        env.set_local("outer", Value::Int(1));
        env.push_frame();
        env.set_local("inner", Value::Int(2));
        assert_eq!(env.get("outer"), Some(Value::Int(1)));
        assert_eq!(env.get("inner"), Some(Value::Int(2)));
        assert_eq!(env.get("missing"), None);
    }
}

//! Runtime for the embedded module language
//!
//! Values, namespaces, lexical environments, and the tree-walking
//! evaluator. Rebinding works entirely at this level: a rebound callable is
//! an ordinary [`value::Function`] whose globals point at a freshly built
//! namespace instead of the original module's.

pub mod builtins;
pub mod eval;
pub mod value;

pub use eval::{call, call_function, exec_module, ImportResolver};
pub use value::{Env, Function, Namespace, Value};

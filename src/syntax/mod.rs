//! Front end for the embedded module language
//!
//! The language is the explicit intermediate representation the rebind
//! engine operates on: modules are plain text, parsed into line-annotated
//! trees that the Scope-Rewriter can transform and the interpreter can
//! re-execute.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{AssignTarget, BinaryOp, ClassDef, Expr, FnDef, ModuleAst, Param, Stmt, UnaryOp};
pub use parser::{parse_expression, parse_module};

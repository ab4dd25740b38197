//! # Rebind - Constant introspection and rebinding engine
//!
//! Discovers every hard-coded literal constant reachable from a function,
//! method, or class hosted in the embedded module language - including
//! constants buried in closures, default arguments, and transitively in
//! other modules - and produces a *new* callable in which a chosen subset
//! of those constants has been replaced, without mutating the originals.
//!
//! Rebind provides:
//! - An embedded, dynamically typed module language (lexer, parser,
//!   tree-walking interpreter with lexical closures)
//! - A caller-owned [`ModuleRegistry`] acting as the import cache
//! - [`introspect`]: a flat catalog of rebindable constants keyed by
//!   dotted binding paths (`module.scope.name`)
//! - [`rebind`]: dependency-ordered module rewriting and re-execution
//!   that preserves shared globals, nested scopes, and mutual recursion

pub mod config;
pub mod freevars;
pub mod interp;
pub mod introspect;
pub mod literal;
pub mod rebind;
pub mod registry;
pub mod source;
pub mod syntax;
pub mod ui;

// Re-exports for convenient access
pub use interp::value::{Function, Namespace, Value};
pub use introspect::{BindingCatalog, BindingsRequest, CatalogEntry, Target};
pub use literal::Literal;
pub use registry::ModuleRegistry;

/// Result type alias for rebind operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for rebind operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Source text for a callable or module cannot be retrieved
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// A value or syntax node outside the literal domain
    #[error("Unsupported literal: {0}")]
    UnsupportedLiteral(String),

    /// An ambiguous or unsupported rewrite target
    #[error("Unsupported rebind: {0}")]
    UnsupportedRebind(String),

    /// Module dependency cycle detected while ordering a rebind
    #[error("Cyclic rebind involving module '{0}'")]
    CyclicRebind(String),

    /// A dotted path cannot be resolved to a live module or attribute
    #[error("Import resolution failed: {0}")]
    ImportResolution(String),

    /// Syntax error in module source
    #[error("Parse error at line {line}: {message}")]
    Parse { line: u32, message: String },

    /// Error raised while executing module code
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Reserved extension point that has no behavior yet
    #[error("'{0}' is not implemented")]
    NotImplemented(&'static str),

    /// IO error while reading module sources
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Introspect a callable (or dotted path) into its binding catalog.
///
/// Convenience wrapper over [`ModuleRegistry::introspect`].
pub fn introspect(
    registry: &mut ModuleRegistry,
    target: impl Into<Target>,
) -> Result<BindingCatalog> {
    registry.introspect(target)
}

/// Produce a new callable with the requested literal slots replaced.
///
/// Convenience wrapper over [`ModuleRegistry::rebind`].
pub fn rebind(
    registry: &mut ModuleRegistry,
    target: impl Into<Target>,
    bindings: &BindingsRequest,
) -> Result<Value> {
    registry.rebind(target, bindings)
}

/// Reverse-resolve a binding path to its current value.
///
/// Reserved extension point; always returns [`Error::NotImplemented`].
pub fn lookup(_registry: &mut ModuleRegistry, _path: &str) -> Result<Value> {
    Err(Error::NotImplemented("lookup"))
}

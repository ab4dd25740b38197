//! Introspector
//!
//! Builds the flat binding catalog reachable from a callable: literal
//! default arguments and literal body assignments under the callable's own
//! scope path, plus everything reachable through its free variables.
//! Callable free variables are recursed into; literal free variables are
//! keyed under their defining module, or under the enclosing function that
//! binds them when they were captured; anything else is recorded opaquely
//! so a rebind can still locate the owning module.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use crate::interp::value::{ClassObj, Function, Value};
use crate::literal::{is_literal_expr, Literal};
use crate::registry::ModuleRegistry;
use crate::syntax::ast::{AssignTarget, FnDef, Stmt};
use crate::{freevars, source, Error, Result};

/// What to introspect or rebind: a live callable or a dotted path.
#[derive(Debug, Clone)]
pub enum Target {
    Callable(Value),
    Path(String),
}

impl From<Value> for Target {
    fn from(value: Value) -> Self {
        Target::Callable(value)
    }
}

impl From<&str> for Target {
    fn from(path: &str) -> Self {
        Target::Path(path.to_string())
    }
}

impl From<String> for Target {
    fn from(path: String) -> Self {
        Target::Path(path)
    }
}

/// One catalog entry: a rebindable literal, a referenced callable, or an
/// opaque object that only locates its owning module.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEntry {
    Literal(Literal),
    Callable(Value),
    Opaque(Value),
}

impl CatalogEntry {
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            CatalogEntry::Literal(literal) => Some(literal),
            CatalogEntry::Callable(_) | CatalogEntry::Opaque(_) => None,
        }
    }

    /// Short tag for human-readable output.
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogEntry::Literal(_) => "literal",
            CatalogEntry::Callable(_) => "callable",
            CatalogEntry::Opaque(_) => "opaque",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CatalogEntry::Literal(literal) => literal.to_json(),
            CatalogEntry::Callable(value) | CatalogEntry::Opaque(value) => {
                serde_json::Value::String(value.to_string())
            }
        }
    }
}

impl std::fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogEntry::Literal(literal) => write!(f, "{}", literal),
            CatalogEntry::Callable(value) | CatalogEntry::Opaque(value) => {
                write!(f, "{}", value)
            }
        }
    }
}

/// Binding path -> current entry, deterministic order.
pub type BindingCatalog = BTreeMap<String, CatalogEntry>;

/// Binding path -> replacement literal.
pub type BindingsRequest = BTreeMap<String, Literal>;

/// Resolve a target to a live value, loading modules for dotted paths.
pub(crate) fn resolve_target(registry: &mut ModuleRegistry, target: Target) -> Result<Value> {
    match target {
        Target::Callable(value) => Ok(value),
        Target::Path(path) => registry.resolve(&path),
    }
}

/// Entry point used by [`ModuleRegistry::introspect`].
pub(crate) fn run(registry: &mut ModuleRegistry, target: Target) -> Result<BindingCatalog> {
    let value = resolve_target(registry, target)?;
    let mut introspector = Introspector::new(registry);
    introspector.value(&value)
}

struct Introspector<'r> {
    registry: &'r ModuleRegistry,
    /// Identities on the current descent, to cut closure cycles
    in_progress: HashSet<usize>,
    /// Per-call memo by callable identity
    memo: HashMap<usize, BindingCatalog>,
}

impl<'r> Introspector<'r> {
    fn new(registry: &'r ModuleRegistry) -> Self {
        Self {
            registry,
            in_progress: HashSet::new(),
            memo: HashMap::new(),
        }
    }

    fn value(&mut self, value: &Value) -> Result<BindingCatalog> {
        match value {
            Value::Function(function) => self.function(function),
            Value::BoundMethod(bound) => self.function(&bound.function),
            Value::Class(class) => self.class(class),
            Value::Native(native) => Err(Error::SourceUnavailable(format!(
                "builtin '{}' has no source",
                native.name
            ))),
            other => Err(Error::Runtime(format!(
                "cannot introspect a value of type {}",
                other.type_name()
            ))),
        }
    }

    fn function(&mut self, function: &Rc<Function>) -> Result<BindingCatalog> {
        let identity = Rc::as_ptr(function) as usize;
        if self.in_progress.contains(&identity) {
            // Already being processed higher on this descent.
            return Ok(BindingCatalog::new());
        }
        if let Some(catalog) = self.memo.get(&identity) {
            return Ok(catalog.clone());
        }

        self.in_progress.insert(identity);
        let result = self.function_inner(function);
        self.in_progress.remove(&identity);
        let catalog = result?;
        self.memo.insert(identity, catalog.clone());
        Ok(catalog)
    }

    fn function_inner(&mut self, function: &Rc<Function>) -> Result<BindingCatalog> {
        let def = source::function_tree(self.registry, function)?;
        let prefix = function.full_name();

        let mut catalog = BindingCatalog::new();
        for (name, value) in freevars::resolve(function) {
            self.free_variable(&mut catalog, function, &name, &value)?;
        }
        // Own entries win over anything inherited under the same path.
        catalog.extend(own_entries(&def, &prefix)?);
        Ok(catalog)
    }

    /// Fold one resolved free variable into the catalog.
    fn free_variable(
        &mut self,
        catalog: &mut BindingCatalog,
        function: &Rc<Function>,
        name: &str,
        value: &Value,
    ) -> Result<()> {
        if value.is_callable() {
            catalog.extend(self.value(value)?);
            catalog.insert(
                format!("{}.{}", function.full_name(), name),
                CatalogEntry::Callable(value.clone()),
            );
            return Ok(());
        }

        let captured = function
            .captures
            .as_ref()
            .map(|env| env.get(name).is_some())
            .unwrap_or(false);
        if captured {
            // A capture's rewritable slot is the assignment in whichever
            // enclosing function binds it.
            let path = self
                .registry
                .module(&function.module)
                .and_then(|module| {
                    freevars::capture_path(&module.ast, &function.qualname, name)
                })
                .map(|relative| format!("{}.{}", function.module, relative))
                .unwrap_or_else(|| format!("{}.{}", function.full_name(), name));
            let entry = match Literal::from_value(value) {
                Ok(literal) => CatalogEntry::Literal(literal),
                Err(_) => CatalogEntry::Opaque(value.clone()),
            };
            catalog.insert(path, entry);
            return Ok(());
        }

        if let Value::Module(_) = value {
            // A whole-module import; the reference lives at the use site.
            catalog.insert(
                format!("{}.{}", function.full_name(), name),
                CatalogEntry::Opaque(value.clone()),
            );
            return Ok(());
        }

        let module = self.defining_module(&function.module, name, value);
        let entry = match Literal::from_value(value) {
            Ok(literal) => CatalogEntry::Literal(literal),
            Err(_) => CatalogEntry::Opaque(value.clone()),
        };
        catalog.insert(format!("{}.{}", module, name), entry);
        Ok(())
    }

    /// The module a global binding was defined in: the import origin when
    /// the name arrived via `from m import name`, otherwise the reader's
    /// own module.
    fn defining_module(&self, reader: &str, name: &str, value: &Value) -> String {
        if let Some(module) = self.registry.module(reader) {
            if let Some(origin) = module.imports.get(name) {
                if origin.attr.is_some() {
                    return origin.module.clone();
                }
            }
        }
        value
            .owning_module()
            .map(str::to_string)
            .unwrap_or_else(|| reader.to_string())
    }

    fn class(&mut self, class: &Rc<ClassObj>) -> Result<BindingCatalog> {
        let identity = Rc::as_ptr(class) as usize;
        if self.in_progress.contains(&identity) {
            return Ok(BindingCatalog::new());
        }
        if let Some(catalog) = self.memo.get(&identity) {
            return Ok(catalog.clone());
        }

        self.in_progress.insert(identity);
        let mut result: Result<BindingCatalog> = Ok(BindingCatalog::new());
        for (_, method) in &class.methods {
            result = result.and_then(|mut catalog| {
                catalog.extend(self.function(method)?);
                Ok(catalog)
            });
            if result.is_err() {
                break;
            }
        }
        self.in_progress.remove(&identity);
        let catalog = result?;
        self.memo.insert(identity, catalog.clone());
        Ok(catalog)
    }
}

/// Literal defaults and literal direct-body assignments, keyed under the
/// function's own scope path.
fn own_entries(def: &FnDef, prefix: &str) -> Result<BindingCatalog> {
    let mut catalog = BindingCatalog::new();
    for param in &def.params {
        if let Some(default) = &param.default {
            if is_literal_expr(default) {
                catalog.insert(
                    format!("{}.{}", prefix, param.name),
                    CatalogEntry::Literal(Literal::from_expr(default)?),
                );
            }
        }
    }
    for stmt in &def.body {
        if let Stmt::Assign { targets, value, .. } = stmt {
            if !is_literal_expr(value) {
                continue;
            }
            let literal = Literal::from_expr(value)?;
            for target in targets {
                if let AssignTarget::Name { name, .. } = target {
                    catalog.insert(
                        format!("{}.{}", prefix, name),
                        CatalogEntry::Literal(literal.clone()),
                    );
                }
            }
        }
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::call;

    const EXAMPLE: &str = "fn f(x, n = 1) {\n    k = 10\n    return n * k + x\n}\n\nfn g(x) {\n    alpha = 42\n    return f(x) + alpha\n}\n";

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        registry.add_source("example", EXAMPLE);
        registry
    }

    #[test]
    fn test_plain_function_catalog() {
        let mut registry = registry();
        let catalog = registry.introspect("example.f").unwrap();
        assert_eq!(
            catalog.keys().collect::<Vec<_>>(),
            ["example.f.k", "example.f.n"]
        );
        assert_eq!(
            catalog["example.f.n"],
            CatalogEntry::Literal(Literal::Int(1))
        );
        assert_eq!(
            catalog["example.f.k"],
            CatalogEntry::Literal(Literal::Int(10))
        );
    }

    #[test]
    fn test_closure_catalog_includes_referenced_function() {
        let mut registry = registry();
        let catalog = registry.introspect("example.g").unwrap();
        assert_eq!(
            catalog.keys().collect::<Vec<_>>(),
            ["example.f.k", "example.f.n", "example.g.alpha", "example.g.f"]
        );
        assert!(matches!(
            catalog["example.g.f"],
            CatalogEntry::Callable(Value::Function(_))
        ));
    }

    #[test]
    fn test_from_import_literal_keyed_under_defining_module() {
        let mut registry = ModuleRegistry::new();
        registry.add_source("util", "rate = 3\n");
        registry.add_source(
            "app",
            "from util import rate\n\nfn scale(x) {\n    return x * rate\n}\n",
        );
        let catalog = registry.introspect("app.scale").unwrap();
        assert_eq!(
            catalog.get("util.rate"),
            Some(&CatalogEntry::Literal(Literal::Int(3)))
        );
        assert!(!catalog.contains_key("app.rate"));
    }

    #[test]
    fn test_captured_literal_keyed_under_binding_scope() {
        let mut registry = ModuleRegistry::new();
        registry.add_source(
            "m",
            "fn outer() {\n    base = 5\n    fn inner(n = 2) {\n        return base + n\n    }\n    return inner\n}\n",
        );
        let outer = registry.resolve("m.outer").unwrap();
        let inner = call(&outer, &[]).unwrap();
        let catalog = registry.introspect(inner).unwrap();
        // The slot is the assignment in outer, not a key under inner.
        assert_eq!(
            catalog.get("m.outer.base"),
            Some(&CatalogEntry::Literal(Literal::Int(5)))
        );
        assert!(!catalog.contains_key("m.outer.inner.base"));
        assert_eq!(
            catalog.get("m.outer.inner.n"),
            Some(&CatalogEntry::Literal(Literal::Int(2)))
        );
    }

    #[test]
    fn test_module_level_instance_is_opaque_under_defining_module() {
        let mut registry = ModuleRegistry::new();
        registry.add_source(
            "util",
            "class Meter {\n    fn init(self, start = 0) {\n        self.total = start\n    }\n}\ngauge = Meter()\n",
        );
        registry.add_source(
            "app",
            "from util import gauge\n\nfn read() {\n    return gauge.total\n}\n",
        );
        let catalog = registry.introspect("app.read").unwrap();
        assert!(matches!(
            catalog.get("util.gauge"),
            Some(CatalogEntry::Opaque(Value::Instance(_)))
        ));
        assert!(!catalog.contains_key("app.gauge"));
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let mut registry = ModuleRegistry::new();
        registry.add_source(
            "m",
            "fn ping(n, step = 1) {\n    if n <= 0 {\n        return n\n    }\n    return pong(n - step)\n}\n\nfn pong(n, step = 2) {\n    if n <= 0 {\n        return n\n    }\n    return ping(n - step)\n}\n",
        );
        let catalog = registry.introspect("m.ping").unwrap();
        assert!(catalog.contains_key("m.ping.step"));
        assert!(catalog.contains_key("m.pong.step"));
        assert!(catalog.contains_key("m.ping.pong"));
        assert!(catalog.contains_key("m.pong.ping"));
    }

    #[test]
    fn test_class_methods_keyed_under_class_scope() {
        let mut registry = ModuleRegistry::new();
        registry.add_source(
            "m",
            "class Meter {\n    fn init(self, start = 0) {\n        self.total = start\n    }\n    fn add(self, n = 1) {\n        self.total = self.total + n\n        return self.total\n    }\n}\n",
        );
        let catalog = registry.introspect("m.Meter").unwrap();
        assert_eq!(
            catalog.get("m.Meter.init.start"),
            Some(&CatalogEntry::Literal(Literal::Int(0)))
        );
        assert_eq!(
            catalog.get("m.Meter.add.n"),
            Some(&CatalogEntry::Literal(Literal::Int(1)))
        );
    }

    #[test]
    fn test_own_entry_wins_over_inherited() {
        let mut registry = ModuleRegistry::new();
        registry.add_source("util", "k = 1\n\nfn helper() {\n    return k\n}\n");
        registry.add_source(
            "app",
            "from util import helper\nk = 2\n\nfn run() {\n    return helper() + k\n}\n",
        );
        let catalog = registry.introspect("app.run").unwrap();
        assert_eq!(
            catalog.get("util.k"),
            Some(&CatalogEntry::Literal(Literal::Int(1)))
        );
        assert_eq!(
            catalog.get("app.k"),
            Some(&CatalogEntry::Literal(Literal::Int(2)))
        );
    }

    #[test]
    fn test_builtin_target_has_no_source() {
        let mut registry = ModuleRegistry::new();
        let len = crate::interp::builtins::lookup("len").unwrap();
        assert!(matches!(
            registry.introspect(len),
            Err(Error::SourceUnavailable(_))
        ));
    }
}

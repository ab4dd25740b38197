//! Module Registry - caller-owned import cache
//!
//! The registry owns module sources (registered strings or `.scr` files
//! under a root directory), loads each module at most once, and hands out
//! namespace handles. It replaces a process-wide import cache with an
//! explicit object, which keeps cross-module rebinding deterministic and
//! testable in isolation.
//!
//! Cyclic `import m` is tolerated the way dynamic module systems usually
//! tolerate it: the importer receives a handle to the partially initialized
//! namespace. `from m import a` under a cycle fails, because the attribute
//! may not exist yet.

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use crate::interp::eval::{exec_module, ImportResolver};
use crate::interp::value::{ModuleRef, Namespace, Value};
use crate::introspect::{self, BindingCatalog, BindingsRequest, Target};
use crate::rebind;
use crate::syntax::ast::{ModuleAst, Stmt};
use crate::syntax::parse_module;
use crate::{Error, Result};

/// Default file extension for module sources under a registry root.
pub const DEFAULT_EXTENSION: &str = "scr";

/// Where a module-level binding created by an import came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOrigin {
    /// Origin module name
    pub module: String,
    /// Imported attribute, or `None` for a whole-module `import` binding
    pub attr: Option<String>,
}

/// A loaded module: source, tree, namespace, and its import table.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub source: String,
    pub ast: Rc<ModuleAst>,
    pub handle: Rc<ModuleRef>,
    /// local binding name -> origin, derived from the top-level imports
    pub imports: HashMap<String, ImportOrigin>,
}

impl Module {
    pub fn namespace(&self) -> &Namespace {
        &self.handle.namespace
    }
}

/// Caller-owned module registry and import cache.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    root: Option<PathBuf>,
    extension: String,
    sources: HashMap<String, String>,
    loaded: HashMap<String, Rc<Module>>,
    /// Modules currently executing their top level, innermost last
    loading: Vec<String>,
    /// Namespace handles of in-progress modules, for cyclic imports
    partial: HashMap<String, Rc<ModuleRef>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            ..Self::default()
        }
    }

    /// Registry that lazily reads `<root>/<name>.<extension>`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::new()
        }
    }

    pub fn set_extension(&mut self, extension: impl Into<String>) {
        self.extension = extension.into();
    }

    /// Register module source text under a name. Replaces any unloaded
    /// source registered earlier.
    pub fn add_source(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(name.into(), source.into());
    }

    /// Names of all currently loaded modules, sorted.
    pub fn loaded_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaded.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop a loaded module from the cache. Callables handed out earlier
    /// keep their namespaces alive independently.
    pub fn unload(&mut self, name: &str) {
        self.loaded.remove(name);
    }

    /// Source text of a module, if the registry holds it.
    pub fn source(&self, name: &str) -> Option<&str> {
        self.sources.get(name).map(String::as_str)
    }

    /// A loaded module, if present in the cache.
    pub fn module(&self, name: &str) -> Option<&Rc<Module>> {
        self.loaded.get(name)
    }

    /// Whether `name` refers to a module this registry could load.
    pub fn is_module(&self, name: &str) -> bool {
        self.loaded.contains_key(name)
            || self.sources.contains_key(name)
            || self.module_path(name).map(|p| p.exists()).unwrap_or(false)
    }

    fn module_path(&self, name: &str) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(format!("{}.{}", name, self.extension)))
    }

    fn source_text(&mut self, name: &str) -> Result<String> {
        if let Some(source) = self.sources.get(name) {
            return Ok(source.clone());
        }
        let path = self.module_path(name).filter(|p| p.exists()).ok_or_else(|| {
            Error::ImportResolution(format!("module '{}' not found", name))
        })?;
        let source = std::fs::read_to_string(&path)?;
        self.sources.insert(name.to_string(), source.clone());
        Ok(source)
    }

    /// Load a module (parse + execute its top level), or return the cached
    /// one.
    pub fn load(&mut self, name: &str) -> Result<Rc<Module>> {
        if let Some(module) = self.loaded.get(name) {
            return Ok(module.clone());
        }
        if self.loading.iter().any(|loading| loading == name) {
            return Err(Error::ImportResolution(format!(
                "circular import of module '{}'",
                name
            )));
        }

        tracing::debug!("loading module '{}'", name);
        let source = self.source_text(name)?;
        let ast = Rc::new(parse_module(&source)?);
        let handle = Rc::new(ModuleRef {
            name: name.to_string(),
            namespace: Namespace::new(),
        });

        self.loading.push(name.to_string());
        self.partial.insert(name.to_string(), handle.clone());
        let executed = exec_module(&ast.stmts, name, &handle.namespace, self);
        self.loading.pop();
        self.partial.remove(name);
        executed?;

        let module = Rc::new(Module {
            name: name.to_string(),
            source,
            imports: import_table(&ast),
            ast,
            handle,
        });
        self.loaded.insert(name.to_string(), module.clone());
        Ok(module)
    }

    /// Resolve a dotted path (`module.attr[.attr...]`) to a live value.
    pub fn resolve(&mut self, path: &str) -> Result<Value> {
        let mut parts = path.split('.');
        let module_name = parts
            .next()
            .filter(|part| !part.is_empty())
            .ok_or_else(|| Error::ImportResolution(format!("empty path '{}'", path)))?;
        let module = self.load(module_name)?;
        let mut value = Value::Module(module.handle.clone());
        for part in parts {
            value = match &value {
                Value::Module(handle) => {
                    handle.namespace.get(part).ok_or_else(|| {
                        Error::ImportResolution(format!(
                            "module '{}' doesn't have attribute '{}'",
                            handle.name, part
                        ))
                    })?
                }
                Value::Class(class) => Value::Function(
                    class
                        .method(part)
                        .ok_or_else(|| {
                            Error::ImportResolution(format!(
                                "class '{}' doesn't have method '{}'",
                                class.full_name(),
                                part
                            ))
                        })?
                        .clone(),
                ),
                other => {
                    return Err(Error::ImportResolution(format!(
                        "cannot look up '{}' inside {}",
                        part,
                        other.type_name()
                    )));
                }
            };
        }
        Ok(value)
    }

    /// Build the binding catalog reachable from a callable or dotted path.
    pub fn introspect(&mut self, target: impl Into<Target>) -> Result<BindingCatalog> {
        introspect::run(self, target.into())
    }

    /// Produce a new callable with the requested literal slots replaced.
    pub fn rebind(
        &mut self,
        target: impl Into<Target>,
        bindings: &BindingsRequest,
    ) -> Result<Value> {
        rebind::run(self, target.into(), bindings)
    }

    /// Reserved extension point; always returns [`Error::NotImplemented`].
    pub fn lookup(&mut self, _path: &str) -> Result<Value> {
        Err(Error::NotImplemented("lookup"))
    }
}

/// Derive the import table from a module's top-level statements.
fn import_table(ast: &ModuleAst) -> HashMap<String, ImportOrigin> {
    let mut table = HashMap::new();
    for stmt in &ast.stmts {
        match stmt {
            Stmt::Import { module, .. } => {
                table.insert(
                    module.clone(),
                    ImportOrigin {
                        module: module.clone(),
                        attr: None,
                    },
                );
            }
            Stmt::FromImport { module, names, .. } => {
                for name in names {
                    table.insert(
                        name.clone(),
                        ImportOrigin {
                            module: module.clone(),
                            attr: Some(name.clone()),
                        },
                    );
                }
            }
            _ => {}
        }
    }
    table
}

impl ImportResolver for ModuleRegistry {
    fn module_handle(&mut self, name: &str) -> Result<Rc<ModuleRef>> {
        if let Some(handle) = self.partial.get(name) {
            return Ok(handle.clone());
        }
        Ok(self.load(name)?.handle.clone())
    }

    fn module_attr(&mut self, module: &str, name: &str) -> Result<Value> {
        if self.loading.iter().any(|loading| loading == module) {
            return Err(Error::ImportResolution(format!(
                "circular import of module '{}'",
                module
            )));
        }
        let module = self.load(module)?;
        module.namespace().get(name).ok_or_else(|| {
            Error::ImportResolution(format!(
                "module '{}' doesn't have attribute '{}'",
                module.name, name
            ))
        })
    }
}

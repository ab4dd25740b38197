//! Recompiler/Loader
//!
//! Rebuilds each planned module from a fresh parse of its source: rewrite,
//! then execution into a namespace seeded from the original module's
//! globals with entries owned by already-rebuilt modules substituted.
//! Imports during re-execution resolve through the rebuilt set first, which
//! is how a rebound shared dependency propagates to every module using it.
//! Original module namespaces are never touched; a failure drops every
//! partially built namespace.

use std::collections::BTreeMap;
use std::rc::Rc;

use super::depend::RebindPlan;
use super::rewrite;
use crate::interp::eval::{exec_module, ImportResolver};
use crate::interp::value::{ModuleRef, Namespace, Value};
use crate::introspect::BindingsRequest;
use crate::registry::{Module, ModuleRegistry};
use crate::syntax::parse_module;
use crate::{Error, Result};

pub(crate) fn rebuild(
    registry: &mut ModuleRegistry,
    plan: &RebindPlan,
) -> Result<BTreeMap<String, Namespace>> {
    let empty = BindingsRequest::new();
    let mut rebuilt: BTreeMap<String, Namespace> = BTreeMap::new();

    for name in &plan.order {
        // The plan is topological; an unmet dependency here means a cycle
        // survived planning.
        if let Some(deps) = plan.dependencies.get(name) {
            if deps
                .iter()
                .any(|dep| dep != name && !rebuilt.contains_key(dep))
            {
                return Err(Error::CyclicRebind(name.clone()));
            }
        }

        tracing::debug!("rebuilding module '{}'", name);
        let source = registry
            .source(name)
            .ok_or_else(|| {
                Error::SourceUnavailable(format!(
                    "no source registered for module '{}'",
                    name
                ))
            })?
            .to_string();
        let mut tree = parse_module(&source)?;
        let bindings = plan.module_bindings.get(name).unwrap_or(&empty);
        rewrite::rewrite_module(&mut tree, bindings)?;

        let original = registry
            .module(name)
            .ok_or_else(|| {
                Error::ImportResolution(format!("module '{}' is not loaded", name))
            })?
            .clone();
        let namespace = Namespace::new();
        for (key, value) in original.namespace().snapshot() {
            let seeded = substitute(&original, &key, &value, &rebuilt);
            namespace.set(key, seeded);
        }

        let mut overlay = Overlay {
            rebuilt: &rebuilt,
            registry: &mut *registry,
        };
        exec_module(&tree.stmts, name, &namespace, &mut overlay)?;
        rebuilt.insert(name.clone(), namespace);
    }
    Ok(rebuilt)
}

/// Replace a seeded entry when its value is owned by an already-rebuilt
/// module: module handles get the rebuilt namespace, imported attributes
/// get the rebuilt attribute.
fn substitute(
    original: &Rc<Module>,
    key: &str,
    value: &Value,
    rebuilt: &BTreeMap<String, Namespace>,
) -> Value {
    if let Value::Module(handle) = value {
        if let Some(namespace) = rebuilt.get(&handle.name) {
            return Value::Module(Rc::new(ModuleRef {
                name: handle.name.clone(),
                namespace: namespace.clone(),
            }));
        }
    }
    if let Some(owner) = value.owning_module() {
        if owner != original.name {
            if let Some(namespace) = rebuilt.get(owner) {
                let attr = original
                    .imports
                    .get(key)
                    .and_then(|origin| origin.attr.as_deref())
                    .unwrap_or(key);
                if let Some(replacement) = namespace.get(attr) {
                    return replacement;
                }
            }
        }
    }
    value.clone()
}

/// Serves rebuilt modules first, falling back to the registry for anything
/// outside the plan.
struct Overlay<'a> {
    rebuilt: &'a BTreeMap<String, Namespace>,
    registry: &'a mut ModuleRegistry,
}

impl ImportResolver for Overlay<'_> {
    fn module_handle(&mut self, name: &str) -> Result<Rc<ModuleRef>> {
        if let Some(namespace) = self.rebuilt.get(name) {
            return Ok(Rc::new(ModuleRef {
                name: name.to_string(),
                namespace: namespace.clone(),
            }));
        }
        self.registry.module_handle(name)
    }

    fn module_attr(&mut self, module: &str, name: &str) -> Result<Value> {
        if let Some(namespace) = self.rebuilt.get(module) {
            return namespace.get(name).ok_or_else(|| {
                Error::ImportResolution(format!(
                    "module '{}' doesn't have attribute '{}'",
                    module, name
                ))
            });
        }
        self.registry.module_attr(module, name)
    }
}

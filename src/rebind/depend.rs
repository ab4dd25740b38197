//! Dependency Resolver
//!
//! Determines which modules a rebind touches and in what order they must be
//! rebuilt. Involved modules: the target's own module, the module of every
//! transitively referenced callable, and the owning module of every request
//! path. Edges come from each module's import table restricted to the
//! involved set; ordering is Kahn's topological sort, so a cycle surfaces
//! as [`Error::CyclicRebind`] before anything is rebuilt.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::interp::value::Value;
use crate::introspect::BindingsRequest;
use crate::registry::ModuleRegistry;
use crate::{freevars, Error, Result};

/// The rebuild schedule for one rebind call.
#[derive(Debug)]
pub struct RebindPlan {
    /// Modules in rebuild order, dependencies first
    pub order: Vec<String>,
    /// Per module, the request restricted to it with module-relative paths
    pub module_bindings: BTreeMap<String, BindingsRequest>,
    /// Per module, its dependencies within the involved set
    pub dependencies: BTreeMap<String, BTreeSet<String>>,
}

pub(crate) fn plan(
    registry: &mut ModuleRegistry,
    target: &Value,
    request: &BindingsRequest,
) -> Result<RebindPlan> {
    let mut involved = BTreeSet::new();
    let mut seen = HashSet::new();
    collect_callable_modules(target, &mut involved, &mut seen);
    if involved.is_empty() {
        return Err(Error::Runtime(format!(
            "cannot rebind a value of type {}",
            target.type_name()
        )));
    }

    let mut module_bindings: BTreeMap<String, BindingsRequest> = BTreeMap::new();
    for (path, literal) in request {
        let (module, remainder) = owning_module(registry, path)?;
        involved.insert(module.clone());
        module_bindings
            .entry(module)
            .or_default()
            .insert(remainder, literal.clone());
    }

    // Request-only modules may not have been loaded yet; edges need their
    // import tables.
    for name in &involved {
        registry.load(name)?;
    }

    let mut dependencies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for name in &involved {
        let module = self::loaded(registry, name)?;
        let deps: BTreeSet<String> = module
            .imports
            .values()
            .map(|origin| origin.module.clone())
            .filter(|origin| origin != name && involved.contains(origin))
            .collect();
        dependencies.insert(name.clone(), deps);
    }

    let order = topological_order(&involved, &dependencies)?;
    tracing::debug!("rebind order: {:?}", order);
    for name in &involved {
        module_bindings.entry(name.clone()).or_default();
    }
    Ok(RebindPlan {
        order,
        module_bindings,
        dependencies,
    })
}

fn loaded<'r>(
    registry: &'r ModuleRegistry,
    name: &str,
) -> Result<&'r std::rc::Rc<crate::registry::Module>> {
    registry
        .module(name)
        .ok_or_else(|| Error::ImportResolution(format!("module '{}' is not loaded", name)))
}

/// Modules owning the target and every callable transitively reachable
/// through free variables. Identity-guarded against closure cycles.
fn collect_callable_modules(
    value: &Value,
    modules: &mut BTreeSet<String>,
    seen: &mut HashSet<usize>,
) {
    if let Some(identity) = value.identity() {
        if !seen.insert(identity) {
            return;
        }
    }
    match value {
        Value::Function(function) => {
            modules.insert(function.module.clone());
            for (_, referenced) in freevars::resolve(function) {
                match &referenced {
                    Value::Module(handle) => {
                        modules.insert(handle.name.clone());
                    }
                    other if other.is_callable() => {
                        collect_callable_modules(other, modules, seen);
                    }
                    _ => {}
                }
            }
        }
        Value::BoundMethod(bound) => {
            collect_callable_modules(&Value::Function(bound.function.clone()), modules, seen);
        }
        Value::Class(class) => {
            modules.insert(class.module.clone());
            for (_, method) in &class.methods {
                collect_callable_modules(&Value::Function(method.clone()), modules, seen);
            }
        }
        _ => {}
    }
}

/// Resolve a binding path's owning module by progressively stripping
/// trailing dotted components, accepting the longest loadable prefix.
pub(crate) fn owning_module(
    registry: &ModuleRegistry,
    path: &str,
) -> Result<(String, String)> {
    let parts: Vec<&str> = path.split('.').collect();
    for split in (1..parts.len()).rev() {
        let prefix = parts[..split].join(".");
        if registry.is_module(&prefix) {
            return Ok((prefix, parts[split..].join(".")));
        }
    }
    Err(Error::ImportResolution(format!(
        "no module owns binding path '{}'",
        path
    )))
}

/// Kahn's algorithm over the involved set, deterministic by name.
fn topological_order(
    involved: &BTreeSet<String>,
    dependencies: &BTreeMap<String, BTreeSet<String>>,
) -> Result<Vec<String>> {
    let mut remaining: BTreeMap<String, BTreeSet<String>> = involved
        .iter()
        .map(|name| {
            (
                name.clone(),
                dependencies.get(name).cloned().unwrap_or_default(),
            )
        })
        .collect();

    let mut order = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let ready: Vec<String> = remaining
            .iter()
            .filter(|(_, deps)| deps.iter().all(|dep| !remaining.contains_key(dep)))
            .map(|(name, _)| name.clone())
            .collect();
        if ready.is_empty() {
            let stuck = remaining
                .keys()
                .next()
                .cloned()
                .unwrap_or_default();
            return Err(Error::CyclicRebind(stuck));
        }
        for name in ready {
            remaining.remove(&name);
            order.push(name);
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::Literal;

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        registry.add_source("util", "rate = 3\n\nfn helper(n = 2) {\n    return n * rate\n}\n");
        registry.add_source(
            "app",
            "from util import helper\n\nfn run(x) {\n    margin = 1\n    return helper(x) + margin\n}\n",
        );
        registry
    }

    #[test]
    fn test_owning_module_strips_suffixes() {
        let mut registry = registry();
        registry.load("app").unwrap();
        assert_eq!(
            owning_module(&registry, "app.run.margin").unwrap(),
            ("app".to_string(), "run.margin".to_string())
        );
        assert_eq!(
            owning_module(&registry, "util.rate").unwrap(),
            ("util".to_string(), "rate".to_string())
        );
        assert!(matches!(
            owning_module(&registry, "ghost.x"),
            Err(Error::ImportResolution(_))
        ));
    }

    #[test]
    fn test_plan_orders_dependency_first() {
        let mut registry = registry();
        let run = registry.resolve("app.run").unwrap();
        let mut request = BindingsRequest::new();
        request.insert("util.rate".to_string(), Literal::Int(5));
        let plan = plan(&mut registry, &run, &request).unwrap();
        assert_eq!(plan.order, ["util", "app"]);
        assert_eq!(
            plan.module_bindings["util"].get("rate"),
            Some(&Literal::Int(5))
        );
        assert!(plan.module_bindings["app"].is_empty());
        assert!(plan.dependencies["app"].contains("util"));
    }

    #[test]
    fn test_request_alone_can_pull_in_a_module() {
        let mut registry = registry();
        registry.add_source("side", "k = 1\n");
        let run = registry.resolve("app.run").unwrap();
        let mut request = BindingsRequest::new();
        request.insert("side.k".to_string(), Literal::Int(9));
        let plan = plan(&mut registry, &run, &request).unwrap();
        assert!(plan.order.contains(&"side".to_string()));
        assert!(plan.order.contains(&"app".to_string()));
    }

    #[test]
    fn test_cycle_is_fatal() {
        let mut registry = ModuleRegistry::new();
        registry.add_source("a", "import b\n\nfn f(n = 1) {\n    return b.g(n)\n}\n");
        registry.add_source("b", "import a\n\nfn g(n = 2) {\n    return n\n}\n");
        let f = registry.resolve("a.f").unwrap();
        let mut request = BindingsRequest::new();
        request.insert("a.f.n".to_string(), Literal::Int(3));
        assert!(matches!(
            plan(&mut registry, &f, &request),
            Err(Error::CyclicRebind(_))
        ));
    }
}

//! Rebinding pipeline
//!
//! `rebind(target, bindings)` resolves the target, plans which modules the
//! request touches and in what order ([`depend`]), rewrites each module's
//! freshly parsed source ([`rewrite`]), re-executes it against rebuilt
//! dependencies ([`loader`]), and hands back the target's counterpart from
//! the rebuilt namespaces. An empty request short-circuits to the original
//! callable. A closure target has no namespace entry of its own, so its
//! counterpart is materialized straight from the rewritten definition.

pub mod depend;
pub mod loader;
pub mod rewrite;

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::interp::eval;
use crate::interp::value::{Env, Function, Namespace, Value};
use crate::introspect::{self, BindingsRequest, Target};
use crate::registry::ModuleRegistry;
use crate::syntax::parse_module;
use crate::{freevars, Error, Result};

pub use depend::RebindPlan;

/// Entry point used by [`ModuleRegistry::rebind`].
pub(crate) fn run(
    registry: &mut ModuleRegistry,
    target: Target,
    request: &BindingsRequest,
) -> Result<Value> {
    let value = introspect::resolve_target(registry, target)?;
    if request.is_empty() {
        return Ok(value);
    }
    let plan = depend::plan(registry, &value, request)?;
    let rebuilt = loader::rebuild(registry, &plan)?;
    locate(registry, &plan, &value, &rebuilt)
}

/// Look the target up by its original name inside its own rebuilt module.
fn locate(
    registry: &ModuleRegistry,
    plan: &RebindPlan,
    original: &Value,
    rebuilt: &BTreeMap<String, Namespace>,
) -> Result<Value> {
    if let Value::Function(function) = original {
        if function.captures.is_some() {
            return closure_counterpart(registry, plan, function, rebuilt);
        }
    }
    let (module, qualname) = match original {
        Value::Function(function) => (function.module.as_str(), function.qualname.as_str()),
        Value::BoundMethod(bound) => {
            (bound.function.module.as_str(), bound.function.qualname.as_str())
        }
        Value::Class(class) => (class.module.as_str(), class.name.as_str()),
        other => {
            return Err(Error::Runtime(format!(
                "cannot rebind a value of type {}",
                other.type_name()
            )));
        }
    };
    let namespace = rebuilt.get(module).ok_or_else(|| {
        Error::Runtime(format!("module '{}' was not rebuilt", module))
    })?;

    let mut value: Option<Value> = None;
    for part in qualname.split('.') {
        value = Some(match value {
            None => namespace.get(part).ok_or_else(|| {
                Error::Runtime(format!(
                    "'{}' is missing from the rebuilt module '{}'",
                    part, module
                ))
            })?,
            Some(Value::Class(class)) => {
                Value::Function(class.method(part).cloned().ok_or_else(|| {
                    Error::Runtime(format!(
                        "rebuilt class '{}' has no method '{}'",
                        class.full_name(),
                        part
                    ))
                })?)
            }
            Some(_) => {
                return Err(Error::Runtime(format!(
                    "'{}.{}' is not reachable from its module namespace",
                    module, qualname
                )));
            }
        });
    }
    value.ok_or_else(|| Error::Runtime("empty qualified name".to_string()))
}

/// Materialize the rebound counterpart of a closure: the rewritten
/// definition node, the rebuilt module globals, and the original captured
/// values with rebound capture slots substituted. Defaults re-evaluate
/// against that environment.
fn closure_counterpart(
    registry: &ModuleRegistry,
    plan: &RebindPlan,
    function: &Rc<Function>,
    rebuilt: &BTreeMap<String, Namespace>,
) -> Result<Value> {
    let module = function.module.as_str();
    let namespace = rebuilt.get(module).ok_or_else(|| {
        Error::Runtime(format!("module '{}' was not rebuilt", module))
    })?;
    let empty = BindingsRequest::new();
    let bindings = plan.module_bindings.get(module).unwrap_or(&empty);

    let source = registry.source(module).ok_or_else(|| {
        Error::SourceUnavailable(format!("no source registered for module '{}'", module))
    })?;
    let mut tree = parse_module(source)?;
    rewrite::rewrite_module(&mut tree, bindings)?;
    let def = freevars::definition(&tree, &function.qualname).ok_or_else(|| {
        Error::SourceUnavailable(format!(
            "module '{}' does not define '{}'",
            module, function.qualname
        ))
    })?;

    let mut names = freevars::free_names(def);
    names.extend(freevars::default_names(def));
    let mut captures = Env::new();
    captures.push_frame();
    if let Some(original_env) = &function.captures {
        for name in names {
            let Some(value) = original_env.get(&name) else {
                continue;
            };
            let seeded = freevars::capture_path(&tree, &function.qualname, &name)
                .and_then(|path| bindings.get(&path))
                .map(|literal| literal.to_value())
                .unwrap_or(value);
            captures.set_local(name, seeded);
        }
    }
    let counterpart = eval::materialize_function(
        def,
        module,
        &function.qualname,
        namespace,
        captures,
    )?;
    Ok(Value::Function(counterpart))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::call;
    use crate::literal::Literal;

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        registry.add_source(
            "example",
            "fn f(x, n = 1) {\n    k = 10\n    return n * k + x\n}\n",
        );
        registry
    }

    #[test]
    fn test_empty_request_returns_original() {
        let mut registry = registry();
        let f = registry.resolve("example.f").unwrap();
        let same = registry.rebind(f.clone(), &BindingsRequest::new()).unwrap();
        assert_eq!(same, f);
    }

    #[test]
    fn test_rebound_constant_without_mutation() {
        let mut registry = registry();
        let f = registry.resolve("example.f").unwrap();
        let mut request = BindingsRequest::new();
        request.insert("example.f.k".to_string(), Literal::Int(11));
        let rebound = registry.rebind(f.clone(), &request).unwrap();
        assert_eq!(
            call(&rebound, &[Value::Int(0), Value::Int(1)]).unwrap(),
            Value::Int(11)
        );
        assert_eq!(
            call(&f, &[Value::Int(0), Value::Int(1)]).unwrap(),
            Value::Int(10)
        );
    }

    #[test]
    fn test_closure_target_materializes_counterpart() {
        let mut registry = ModuleRegistry::new();
        registry.add_source(
            "m",
            "fn outer() {\n    base = 5\n    fn inner(n = 2) {\n        return base + n\n    }\n    return inner\n}\n",
        );
        let outer = registry.resolve("m.outer").unwrap();
        let inner = call(&outer, &[]).unwrap();
        let mut request = BindingsRequest::new();
        request.insert("m.outer.base".to_string(), Literal::Int(9));
        let rebound = registry.rebind(inner.clone(), &request).unwrap();
        assert_eq!(call(&rebound, &[]).unwrap(), Value::Int(11));
        assert_eq!(call(&inner, &[]).unwrap(), Value::Int(7));
        match &rebound {
            Value::Function(function) => assert_eq!(function.qualname, "outer.inner"),
            other => panic!("expected function, got {}", other),
        }
    }

    #[test]
    fn test_method_target_resolves_through_class() {
        let mut registry = ModuleRegistry::new();
        registry.add_source(
            "m",
            "class Meter {\n    fn init(self) {\n        self.total = 0\n    }\n    fn add(self, n = 1) {\n        self.total = self.total + n\n        return self.total\n    }\n}\n",
        );
        let add = registry.resolve("m.Meter.add").unwrap();
        let mut request = BindingsRequest::new();
        request.insert("m.Meter.add.n".to_string(), Literal::Int(5));
        let rebound = registry.rebind(add, &request).unwrap();
        match &rebound {
            Value::Function(function) => assert_eq!(function.qualname, "Meter.add"),
            other => panic!("expected function, got {}", other),
        }
    }
}

//! Scope-Rewriter
//!
//! A tree transform over one module's freshly parsed source, parameterized
//! by the request restricted to that module (module-relative paths). The
//! scope path stack grows entering `fn` and `class` definitions and shrinks
//! leaving them. Matching single-target assignments get their right-hand
//! side replaced with the requested literal; the replacement subtree is
//! stamped with the old node's line so downstream line numbers stay honest.
//! A match inside a multi-target assignment is ambiguous and fatal, and so
//! is a binding path that matches nothing: a request is never silently
//! dropped.

use std::collections::BTreeSet;

use crate::introspect::BindingsRequest;
use crate::literal::is_literal_expr;
use crate::syntax::ast::{AssignTarget, FnDef, ModuleAst, Stmt};
use crate::{Error, Result};

pub(crate) fn rewrite_module(tree: &mut ModuleAst, bindings: &BindingsRequest) -> Result<()> {
    if bindings.is_empty() {
        return Ok(());
    }
    let mut rewriter = ScopeRewriter {
        bindings,
        scope: Vec::new(),
        matched: BTreeSet::new(),
    };
    rewriter.stmts(&mut tree.stmts)?;
    if let Some(path) = bindings.keys().find(|path| !rewriter.matched.contains(*path)) {
        return Err(Error::UnsupportedRebind(format!(
            "'{}' does not name a rewritable constant slot",
            path
        )));
    }
    Ok(())
}

struct ScopeRewriter<'b> {
    bindings: &'b BindingsRequest,
    scope: Vec<String>,
    matched: BTreeSet<String>,
}

impl ScopeRewriter<'_> {
    fn path(&self, name: &str) -> String {
        if self.scope.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.scope.join("."), name)
        }
    }

    fn stmts(&mut self, stmts: &mut [Stmt]) -> Result<()> {
        for stmt in stmts {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &mut Stmt) -> Result<()> {
        match stmt {
            Stmt::Assign { targets, value, line } => {
                let matching: Vec<String> = targets
                    .iter()
                    .filter_map(AssignTarget::as_name)
                    .filter(|name| self.bindings.contains_key(&self.path(name)))
                    .map(str::to_string)
                    .collect();
                let Some(name) = matching.first() else {
                    return Ok(());
                };
                if targets.len() > 1 {
                    return Err(Error::UnsupportedRebind(format!(
                        "'{}' is one of several targets in the assignment at line {}",
                        self.path(name),
                        line
                    )));
                }
                let path = self.path(name);
                let literal = &self.bindings[&path];
                // Non-literal right-hand sides are replaced too: rebinding
                // an opaque reference swaps the reference itself.
                *value = literal.to_expr(value.line());
                self.matched.insert(path);
                Ok(())
            }
            Stmt::Fn(def) => self.fn_def(def),
            Stmt::Class(def) => {
                self.scope.push(def.name.clone());
                let result = def
                    .methods
                    .iter_mut()
                    .try_for_each(|method| self.fn_def(method));
                self.scope.pop();
                result
            }
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                self.stmts(then_body)?;
                self.stmts(else_body)
            }
            Stmt::While { body, .. } => self.stmts(body),
            Stmt::Import { .. }
            | Stmt::FromImport { .. }
            | Stmt::Expr(_)
            | Stmt::Return { .. } => Ok(()),
        }
    }

    fn fn_def(&mut self, def: &mut FnDef) -> Result<()> {
        self.scope.push(def.name.clone());
        for param in &mut def.params {
            let path = self.path(&param.name);
            if let Some(literal) = self.bindings.get(&path) {
                // Only literal defaults are rebindable slots.
                if let Some(default) = &mut param.default {
                    if is_literal_expr(default) {
                        *default = literal.to_expr(default.line());
                        self.matched.insert(path);
                    }
                }
            }
        }
        let result = self.stmts(&mut def.body);
        self.scope.pop();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::eval::{exec_module, ImportResolver};
    use crate::interp::value::{ModuleRef, Namespace, Value};
    use crate::interp::call;
    use crate::literal::Literal;
    use crate::syntax::parse_module;
    use std::rc::Rc;

    struct NoImports;

    impl ImportResolver for NoImports {
        fn module_handle(&mut self, name: &str) -> Result<Rc<ModuleRef>> {
            Err(Error::ImportResolution(format!("no module '{}'", name)))
        }

        fn module_attr(&mut self, module: &str, _name: &str) -> Result<Value> {
            Err(Error::ImportResolution(format!("no module '{}'", module)))
        }
    }

    fn rewrite_and_run(source: &str, bindings: &[(&str, Literal)]) -> Namespace {
        let mut tree = parse_module(source).unwrap();
        let bindings: BindingsRequest = bindings
            .iter()
            .map(|(path, literal)| (path.to_string(), literal.clone()))
            .collect();
        rewrite_module(&mut tree, &bindings).unwrap();
        let ns = Namespace::new();
        exec_module(&tree.stmts, "m", &ns, &mut NoImports).unwrap();
        ns
    }

    #[test]
    fn test_module_level_assignment() {
        let ns = rewrite_and_run("rate = 3\n", &[("rate", Literal::Int(5))]);
        assert_eq!(ns.get("rate"), Some(Value::Int(5)));
    }

    #[test]
    fn test_function_body_and_default() {
        let source = "fn f(x, n = 1) {\n    k = 10\n    return n * k + x\n}\n";
        let ns = rewrite_and_run(
            source,
            &[("f.k", Literal::Int(11)), ("f.n", Literal::Int(2))],
        );
        let f = ns.get("f").unwrap();
        // k = 11, n defaults to 2
        assert_eq!(call(&f, &[Value::Int(0)]).unwrap(), Value::Int(22));
    }

    #[test]
    fn test_nested_function_scope_path() {
        let source = "fn outer() {\n    fn inner(n = 2) {\n        return n\n    }\n    return inner\n}\n";
        let ns = rewrite_and_run(source, &[("outer.inner.n", Literal::Int(7))]);
        let inner = call(&ns.get("outer").unwrap(), &[]).unwrap();
        assert_eq!(call(&inner, &[]).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_method_scope_passes_through_class_name() {
        let source = "class Meter {\n    fn init(self) {\n        self.total = 0\n    }\n    fn add(self, n = 1) {\n        self.total = self.total + n\n        return self.total\n    }\n}\n";
        let ns = rewrite_and_run(source, &[("Meter.add.n", Literal::Int(4))]);
        let meter = call(&ns.get("Meter").unwrap(), &[]).unwrap();
        let add = match &meter {
            Value::Instance(instance) => instance.class.method("add").unwrap().clone(),
            other => panic!("expected instance, got {}", other),
        };
        assert_eq!(
            crate::interp::call_function(&add, &[meter.clone()]).unwrap(),
            Value::Int(4)
        );
    }

    #[test]
    fn test_multi_target_match_is_ambiguous() {
        let mut tree = parse_module("a = b = 1\n").unwrap();
        let mut bindings = BindingsRequest::new();
        bindings.insert("a".to_string(), Literal::Int(2));
        assert!(matches!(
            rewrite_module(&mut tree, &bindings),
            Err(Error::UnsupportedRebind(_))
        ));
    }

    #[test]
    fn test_unmatched_binding_path_is_fatal() {
        let mut tree = parse_module("rate = 3\n").unwrap();
        let mut bindings = BindingsRequest::new();
        bindings.insert("ghost".to_string(), Literal::Int(1));
        assert!(matches!(
            rewrite_module(&mut tree, &bindings),
            Err(Error::UnsupportedRebind(_))
        ));
    }

    #[test]
    fn test_parameter_without_default_is_not_a_slot() {
        let mut tree = parse_module("fn f(x) {\n    return x\n}\n").unwrap();
        let mut bindings = BindingsRequest::new();
        bindings.insert("f.x".to_string(), Literal::Int(1));
        assert!(matches!(
            rewrite_module(&mut tree, &bindings),
            Err(Error::UnsupportedRebind(_))
        ));
    }

    #[test]
    fn test_non_literal_rhs_is_replaced() {
        let source = "fn f() {\n    return 1\n}\nalias = f\n";
        let ns = rewrite_and_run(source, &[("alias", Literal::Int(9))]);
        assert_eq!(ns.get("alias"), Some(Value::Int(9)));
    }

    #[test]
    fn test_unmatched_names_untouched() {
        let source = "rate = 3\nfloor = 1\n";
        let ns = rewrite_and_run(source, &[("rate", Literal::Int(5))]);
        assert_eq!(ns.get("floor"), Some(Value::Int(1)));
    }
}

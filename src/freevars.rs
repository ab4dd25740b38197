//! Free-Variable Resolver
//!
//! Lexical analysis over definition trees: which names does a function read
//! that it does not bind itself? Nested functions are descended into, so a
//! global read buried in an inner helper still surfaces on the outer
//! function. Resolution then maps each free name through the captured
//! environment and the defining module's globals, returning only the subset
//! actually referenced. Builtins live outside namespaces and never appear.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::interp::value::{ClassObj, Function, Value};
use crate::syntax::ast::{AssignTarget, ClassDef, Expr, FnDef, ModuleAst, Stmt};

/// Names a function reads from outside its own scope, including reads made
/// by nested definitions.
pub fn free_names(def: &FnDef) -> BTreeSet<String> {
    let bound = bound_names(def);
    let mut reads = BTreeSet::new();
    scan_stmts(&def.body, &mut reads);
    reads.retain(|name| !bound.contains(name));
    reads
}

/// Names bound within the function's own scope: parameters, assignment
/// targets, and nested definition names. Conditional assignments count.
fn bound_names(def: &FnDef) -> HashSet<String> {
    let mut bound: HashSet<String> = def.params.iter().map(|p| p.name.clone()).collect();
    collect_bound(&def.body, &mut bound);
    bound
}

fn collect_bound(stmts: &[Stmt], bound: &mut HashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { targets, .. } => {
                for target in targets {
                    if let AssignTarget::Name { name, .. } = target {
                        bound.insert(name.clone());
                    }
                }
            }
            Stmt::Fn(def) => {
                bound.insert(def.name.clone());
            }
            Stmt::Class(def) => {
                bound.insert(def.name.clone());
            }
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                collect_bound(then_body, bound);
                collect_bound(else_body, bound);
            }
            Stmt::While { body, .. } => collect_bound(body, bound),
            Stmt::Import { module, .. } => {
                bound.insert(module.clone());
            }
            Stmt::FromImport { names, .. } => {
                for name in names {
                    bound.insert(name.clone());
                }
            }
            Stmt::Expr(_) | Stmt::Return { .. } => {}
        }
    }
}

fn scan_stmts(stmts: &[Stmt], reads: &mut BTreeSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { targets, value, .. } => {
                scan_expr(value, reads);
                for target in targets {
                    if let AssignTarget::Attribute { object, .. } = target {
                        scan_expr(object, reads);
                    }
                }
            }
            Stmt::Expr(expr) => scan_expr(expr, reads),
            Stmt::Return { value, .. } => {
                if let Some(expr) = value {
                    scan_expr(expr, reads);
                }
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                scan_expr(cond, reads);
                scan_stmts(then_body, reads);
                scan_stmts(else_body, reads);
            }
            Stmt::While { cond, body, .. } => {
                scan_expr(cond, reads);
                scan_stmts(body, reads);
            }
            Stmt::Fn(def) => scan_nested_fn(def, reads),
            Stmt::Class(def) => scan_nested_class(def, reads),
            Stmt::Import { .. } | Stmt::FromImport { .. } => {}
        }
    }
}

/// A nested definition contributes its defaults (evaluated in this scope)
/// and its own free names, which may still be bound here.
fn scan_nested_fn(def: &FnDef, reads: &mut BTreeSet<String>) {
    for param in &def.params {
        if let Some(default) = &param.default {
            scan_expr(default, reads);
        }
    }
    reads.extend(free_names(def));
}

fn scan_nested_class(def: &ClassDef, reads: &mut BTreeSet<String>) {
    for method in &def.methods {
        scan_nested_fn(method, reads);
    }
}

fn scan_expr(expr: &Expr, reads: &mut BTreeSet<String>) {
    match expr {
        Expr::Name { name, .. } => {
            reads.insert(name.clone());
        }
        Expr::Int { .. }
        | Expr::Float { .. }
        | Expr::Str { .. }
        | Expr::Bool { .. }
        | Expr::Nil { .. } => {}
        Expr::List { items, .. } | Expr::Tuple { items, .. } => {
            for item in items {
                scan_expr(item, reads);
            }
        }
        Expr::Map { entries, .. } => {
            for (key, value) in entries {
                scan_expr(key, reads);
                scan_expr(value, reads);
            }
        }
        Expr::Attribute { object, .. } => scan_expr(object, reads),
        Expr::Call { callee, args, .. } => {
            scan_expr(callee, reads);
            for arg in args {
                scan_expr(arg, reads);
            }
        }
        Expr::Unary { operand, .. } => scan_expr(operand, reads),
        Expr::Binary { left, right, .. } => {
            scan_expr(left, reads);
            scan_expr(right, reads);
        }
    }
}

/// Names read by a function's own default expressions. Defaults evaluate
/// in the enclosing scope, so these reads never count toward the
/// function's own free names.
pub fn default_names(def: &FnDef) -> BTreeSet<String> {
    let mut reads = BTreeSet::new();
    for param in &def.params {
        if let Some(default) = &param.default {
            scan_expr(default, &mut reads);
        }
    }
    reads
}

enum Found<'a> {
    Fn(&'a FnDef),
    Class(&'a ClassDef),
}

/// Locate a definition by bare name, descending through conditional
/// bodies but never into other definitions.
fn find_def<'a>(stmts: &'a [Stmt], name: &str) -> Option<Found<'a>> {
    for stmt in stmts {
        match stmt {
            Stmt::Fn(def) if def.name == name => return Some(Found::Fn(def)),
            Stmt::Class(def) if def.name == name => return Some(Found::Class(def)),
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                if let Some(found) =
                    find_def(then_body, name).or_else(|| find_def(else_body, name))
                {
                    return Some(found);
                }
            }
            Stmt::While { body, .. } => {
                if let Some(found) = find_def(body, name) {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
    None
}

/// The definition node a dotted qualified name points at, nested
/// functions and class methods included.
pub fn definition<'a>(tree: &'a ModuleAst, qualname: &str) -> Option<&'a FnDef> {
    let mut stmts = &tree.stmts[..];
    let mut methods: Option<&[FnDef]> = None;
    let mut current: Option<&FnDef> = None;
    for part in qualname.split('.') {
        if let Some(defs) = methods.take() {
            let def = defs.iter().find(|def| def.name == part)?;
            current = Some(def);
            stmts = &def.body;
            continue;
        }
        match find_def(stmts, part)? {
            Found::Fn(def) => {
                current = Some(def);
                stmts = &def.body;
            }
            Found::Class(class) => {
                methods = Some(&class.methods);
                current = None;
            }
        }
    }
    current
}

/// Module-relative binding path of a name captured by the function at
/// `qualname`: the innermost enclosing function that binds the name,
/// joined with it. Class scopes on the way bind nothing. `None` when no
/// enclosing function binds it.
pub fn capture_path(tree: &ModuleAst, qualname: &str, name: &str) -> Option<String> {
    let parts: Vec<&str> = qualname.split('.').collect();
    let mut chain: Vec<(usize, &FnDef)> = Vec::new();
    let mut stmts = &tree.stmts[..];
    let mut methods: Option<&[FnDef]> = None;
    for (depth, part) in parts[..parts.len() - 1].iter().enumerate() {
        let part = *part;
        if let Some(defs) = methods.take() {
            let def = defs.iter().find(|def| def.name == part)?;
            chain.push((depth, def));
            stmts = &def.body;
            continue;
        }
        match find_def(stmts, part)? {
            Found::Fn(def) => {
                chain.push((depth, def));
                stmts = &def.body;
            }
            Found::Class(class) => methods = Some(&class.methods),
        }
    }
    for (depth, def) in chain.iter().rev() {
        if bound_names(def).contains(name) {
            return Some(format!("{}.{}", parts[..=*depth].join("."), name));
        }
    }
    None
}

/// Free names of a live function resolved to values: captured environment
/// first, then the defining module's globals. Names found in neither
/// (builtins, genuinely undefined names) are omitted.
pub fn resolve(function: &Function) -> BTreeMap<String, Value> {
    let mut resolved = BTreeMap::new();
    for name in free_names(&function.def) {
        if let Some(captures) = &function.captures {
            if let Some(value) = captures.get(&name) {
                resolved.insert(name, value);
                continue;
            }
        }
        if let Some(value) = function.globals.get(&name) {
            resolved.insert(name, value);
        }
    }
    resolved
}

/// Union of every method's resolved free variables.
pub fn class_free_variables(class: &ClassObj) -> BTreeMap<String, Value> {
    let mut resolved = BTreeMap::new();
    for (_, method) in &class.methods {
        resolved.extend(resolve(method));
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::call;
    use crate::registry::ModuleRegistry;

    fn names(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    fn function_def(source: &str, name: &str) -> FnDef {
        let tree = crate::syntax::parse_module(source).unwrap();
        for stmt in tree.stmts {
            if let Stmt::Fn(def) = stmt {
                if def.name == name {
                    return def;
                }
            }
        }
        panic!("function '{}' not found", name);
    }

    #[test]
    fn test_locals_and_params_are_not_free() {
        let def = function_def("fn f(x, n = 1) {\n    k = 10\n    return n * k + x\n}\n", "f");
        assert!(free_names(&def).is_empty());
    }

    #[test]
    fn test_global_reads_are_free() {
        let def = function_def("fn g(x) {\n    alpha = 42\n    return f(x) + alpha + rate\n}\n", "g");
        assert_eq!(names(&free_names(&def)), ["f", "rate"]);
    }

    #[test]
    fn test_nested_function_reads_surface() {
        let source = "fn outer() {\n    fn helper() {\n        return rate * scale\n    }\n    scale = 2\n    return helper\n}\n";
        let def = function_def(source, "outer");
        // scale is bound in outer, rate is not
        assert_eq!(names(&free_names(&def)), ["rate"]);
    }

    #[test]
    fn test_nested_defaults_read_enclosing_scope() {
        let source = "fn outer() {\n    fn helper(n = base) {\n        return n\n    }\n    return helper\n}\n";
        let def = function_def(source, "outer");
        assert_eq!(names(&free_names(&def)), ["base"]);
    }

    #[test]
    fn test_conditional_assignment_binds() {
        let source = "fn f(x) {\n    if x > 0 {\n        sign = 1\n    } else {\n        sign = -1\n    }\n    return sign\n}\n";
        let def = function_def(source, "f");
        assert!(free_names(&def).is_empty());
    }

    #[test]
    fn test_capture_path_names_the_binding_scope() {
        let tree = crate::syntax::parse_module(
            "fn outer() {\n    base = 5\n    fn inner(n = 2) {\n        return base + n\n    }\n    return inner\n}\n",
        )
        .unwrap();
        assert_eq!(
            capture_path(&tree, "outer.inner", "base").as_deref(),
            Some("outer.base")
        );
        assert_eq!(capture_path(&tree, "outer.inner", "ghost"), None);
    }

    #[test]
    fn test_definition_walks_nested_scopes() {
        let tree = crate::syntax::parse_module(
            "fn outer() {\n    fn inner() {\n        return 1\n    }\n    return inner\n}\n\nclass Meter {\n    fn add(self, n = 1) {\n        return n\n    }\n}\n",
        )
        .unwrap();
        assert_eq!(definition(&tree, "outer.inner").unwrap().name, "inner");
        assert_eq!(definition(&tree, "Meter.add").unwrap().name, "add");
        assert!(definition(&tree, "outer.ghost").is_none());
    }

    #[test]
    fn test_default_names_read_the_enclosing_scope() {
        let def = function_def("fn f(n = base + 1, m = 2) {\n    return n + m\n}\n", "f");
        assert_eq!(
            default_names(&def).into_iter().collect::<Vec<_>>(),
            ["base"]
        );
    }

    #[test]
    fn test_resolve_skips_builtins() {
        let mut registry = ModuleRegistry::new();
        registry.add_source(
            "m",
            "rate = 3\n\nfn f(xs) {\n    return len(xs) * rate\n}\n",
        );
        let f = match registry.resolve("m.f").unwrap() {
            Value::Function(f) => f,
            other => panic!("expected function, got {}", other),
        };
        let resolved = resolve(&f);
        assert_eq!(resolved.get("rate"), Some(&Value::Int(3)));
        assert!(!resolved.contains_key("len"));
    }

    #[test]
    fn test_resolve_prefers_captures_over_globals() {
        let mut registry = ModuleRegistry::new();
        registry.add_source(
            "m",
            "base = 100\n\nfn outer() {\n    base = 5\n    fn inner() {\n        return base\n    }\n    return inner\n}\n",
        );
        let outer = registry.resolve("m.outer").unwrap();
        let inner = match call(&outer, &[]).unwrap() {
            Value::Function(f) => f,
            other => panic!("expected function, got {}", other),
        };
        assert_eq!(resolve(&inner).get("base"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_class_unions_method_free_variables() {
        let mut registry = ModuleRegistry::new();
        registry.add_source(
            "m",
            "rate = 2\nfloor = 1\n\nclass Meter {\n    fn init(self) {\n        self.total = floor\n    }\n    fn add(self, n) {\n        self.total = self.total + n * rate\n        return self.total\n    }\n}\n",
        );
        let class = match registry.resolve("m.Meter").unwrap() {
            Value::Class(c) => c,
            other => panic!("expected class, got {}", other),
        };
        let resolved = class_free_variables(&class);
        assert_eq!(resolved.get("rate"), Some(&Value::Int(2)));
        assert_eq!(resolved.get("floor"), Some(&Value::Int(1)));
    }
}

//! Tree-walking evaluator
//!
//! Executes module top levels and function bodies directly over the syntax
//! tree. Function values close over the namespace and local environment
//! they were defined in, which is what lets a rebound module's namespace
//! flow into every callable it defines.

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::builtins;
use super::value::{
    BoundMethod, ClassObj, Env, Function, Instance, ModuleRef, Namespace, Value,
};
use crate::syntax::ast::{AssignTarget, BinaryOp, ClassDef, Expr, FnDef, Stmt, UnaryOp};
use crate::{Error, Result};

const MAX_CALL_DEPTH: usize = 200;

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Result<Self> {
        let depth = CALL_DEPTH.with(|d| {
            d.set(d.get() + 1);
            d.get()
        });
        if depth > MAX_CALL_DEPTH {
            CALL_DEPTH.with(|d| d.set(d.get() - 1));
            return Err(Error::Runtime("maximum call depth exceeded".to_string()));
        }
        Ok(DepthGuard)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Resolves `import`/`from ... import` statements during module execution.
///
/// The registry implements this for first loads; the rebind loader wraps it
/// to serve already-rebound modules first.
pub trait ImportResolver {
    /// Handle for `import name`. May return a partially initialized module
    /// when the import is cyclic.
    fn module_handle(&mut self, name: &str) -> Result<Rc<ModuleRef>>;

    /// Value for `from module import name`.
    fn module_attr(&mut self, module: &str, name: &str) -> Result<Value>;
}

/// Statement outcome inside a function body.
enum Flow {
    Normal,
    Return(Value),
}

struct Ctx<'r> {
    module: String,
    globals: Namespace,
    /// `None` at module top level: assignments go to `globals`
    locals: Option<Env>,
    /// Enclosing definition names, for qualified names of nested defs
    scope: Vec<String>,
    resolver: Option<&'r mut dyn ImportResolver>,
}

impl Ctx<'_> {
    fn bind(&mut self, name: &str, value: Value) {
        match &mut self.locals {
            Some(env) => env.set_local(name, value),
            None => self.globals.set(name, value),
        }
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(env) = &self.locals {
            if let Some(value) = env.get(name) {
                return Some(value);
            }
        }
        if let Some(value) = self.globals.get(name) {
            return Some(value);
        }
        builtins::lookup(name)
    }
}

/// Execute a module's top-level statements into `namespace`.
pub fn exec_module(
    stmts: &[Stmt],
    module: &str,
    namespace: &Namespace,
    resolver: &mut dyn ImportResolver,
) -> Result<()> {
    let mut ctx = Ctx {
        module: module.to_string(),
        globals: namespace.clone(),
        locals: None,
        scope: Vec::new(),
        resolver: Some(resolver),
    };
    match exec_stmts(&mut ctx, stmts)? {
        Flow::Normal => Ok(()),
        Flow::Return(_) => Err(Error::Runtime(
            "'return' outside of a function".to_string(),
        )),
    }
}

/// Invoke a callable value with positional arguments.
pub fn call(value: &Value, args: &[Value]) -> Result<Value> {
    match value {
        Value::Function(function) => call_function(function, args),
        Value::BoundMethod(bound) => {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(bound.receiver.clone());
            full.extend(args.iter().cloned());
            call_function(&bound.function, &full)
        }
        Value::Class(class) => instantiate(class, args),
        Value::Native(native) => (native.handler)(args),
        other => Err(Error::Runtime(format!(
            "value of type {} is not callable",
            other.type_name()
        ))),
    }
}

/// Invoke a user-defined function.
pub fn call_function(function: &Rc<Function>, args: &[Value]) -> Result<Value> {
    let _guard = DepthGuard::enter()?;

    let params = &function.def.params;
    if args.len() > params.len() {
        return Err(Error::Runtime(format!(
            "{}() takes at most {} arguments, got {}",
            function.full_name(),
            params.len(),
            args.len()
        )));
    }

    let mut env = function.captures.clone().unwrap_or_default();
    env.push_frame();
    for (index, param) in params.iter().enumerate() {
        let value = if index < args.len() {
            args[index].clone()
        } else if let Some(default) = function.defaults.get(index).and_then(|d| d.clone()) {
            default
        } else {
            return Err(Error::Runtime(format!(
                "{}() missing argument '{}'",
                function.full_name(),
                param.name
            )));
        };
        env.set_local(&param.name, value);
    }

    let mut ctx = Ctx {
        module: function.module.clone(),
        globals: function.globals.clone(),
        locals: Some(env),
        scope: function.qualname.split('.').map(str::to_string).collect(),
        resolver: None,
    };
    match exec_stmts(&mut ctx, &function.def.body)? {
        Flow::Return(value) => Ok(value),
        Flow::Normal => Ok(Value::Nil),
    }
}

/// Build a function value outside normal execution, evaluating defaults
/// against the given globals and captured environment. This is how the
/// rebound counterpart of a closure is produced when the call that created
/// the original is long gone.
pub fn materialize_function(
    def: &FnDef,
    module: &str,
    qualname: &str,
    globals: &Namespace,
    captures: Env,
) -> Result<Rc<Function>> {
    let mut ctx = Ctx {
        module: module.to_string(),
        globals: globals.clone(),
        locals: Some(captures),
        scope: Vec::new(),
        resolver: None,
    };
    let mut defaults = Vec::with_capacity(def.params.len());
    for param in &def.params {
        defaults.push(match &param.default {
            Some(expr) => Some(eval_expr(&mut ctx, expr)?),
            None => None,
        });
    }
    Ok(Rc::new(Function {
        name: def.name.clone(),
        qualname: qualname.to_string(),
        module: ctx.module,
        def: Rc::new(def.clone()),
        globals: globals.clone(),
        captures: ctx.locals,
        defaults,
    }))
}

fn instantiate(class: &Rc<ClassObj>, args: &[Value]) -> Result<Value> {
    let instance = Value::Instance(Rc::new(Instance {
        class: class.clone(),
        fields: RefCell::new(HashMap::new()),
    }));
    if let Some(init) = class.method("init") {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(instance.clone());
        full.extend(args.iter().cloned());
        call_function(init, &full)?;
    } else if !args.is_empty() {
        return Err(Error::Runtime(format!(
            "{} takes no constructor arguments",
            class.full_name()
        )));
    }
    Ok(instance)
}

fn exec_stmts(ctx: &mut Ctx, stmts: &[Stmt]) -> Result<Flow> {
    for stmt in stmts {
        if let Flow::Return(value) = exec_stmt(ctx, stmt)? {
            return Ok(Flow::Return(value));
        }
    }
    Ok(Flow::Normal)
}

fn exec_stmt(ctx: &mut Ctx, stmt: &Stmt) -> Result<Flow> {
    match stmt {
        Stmt::Import { module, .. } => {
            let resolver = ctx
                .resolver
                .as_deref_mut()
                .ok_or_else(|| Error::Runtime("import outside module scope".to_string()))?;
            let handle = resolver.module_handle(module)?;
            ctx.bind(module, Value::Module(handle));
            Ok(Flow::Normal)
        }
        Stmt::FromImport { module, names, .. } => {
            for name in names {
                let resolver = ctx
                    .resolver
                    .as_deref_mut()
                    .ok_or_else(|| Error::Runtime("import outside module scope".to_string()))?;
                let value = resolver.module_attr(module, name)?;
                ctx.bind(name, value);
            }
            Ok(Flow::Normal)
        }
        Stmt::Assign { targets, value, .. } => {
            let value = eval_expr(ctx, value)?;
            for target in targets {
                match target {
                    AssignTarget::Name { name, .. } => ctx.bind(name, value.clone()),
                    AssignTarget::Attribute { object, name, .. } => {
                        let receiver = eval_expr(ctx, object)?;
                        match &receiver {
                            Value::Instance(instance) => {
                                instance
                                    .fields
                                    .borrow_mut()
                                    .insert(name.clone(), value.clone());
                            }
                            other => {
                                return Err(Error::Runtime(format!(
                                    "cannot assign attribute '{}' on {}",
                                    name,
                                    other.type_name()
                                )));
                            }
                        }
                    }
                }
            }
            Ok(Flow::Normal)
        }
        Stmt::Expr(expr) => {
            eval_expr(ctx, expr)?;
            Ok(Flow::Normal)
        }
        Stmt::Return { value, .. } => {
            if ctx.locals.is_none() {
                return Err(Error::Runtime(
                    "'return' outside of a function".to_string(),
                ));
            }
            let value = match value {
                Some(expr) => eval_expr(ctx, expr)?,
                None => Value::Nil,
            };
            Ok(Flow::Return(value))
        }
        Stmt::If {
            cond,
            then_body,
            else_body,
            ..
        } => {
            if eval_expr(ctx, cond)?.is_truthy() {
                exec_stmts(ctx, then_body)
            } else {
                exec_stmts(ctx, else_body)
            }
        }
        Stmt::While { cond, body, .. } => {
            while eval_expr(ctx, cond)?.is_truthy() {
                if let Flow::Return(value) = exec_stmts(ctx, body)? {
                    return Ok(Flow::Return(value));
                }
            }
            Ok(Flow::Normal)
        }
        Stmt::Fn(def) => {
            let scope = ctx.scope.clone();
            let function = make_function(ctx, def, &scope)?;
            ctx.bind(&def.name, Value::Function(function));
            Ok(Flow::Normal)
        }
        Stmt::Class(def) => {
            let class = make_class(ctx, def)?;
            ctx.bind(&def.name, Value::Class(class));
            Ok(Flow::Normal)
        }
    }
}

/// Build a function value in the current context. Defaults are evaluated
/// here, at definition time.
fn make_function(ctx: &mut Ctx, def: &FnDef, scope: &[String]) -> Result<Rc<Function>> {
    let qualname = if scope.is_empty() {
        def.name.clone()
    } else {
        format!("{}.{}", scope.join("."), def.name)
    };
    let mut defaults = Vec::with_capacity(def.params.len());
    for param in &def.params {
        defaults.push(match &param.default {
            Some(expr) => Some(eval_expr(ctx, expr)?),
            None => None,
        });
    }
    Ok(Rc::new(Function {
        name: def.name.clone(),
        qualname,
        module: ctx.module.clone(),
        def: Rc::new(def.clone()),
        globals: ctx.globals.clone(),
        captures: ctx.locals.clone(),
        defaults,
    }))
}

fn make_class(ctx: &mut Ctx, def: &ClassDef) -> Result<Rc<ClassObj>> {
    let mut scope = ctx.scope.clone();
    scope.push(def.name.clone());
    let mut methods = Vec::with_capacity(def.methods.len());
    for method in &def.methods {
        methods.push((method.name.clone(), make_function(ctx, method, &scope)?));
    }
    Ok(Rc::new(ClassObj {
        name: def.name.clone(),
        module: ctx.module.clone(),
        line_start: def.line_start,
        line_end: def.line_end,
        methods,
    }))
}

fn eval_expr(ctx: &mut Ctx, expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Int { value, .. } => Ok(Value::Int(*value)),
        Expr::Float { value, .. } => Ok(Value::Float(*value)),
        Expr::Str { value, .. } => Ok(Value::str(value)),
        Expr::Bool { value, .. } => Ok(Value::Bool(*value)),
        Expr::Nil { .. } => Ok(Value::Nil),
        Expr::Name { name, line } => ctx.lookup(name).ok_or_else(|| {
            Error::Runtime(format!(
                "name '{}' is not defined (line {})",
                name, line
            ))
        }),
        Expr::List { items, .. } => {
            let values = items
                .iter()
                .map(|item| eval_expr(ctx, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::List(Rc::new(values)))
        }
        Expr::Tuple { items, .. } => {
            let values = items
                .iter()
                .map(|item| eval_expr(ctx, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Tuple(Rc::new(values)))
        }
        Expr::Map { entries, .. } => {
            let mut values = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                values.push((eval_expr(ctx, key)?, eval_expr(ctx, value)?));
            }
            Ok(Value::Map(Rc::new(values)))
        }
        Expr::Attribute { object, name, line } => {
            let receiver = eval_expr(ctx, object)?;
            attr_get(&receiver, name, *line)
        }
        Expr::Call { callee, args, .. } => {
            let callee = eval_expr(ctx, callee)?;
            let values = args
                .iter()
                .map(|arg| eval_expr(ctx, arg))
                .collect::<Result<Vec<_>>>()?;
            call(&callee, &values)
        }
        Expr::Unary { op, operand, .. } => {
            let value = eval_expr(ctx, operand)?;
            match op {
                UnaryOp::Neg => match value {
                    Value::Int(n) => Ok(Value::Int(-n)),
                    Value::Float(x) => Ok(Value::Float(-x)),
                    other => Err(Error::Runtime(format!(
                        "cannot negate {}",
                        other.type_name()
                    ))),
                },
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
            }
        }
        Expr::Binary {
            op, left, right, ..
        } => eval_binary(ctx, *op, left, right),
    }
}

fn attr_get(receiver: &Value, name: &str, line: u32) -> Result<Value> {
    match receiver {
        Value::Module(module) => module.namespace.get(name).ok_or_else(|| {
            Error::Runtime(format!(
                "module '{}' has no attribute '{}' (line {})",
                module.name, name, line
            ))
        }),
        Value::Instance(instance) => {
            if let Some(field) = instance.fields.borrow().get(name) {
                return Ok(field.clone());
            }
            let method = instance.class.method(name).ok_or_else(|| {
                Error::Runtime(format!(
                    "{} has no attribute '{}' (line {})",
                    receiver, name, line
                ))
            })?;
            Ok(Value::BoundMethod(Rc::new(BoundMethod {
                receiver: receiver.clone(),
                function: method.clone(),
            })))
        }
        Value::Class(class) => {
            let method = class.method(name).ok_or_else(|| {
                Error::Runtime(format!(
                    "class {} has no method '{}' (line {})",
                    class.full_name(),
                    name,
                    line
                ))
            })?;
            Ok(Value::Function(method.clone()))
        }
        other => Err(Error::Runtime(format!(
            "{} has no attributes (line {})",
            other.type_name(),
            line
        ))),
    }
}

fn eval_binary(ctx: &mut Ctx, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value> {
    // and/or short-circuit and yield the deciding operand
    match op {
        BinaryOp::And => {
            let lhs = eval_expr(ctx, left)?;
            if !lhs.is_truthy() {
                return Ok(lhs);
            }
            return eval_expr(ctx, right);
        }
        BinaryOp::Or => {
            let lhs = eval_expr(ctx, left)?;
            if lhs.is_truthy() {
                return Ok(lhs);
            }
            return eval_expr(ctx, right);
        }
        _ => {}
    }

    let lhs = eval_expr(ctx, left)?;
    let rhs = eval_expr(ctx, right)?;
    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinaryOp::Ne => Ok(Value::Bool(lhs != rhs)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, &lhs, &rhs),
        BinaryOp::Add => add(&lhs, &rhs),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            numeric(op, &lhs, &rhs)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
        (a, b) => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => {
                return Err(Error::Runtime(format!(
                    "cannot compare {} with {}",
                    lhs.type_name(),
                    rhs.type_name()
                )));
            }
        },
    };
    let ordering = ordering.ok_or_else(|| {
        Error::Runtime("comparison is undefined for NaN".to_string())
    })?;
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn add(lhs: &Value, rhs: &Value) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Ok(Value::str(joined))
        }
        (Value::List(a), Value::List(b)) => {
            let mut items = a.as_ref().clone();
            items.extend(b.iter().cloned());
            Ok(Value::List(Rc::new(items)))
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            let mut items = a.as_ref().clone();
            items.extend(b.iter().cloned());
            Ok(Value::Tuple(Rc::new(items)))
        }
        _ => numeric(BinaryOp::Add, lhs, rhs),
    }
}

fn numeric(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        return match op {
            BinaryOp::Add => Ok(Value::Int(a.wrapping_add(*b))),
            BinaryOp::Sub => Ok(Value::Int(a.wrapping_sub(*b))),
            BinaryOp::Mul => Ok(Value::Int(a.wrapping_mul(*b))),
            BinaryOp::Div => {
                if *b == 0 {
                    Err(Error::Runtime("division by zero".to_string()))
                } else {
                    Ok(Value::Int(a / b))
                }
            }
            BinaryOp::Mod => {
                if *b == 0 {
                    Err(Error::Runtime("modulo by zero".to_string()))
                } else {
                    Ok(Value::Int(a % b))
                }
            }
            _ => unreachable!(),
        };
    }
    match (as_f64(lhs), as_f64(rhs)) {
        (Some(a), Some(b)) => match op {
            BinaryOp::Add => Ok(Value::Float(a + b)),
            BinaryOp::Sub => Ok(Value::Float(a - b)),
            BinaryOp::Mul => Ok(Value::Float(a * b)),
            BinaryOp::Div => Ok(Value::Float(a / b)),
            BinaryOp::Mod => Ok(Value::Float(a % b)),
            _ => unreachable!(),
        },
        _ => Err(Error::Runtime(format!(
            "unsupported operand types for '{}': {} and {}",
            op.as_str(),
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_module;

    struct NoImports;

    impl ImportResolver for NoImports {
        fn module_handle(&mut self, name: &str) -> Result<Rc<ModuleRef>> {
            Err(Error::ImportResolution(format!("no module '{}'", name)))
        }

        fn module_attr(&mut self, module: &str, _name: &str) -> Result<Value> {
            Err(Error::ImportResolution(format!("no module '{}'", module)))
        }
    }

    fn run(source: &str) -> Namespace {
        let tree = parse_module(source).unwrap();
        let ns = Namespace::new();
        exec_module(&tree.stmts, "test", &ns, &mut NoImports).unwrap();
        ns
    }

    fn call_named(ns: &Namespace, name: &str, args: &[Value]) -> Value {
        call(&ns.get(name).unwrap(), args).unwrap()
    }

    #[test]
    fn test_function_call_with_defaults() {
        let ns = run("fn f(x, n = 1) {\n    k = 10\n    return n * k + x\n}\n");
        assert_eq!(call_named(&ns, "f", &[Value::Int(0)]), Value::Int(10));
        assert_eq!(
            call_named(&ns, "f", &[Value::Int(0), Value::Int(3)]),
            Value::Int(30)
        );
    }

    #[test]
    fn test_missing_argument() {
        let ns = run("fn f(x) {\n    return x\n}\n");
        assert!(matches!(
            call(&ns.get("f").unwrap(), &[]),
            Err(Error::Runtime(_))
        ));
    }

    #[test]
    fn test_closure_captures_enclosing_local() {
        let source = "fn outer() {\n    base = 5\n    fn inner(n = 2) {\n        return base + n\n    }\n    return inner\n}\n";
        let ns = run(source);
        let inner = call_named(&ns, "outer", &[]);
        assert_eq!(call(&inner, &[]).unwrap(), Value::Int(7));
        if let Value::Function(f) = &inner {
            assert_eq!(f.qualname, "outer.inner");
        } else {
            panic!("expected function, got {}", inner);
        }
    }

    #[test]
    fn test_mutual_recursion() {
        let source = "fn is_even(n) {\n    if n == 0 {\n        return true\n    }\n    return is_odd(n - 1)\n}\n\nfn is_odd(n) {\n    if n == 0 {\n        return false\n    }\n    return is_even(n - 1)\n}\n";
        let ns = run(source);
        assert_eq!(call_named(&ns, "is_even", &[Value::Int(10)]), Value::Bool(true));
        assert_eq!(call_named(&ns, "is_odd", &[Value::Int(7)]), Value::Bool(true));
    }

    #[test]
    fn test_while_loop() {
        let source = "fn total(n) {\n    sum = 0\n    while n > 0 {\n        sum = sum + n\n        n = n - 1\n    }\n    return sum\n}\n";
        let ns = run(source);
        assert_eq!(call_named(&ns, "total", &[Value::Int(4)]), Value::Int(10));
    }

    #[test]
    fn test_class_instances_and_methods() {
        let source = "class Counter {\n    fn init(self, start = 0) {\n        self.count = start\n    }\n    fn bump(self, by = 1) {\n        self.count = self.count + by\n        return self.count\n    }\n}\n";
        let ns = run(source);
        let counter = call_named(&ns, "Counter", &[Value::Int(5)]);
        let bump = match &counter {
            Value::Instance(instance) => Value::BoundMethod(Rc::new(BoundMethod {
                receiver: counter.clone(),
                function: instance.class.method("bump").unwrap().clone(),
            })),
            other => panic!("expected instance, got {}", other),
        };
        assert_eq!(call(&bump, &[]).unwrap(), Value::Int(6));
        assert_eq!(call(&bump, &[Value::Int(4)]).unwrap(), Value::Int(10));
    }

    #[test]
    fn test_infinite_recursion_is_bounded() {
        let ns = run("fn loop_forever() {\n    return loop_forever()\n}\n");
        assert!(matches!(
            call(&ns.get("loop_forever").unwrap(), &[]),
            Err(Error::Runtime(_))
        ));
    }

    #[test]
    fn test_builtin_resolution() {
        let ns = run("fn count(xs = [1, 2, 3]) {\n    return len(xs)\n}\n");
        assert_eq!(call_named(&ns, "count", &[]), Value::Int(3));
    }

    #[test]
    fn test_chained_assignment_binds_all_targets() {
        let ns = run("a = b = 7\n");
        assert_eq!(ns.get("a"), Some(Value::Int(7)));
        assert_eq!(ns.get("b"), Some(Value::Int(7)));
    }

    #[test]
    fn test_top_level_return_rejected() {
        let tree = parse_module("fn f() {\n    return 1\n}\n").unwrap();
        let ns = Namespace::new();
        exec_module(&tree.stmts, "test", &ns, &mut NoImports).unwrap();
        // A bare return at module level is a runtime error.
        let tree = parse_module("return 1\n").unwrap();
        assert!(exec_module(&tree.stmts, "test", &ns, &mut NoImports).is_err());
    }
}

//! Syntax-Tree Accessor
//!
//! Slices a callable's exact definition text out of its owning module's
//! source, dedents it, and pads the front with blank lines so a re-parse
//! yields node line numbers equal to the original file's. Downstream
//! rewriting and error reporting rely on those line numbers matching.

use crate::interp::value::{ClassObj, Function};
use crate::registry::ModuleRegistry;
use crate::syntax::ast::{ClassDef, FnDef, Stmt};
use crate::syntax::parse_module;
use crate::{Error, Result};

/// The padded, dedented definition text of a function.
pub fn function_source(registry: &ModuleRegistry, function: &Function) -> Result<String> {
    let source = module_source(registry, &function.module)?;
    padded_slice(
        source,
        function.def.line_start,
        function.def.line_end,
        &function.full_name(),
    )
}

/// Re-parse a function's definition, line numbers preserved.
pub fn function_tree(registry: &ModuleRegistry, function: &Function) -> Result<FnDef> {
    let text = function_source(registry, function)?;
    let tree = parse_module(&text)?;
    for stmt in tree.stmts {
        if let Stmt::Fn(def) = stmt {
            if def.name == function.name {
                return Ok(def);
            }
        }
    }
    Err(Error::SourceUnavailable(format!(
        "re-parsed source of '{}' does not define it",
        function.full_name()
    )))
}

/// Re-parse a class's definition, line numbers preserved.
pub fn class_tree(registry: &ModuleRegistry, class: &ClassObj) -> Result<ClassDef> {
    let source = module_source(registry, &class.module)?;
    let text = padded_slice(source, class.line_start, class.line_end, &class.full_name())?;
    let tree = parse_module(&text)?;
    for stmt in tree.stmts {
        if let Stmt::Class(def) = stmt {
            if def.name == class.name {
                return Ok(def);
            }
        }
    }
    Err(Error::SourceUnavailable(format!(
        "re-parsed source of '{}' does not define it",
        class.full_name()
    )))
}

fn module_source<'r>(registry: &'r ModuleRegistry, module: &str) -> Result<&'r str> {
    registry.source(module).ok_or_else(|| {
        Error::SourceUnavailable(format!("no source registered for module '{}'", module))
    })
}

/// Slice lines `line_start..=line_end`, dedent, and pad the front so line
/// numbers survive a re-parse.
fn padded_slice(source: &str, line_start: u32, line_end: u32, what: &str) -> Result<String> {
    let lines: Vec<&str> = source.lines().collect();
    let start = line_start as usize;
    let end = line_end as usize;
    if start == 0 || end < start || end > lines.len() {
        return Err(Error::SourceUnavailable(format!(
            "lines {}..{} of '{}' fall outside its module source",
            line_start, line_end, what
        )));
    }

    let slice = &lines[start - 1..end];
    let indent = slice
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches(' ').len())
        .min()
        .unwrap_or(0);

    let mut text = String::new();
    for _ in 1..start {
        text.push('\n');
    }
    for line in slice {
        if line.len() >= indent {
            text.push_str(&line[indent..]);
        }
        text.push('\n');
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::call;
    use crate::interp::value::Value;

    const SOURCE: &str = "rate = 2\n\nfn outer() {\n    base = 5\n    fn inner(n = 2) {\n        return base + n\n    }\n    return inner\n}\n\nclass Pair {\n    fn init(self, a = 1) {\n        self.a = a\n    }\n}\n";

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        registry.add_source("m", SOURCE);
        registry.load("m").unwrap();
        registry
    }

    fn function(registry: &mut ModuleRegistry, path: &str) -> std::rc::Rc<Function> {
        match registry.resolve(path).unwrap() {
            Value::Function(f) => f,
            other => panic!("expected function, got {}", other),
        }
    }

    #[test]
    fn test_nested_function_keeps_line_numbers() {
        let mut registry = registry();
        let outer = function(&mut registry, "m.outer");
        let inner = match call(&Value::Function(outer), &[]).unwrap() {
            Value::Function(f) => f,
            other => panic!("expected function, got {}", other),
        };
        // inner sits indented at lines 5..7 of the module source
        let def = function_tree(&registry, &inner).unwrap();
        assert_eq!(def.name, "inner");
        assert_eq!(def.line_start, inner.def.line_start);
        assert_eq!(def.line_end, inner.def.line_end);
        assert_eq!(def.params[0].default, inner.def.params[0].default);
    }

    #[test]
    fn test_dedent_strips_common_indent() {
        let mut registry = registry();
        let outer = function(&mut registry, "m.outer");
        let inner = match call(&Value::Function(outer), &[]).unwrap() {
            Value::Function(f) => f,
            other => panic!("expected function, got {}", other),
        };
        let text = function_source(&registry, &inner).unwrap();
        let first_code_line = text.lines().find(|l| !l.trim().is_empty()).unwrap();
        assert!(first_code_line.starts_with("fn inner"));
    }

    #[test]
    fn test_class_tree_round_trips() {
        let mut registry = registry();
        let class = match registry.resolve("m.Pair").unwrap() {
            Value::Class(c) => c,
            other => panic!("expected class, got {}", other),
        };
        let def = class_tree(&registry, &class).unwrap();
        assert_eq!(def.name, "Pair");
        assert_eq!(def.methods.len(), 1);
        assert_eq!(def.line_start, class.line_start);
    }

    #[test]
    fn test_unregistered_module_is_source_unavailable() {
        let mut registry = registry();
        let outer = function(&mut registry, "m.outer");
        let empty = ModuleRegistry::new();
        assert!(matches!(
            function_tree(&empty, &outer),
            Err(Error::SourceUnavailable(_))
        ));
    }
}

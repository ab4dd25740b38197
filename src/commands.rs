//! CLI command implementations.

use std::path::Path;

use anyhow::Context;
use rebind::interp::call;
use rebind::literal::parse_literal;
use rebind::ui::{self, catalog_table, modules_table};
use rebind::{BindingsRequest, ModuleRegistry, Value};

pub fn run_introspect(
    registry: &mut ModuleRegistry,
    target: &str,
    format: &str,
) -> anyhow::Result<()> {
    let catalog = registry
        .introspect(target)
        .with_context(|| format!("introspecting '{}'", target))?;
    match format {
        "json" => {
            let object: serde_json::Map<String, serde_json::Value> = catalog
                .iter()
                .map(|(path, entry)| (path.clone(), entry.to_json()))
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::Value::Object(object))?
            );
        }
        "table" => {
            if catalog.is_empty() {
                ui::info(target, "no rebindable constants");
            } else {
                ui::section(target);
                println!("{}", catalog_table(&catalog));
            }
        }
        other => anyhow::bail!("unknown format '{}' (expected 'table' or 'json')", other),
    }
    Ok(())
}

pub fn run_call(
    registry: &mut ModuleRegistry,
    target: &str,
    args: &[String],
) -> anyhow::Result<()> {
    let callee = registry
        .resolve(target)
        .with_context(|| format!("resolving '{}'", target))?;
    let result = call(&callee, &parse_args(args)?)?;
    println!("{}", result);
    Ok(())
}

pub fn run_rebind(
    registry: &mut ModuleRegistry,
    target: &str,
    sets: &[String],
    call_args: Option<&[String]>,
) -> anyhow::Result<()> {
    let request = parse_request(sets)?;
    let rebound = registry
        .rebind(target, &request)
        .with_context(|| format!("rebinding '{}'", target))?;
    match call_args {
        Some(args) => {
            let result = call(&rebound, &parse_args(args)?)?;
            println!("{}", result);
        }
        None => {
            ui::success(&format!("rebound {}", rebound));
            for (path, literal) in &request {
                ui::binding(path, &literal.to_string());
            }
        }
    }
    Ok(())
}

pub fn run_modules(
    registry: &mut ModuleRegistry,
    root: &Path,
    extension: &str,
) -> anyhow::Result<()> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(root)
        .with_context(|| format!("reading module directory {}", root.display()))?
    {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();

    if names.is_empty() {
        ui::info(&root.display().to_string(), "no modules found");
        return Ok(());
    }
    let mut rows = Vec::with_capacity(names.len());
    for name in names {
        let definitions = match registry.load(&name) {
            Ok(module) => module
                .namespace()
                .snapshot()
                .into_iter()
                .filter(|(_, value)| value.is_callable())
                .map(|(key, _)| key)
                .collect::<Vec<_>>()
                .join(", "),
            Err(e) => ui::dim(&format!("error: {}", e)),
        };
        rows.push((name, definitions));
    }
    println!("{}", modules_table(&rows));
    Ok(())
}

fn parse_args(args: &[String]) -> anyhow::Result<Vec<Value>> {
    args.iter()
        .map(|arg| {
            parse_literal(arg)
                .map(|literal| literal.to_value())
                .with_context(|| format!("argument '{}' is not a literal", arg))
        })
        .collect()
}

fn parse_request(sets: &[String]) -> anyhow::Result<BindingsRequest> {
    let mut request = BindingsRequest::new();
    for set in sets {
        let (path, value) = set
            .split_once('=')
            .with_context(|| format!("--set '{}' is not of the form PATH=LITERAL", set))?;
        let literal = parse_literal(value.trim())
            .with_context(|| format!("--set '{}' has a non-literal value", set))?;
        request.insert(path.trim().to_string(), literal);
    }
    Ok(request)
}

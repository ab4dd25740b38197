//! Rebind CLI - introspect and rebind constants in embedded modules

mod commands;

use clap::{Parser, Subcommand};
use rebind::registry::DEFAULT_EXTENSION;
use rebind::{config, ModuleRegistry};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rebind")]
#[command(version)]
#[command(about = "Discover and rebind hard-coded constants in embedded modules")]
#[command(long_about = r#"
Rebind walks a function's closures, default arguments, and cross-module
references to catalog every hard-coded literal constant, then produces a
new callable with chosen constants replaced - the originals stay intact.

Example usage:
  rebind introspect example.f
  rebind rebind example.f --set example.f.k=11 --call 0
  rebind modules
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding module sources
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Path to the config file (defaults to rebind.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Catalog the rebindable constants reachable from a callable
    Introspect {
        /// Dotted path to the callable, e.g. example.f
        target: String,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Call a function with literal arguments
    Call {
        /// Dotted path to the callable
        target: String,

        /// Literal arguments
        args: Vec<String>,
    },

    /// Rebind constants and optionally call the result
    Rebind {
        /// Dotted path to the callable
        target: String,

        /// A binding to replace, repeatable
        #[arg(long, value_name = "PATH=LITERAL")]
        set: Vec<String>,

        /// Call the rebound function with these literal arguments
        #[arg(long, num_args = 0.., value_name = "LITERAL")]
        call: Option<Vec<String>>,
    },

    /// List the modules under the root directory
    Modules,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    let root = cli
        .root
        .or_else(|| config.root.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let extension = config
        .extension
        .clone()
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    let mut registry = ModuleRegistry::with_root(&root);
    registry.set_extension(extension.as_str());

    match cli.command {
        Commands::Introspect { target, format } => {
            commands::run_introspect(&mut registry, &target, &format)
        }
        Commands::Call { target, args } => commands::run_call(&mut registry, &target, &args),
        Commands::Rebind { target, set, call } => {
            commands::run_rebind(&mut registry, &target, &set, call.as_deref())
        }
        Commands::Modules => commands::run_modules(&mut registry, &root, &extension),
    }
}

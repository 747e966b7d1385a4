//! mdschema command-line client
//!
//! Registers entity declarations into a persistent schema registry and
//! inspects what is registered.

mod commands;
mod error;
mod formatter;

use clap::Parser;
use commands::Command;
use error::CliError;
use formatter::OutputFormat;
use mdschema_core::registry::DEFAULT_NAMESPACE;
use mdschema_core::{RegistryConfig, SchemaRegistry, SledStore, StoreConfig, TracingPlanSink};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// mdschema command-line client
#[derive(Parser, Debug)]
#[command(name = "mdschema")]
#[command(version, about = "Metadata-driven entity schema registry")]
pub struct Args {
    /// Registry data directory
    #[arg(short = 'd', long, default_value = "./mdschema_data")]
    pub data: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Refuse redeploys that contain breaking changes
    #[arg(long)]
    pub reject_breaking: bool,

    /// Let a different module take over an entity
    #[arg(long)]
    pub allow_owner_change: bool,

    /// Namespace for entities declared without one
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    #[command(subcommand)]
    pub command: Command,
}

fn main() {
    // Logs go to stderr so command output stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mdschema_core=info,mdschema=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<String, CliError> {
    let mut config = RegistryConfig::default()
        .allow_owner_change(args.allow_owner_change)
        .with_default_namespace(args.namespace.clone());
    if args.reject_breaking {
        config = config.reject_breaking_changes();
    }

    let store = SledStore::open(&StoreConfig::new(&args.data))?;
    let registry = SchemaRegistry::open(config, Arc::new(store), Arc::new(TracingPlanSink))?;

    let formatter = formatter::create_formatter(args.format);
    commands::execute(&registry, &args.command, &*formatter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "mdschema",
            "--data",
            "/tmp/registry",
            "--format",
            "json",
            "--reject-breaking",
            "show",
            "Patient",
        ])
        .unwrap();

        assert_eq!(args.data, PathBuf::from("/tmp/registry"));
        assert_eq!(args.format, OutputFormat::Json);
        assert!(args.reject_breaking);
        assert_eq!(args.namespace, DEFAULT_NAMESPACE);
        assert!(matches!(args.command, Command::Show { ref entity } if entity == "Patient"));
    }

    #[test]
    fn test_run_against_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let decl = dir.path().join("job.json");
        std::fs::write(&decl, r#"{"name": "Job", "owning_module": "scheduler"}"#).unwrap();
        let data = dir.path().join("data");
        let data = data.to_str().unwrap();

        let register =
            Args::try_parse_from(["mdschema", "--data", data, "register", decl.to_str().unwrap()]).unwrap();
        run(&register).unwrap();

        let list = Args::try_parse_from(["mdschema", "--data", data, "list"]).unwrap();
        let output = run(&list).unwrap();
        assert!(output.contains("Job"));
    }
}

//! Subcommand handling.

use crate::error::CliError;
use crate::formatter::{Formatter, SignatureRow};
use clap::Subcommand;
use mdschema_core::{EntityDef, SchemaRegistry};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Registry subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register entity declarations from JSON files
    Register {
        /// Files holding one declaration or an array of declarations
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List registered entities
    List,

    /// Show one entity
    Show {
        /// Entity name (case-insensitive)
        entity: String,
    },

    /// Print field and relationship signatures
    Signatures {
        /// Entity name (case-insensitive)
        entity: String,
    },

    /// Show the migration plan a declaration would produce, without committing
    Preview {
        /// File holding one declaration or an array of declarations
        file: PathBuf,
    },

    /// Remove an entity from the registry
    Remove {
        /// Entity name (case-insensitive)
        entity: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Declarations {
    Many(Vec<EntityDef>),
    One(Box<EntityDef>),
}

/// Read entity declarations from a JSON file.
pub fn load_declarations(path: &Path) -> Result<Vec<EntityDef>, CliError> {
    let content = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let declarations: Declarations =
        serde_json::from_str(&content).map_err(|source| CliError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(match declarations {
        Declarations::Many(entities) => entities,
        Declarations::One(entity) => vec![*entity],
    })
}

/// Execute a subcommand against the registry and render its output.
pub fn execute(
    registry: &SchemaRegistry,
    command: &Command,
    formatter: &dyn Formatter,
) -> Result<String, CliError> {
    match command {
        Command::Register { files } => {
            let mut output = Vec::new();
            for file in files {
                let declarations = load_declarations(file)?;
                debug!(file = %file.display(), count = declarations.len(), "registering declarations");
                for entity in declarations {
                    let result = registry.register(entity)?;
                    output.push(formatter.format_commit(&result));
                }
            }
            Ok(output.join("\n"))
        }

        Command::List => Ok(formatter.format_entities(&registry.all())),

        Command::Show { entity } => {
            let definition = registry.get(entity).ok_or_else(|| mdschema_core::Error::NotFound {
                entity: entity.clone(),
            })?;
            Ok(formatter.format_entity(&definition))
        }

        Command::Signatures { entity } => {
            let rows: Vec<SignatureRow> = registry
                .signatures(entity)?
                .into_iter()
                .map(|(name, signature)| (name, signature.map_err(|e| e.to_string())))
                .collect();
            Ok(formatter.format_signatures(entity, &rows))
        }

        Command::Preview { file } => {
            let plans = load_declarations(file)?
                .iter()
                .map(|entity| registry.preview(entity).map(|plan| formatter.format_plan(&plan)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(plans.join("\n"))
        }

        Command::Remove { entity } => {
            let removed = registry.remove_entity(entity)?;
            Ok(formatter.format_message(&format!(
                "removed {} (was version {})",
                removed.name, removed.schema_version
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{JsonFormatter, TableFormatter};
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    const CLINIC: &str = r#"[
        {"name": "Patient", "namespace": "org.acme", "owning_module": "clinic",
         "fields": [{"name": "name", "field_type": {"kind": "string"}, "required": true}]},
        {"name": "Visit", "namespace": "org.acme", "owning_module": "clinic",
         "relationships": [{"name": "patient", "owner_entity": "Visit",
                            "related_entity": "Patient", "cardinality": "one_to_many"}]}
    ]"#;

    #[test]
    fn test_register_and_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "clinic.json", CLINIC);
        let registry = SchemaRegistry::default();

        let output = execute(&registry, &Command::Register { files: vec![path] }, &TableFormatter).unwrap();
        assert!(output.contains("Created Patient at version 1"));
        assert_eq!(registry.len(), 2);

        let output = execute(
            &registry,
            &Command::Signatures {
                entity: "visit".into(),
            },
            &JsonFormatter,
        )
        .unwrap();
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json["elements"][0]["signature"], "[mLorg/acme/Patient;");
    }

    #[test]
    fn test_preview_does_not_register() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "clinic.json", CLINIC);
        let registry = SchemaRegistry::default();

        let output = execute(&registry, &Command::Preview { file: path }, &JsonFormatter).unwrap();
        assert!(output.contains("\"to_version\": 1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_single_object_declaration() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "job.json", r#"{"name": "Job", "owning_module": "scheduler"}"#);

        let declarations = load_declarations(&path).unwrap();
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].name, "Job");
    }

    #[test]
    fn test_unknown_entity() {
        let registry = SchemaRegistry::default();
        let err = execute(
            &registry,
            &Command::Show {
                entity: "Ghost".into(),
            },
            &TableFormatter,
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Registry(mdschema_core::Error::NotFound { .. })));
    }

    #[test]
    fn test_bad_json_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "bad.json", "{ not json");

        let err = load_declarations(&path).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }
}

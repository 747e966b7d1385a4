//! Output formatters for registry views.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use mdschema_core::{CommitResult, EntityDef, MigrationPlan};
use serde_json::json;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Signature lookup result for one element.
pub type SignatureRow = (String, Result<String, String>);

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format the list of registered entities.
    fn format_entities(&self, entities: &[EntityDef]) -> String;

    /// Format one entity with all of its elements.
    fn format_entity(&self, entity: &EntityDef) -> String;

    /// Format element signatures.
    fn format_signatures(&self, entity: &str, rows: &[SignatureRow]) -> String;

    /// Format a migration plan.
    fn format_plan(&self, plan: &MigrationPlan) -> String;

    /// Format the result of a commit.
    fn format_commit(&self, result: &CommitResult) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_entities(&self, entities: &[EntityDef]) -> String {
        if entities.is_empty() {
            return "No entities registered".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["Entity", "Namespace", "Module", "Version", "Fields", "Relationships"]);
        for entity in entities {
            table.add_row(vec![
                Cell::new(&entity.name),
                Cell::new(entity.namespace.as_deref().unwrap_or("-")),
                Cell::new(&entity.owning_module),
                Cell::new(entity.schema_version),
                Cell::new(entity.fields.len()),
                Cell::new(entity.relationships.len()),
            ]);
        }
        table.to_string()
    }

    fn format_entity(&self, entity: &EntityDef) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Element", "Kind", "Type", "Required", "Default", "Origin"]);

        for field in &entity.fields {
            let default = match &field.default {
                Some(value) if field.operator_default => format!("{} (operator)", value),
                Some(value) => value.to_string(),
                None => "-".to_string(),
            };
            table.add_row(vec![
                Cell::new(&field.name),
                Cell::new("field"),
                Cell::new(&field.field_type),
                Cell::new(field.required),
                Cell::new(default),
                Cell::new(origin(field.user_added)),
            ]);
        }

        for rel in &entity.relationships {
            let mut kind = rel.cardinality.to_string();
            if rel.cascade_delete {
                kind.push_str(", cascade");
            }
            if rel.bidirectional {
                kind.push_str(", bidirectional");
            }
            table.add_row(vec![
                Cell::new(&rel.name),
                Cell::new(kind),
                Cell::new(&rel.related_entity),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new(origin(rel.user_added)),
            ]);
        }

        format!(
            "{} (module {}, version {})\n{}",
            entity.name, entity.owning_module, entity.schema_version, table
        )
    }

    fn format_signatures(&self, entity: &str, rows: &[SignatureRow]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Element", "Signature"]);
        for (name, signature) in rows {
            let text = match signature {
                Ok(sig) => sig.clone(),
                Err(reason) => format!("<unresolved: {}>", reason),
            };
            table.add_row(vec![name.as_str(), text.as_str()]);
        }
        format!("{}\n{}", entity, table)
    }

    fn format_plan(&self, plan: &MigrationPlan) -> String {
        if plan.is_empty() {
            return format!("{}: no changes (version {})", plan.entity, plan.from_version);
        }
        format!("{}", plan)
    }

    fn format_commit(&self, result: &CommitResult) -> String {
        format!(
            "{:?} {} at version {}\n{}",
            result.outcome,
            result.entity.name,
            result.version(),
            self.format_plan(&result.plan)
        )
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_entities(&self, entities: &[EntityDef]) -> String {
        serde_json::to_string_pretty(entities).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_entity(&self, entity: &EntityDef) -> String {
        serde_json::to_string_pretty(entity).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_signatures(&self, entity: &str, rows: &[SignatureRow]) -> String {
        let elements: Vec<_> = rows
            .iter()
            .map(|(name, signature)| match signature {
                Ok(sig) => json!({ "element": name, "signature": sig }),
                Err(reason) => json!({ "element": name, "error": reason }),
            })
            .collect();
        serde_json::to_string_pretty(&json!({ "entity": entity, "elements": elements }))
            .unwrap_or_else(|_| "{}".to_string())
    }

    fn format_plan(&self, plan: &MigrationPlan) -> String {
        serde_json::to_string_pretty(plan).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_commit(&self, result: &CommitResult) -> String {
        serde_json::to_string_pretty(&json!({
            "entity": result.entity.name,
            "outcome": format!("{:?}", result.outcome).to_lowercase(),
            "version": result.version(),
            "plan": result.plan,
        }))
        .unwrap_or_else(|_| "{}".to_string())
    }

    fn format_message(&self, message: &str) -> String {
        json!({ "message": message }).to_string()
    }
}

fn origin(user_added: bool) -> &'static str {
    if user_added {
        "operator"
    } else {
        "module"
    }
}

//! Field definitions for entities.

use super::types::FieldType;
use chrono::{DateTime, NaiveDate};
use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};
use std::fmt;

/// A field definition within an entity.
#[derive(
    Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize,
)]
pub struct FieldDef {
    /// Field name (unique within the entity, case-insensitive).
    pub name: String,
    /// Declared data type.
    pub field_type: FieldType,
    /// Whether a value must be present on every record.
    #[serde(default)]
    pub required: bool,
    /// Default value if not provided.
    #[serde(default)]
    pub default: Option<DefaultValue>,
    /// Added by an operator after deployment rather than declared by the module.
    #[serde(default)]
    pub user_added: bool,
    /// The default value was set by an operator and survives redeploys.
    #[serde(default)]
    pub operator_default: bool,
}

/// Default value for a field.
#[derive(
    Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize,
)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DefaultValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Double(f64),
    /// Textual value (strings, decimals, dates and enum values).
    Text(String),
    /// Binary data.
    Bytes(Vec<u8>),
}

impl DefaultValue {
    /// Check this value against the validation predicate of `field_type`.
    ///
    /// Returns a human-readable reason on mismatch.
    pub fn check(&self, field_type: &FieldType) -> Result<(), String> {
        let ok = match (field_type, self) {
            (FieldType::Bool, DefaultValue::Bool(_)) => true,
            (FieldType::Int, DefaultValue::Int(v)) => i32::try_from(*v).is_ok(),
            (FieldType::Long, DefaultValue::Int(_)) => true,
            (FieldType::Double, DefaultValue::Int(_)) => true,
            (FieldType::Double, DefaultValue::Double(v)) => v.is_finite(),
            (FieldType::Decimal, DefaultValue::Int(_)) => true,
            (FieldType::Decimal, DefaultValue::Double(v)) => v.is_finite(),
            (FieldType::Decimal, DefaultValue::Text(s)) => is_decimal_literal(s),
            (FieldType::String, DefaultValue::Text(_)) => true,
            (FieldType::Date, DefaultValue::Text(s)) => {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
            }
            (FieldType::DateTime, DefaultValue::Text(s)) => DateTime::parse_from_rfc3339(s).is_ok(),
            (FieldType::Blob, DefaultValue::Bytes(_)) => true,
            (FieldType::Enum { variants }, DefaultValue::Text(s)) => variants.contains(s),
            _ => false,
        };

        if ok {
            Ok(())
        } else {
            Err(format!("{} is not a valid {} value", self, field_type))
        }
    }
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Bool(v) => write!(f, "{}", v),
            DefaultValue::Int(v) => write!(f, "{}", v),
            DefaultValue::Double(v) => write!(f, "{}", v),
            DefaultValue::Text(v) => write!(f, "{:?}", v),
            DefaultValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// `[+-]digits[.digits]`, at least one digit overall.
fn is_decimal_literal(s: &str) -> bool {
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    let mut parts = unsigned.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");
    let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());

    (!int_part.is_empty() || !frac_part.is_empty())
        && all_digits(int_part)
        && all_digits(frac_part)
}

impl FieldDef {
    /// Create a new optional field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
            user_added: false,
            operator_default: false,
        }
    }

    /// Create a required field.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: true,
            ..Self::new(name, field_type)
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark as added by an operator.
    pub fn user_added(mut self) -> Self {
        self.user_added = true;
        self
    }

    /// Check if this field has a default value.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Case-insensitive name match.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

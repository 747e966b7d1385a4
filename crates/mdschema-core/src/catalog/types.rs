//! Declared field types.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};
use std::fmt;

/// Semantic type of an entity field.
///
/// Entity references are not field types; they are declared as
/// [`RelationDef`](super::RelationDef)s.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize,
)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 64-bit floating point.
    Double,
    /// Arbitrary-precision decimal.
    Decimal,
    /// UTF-8 string.
    String,
    /// Calendar date without time.
    Date,
    /// Date and time with offset.
    DateTime,
    /// Binary data.
    Blob,
    /// A closed set of string values.
    Enum {
        /// Allowed values, in declaration order.
        variants: Vec<String>,
    },
}

impl FieldType {
    /// Create an enum field type.
    pub fn enumeration<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldType::Enum {
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Int | FieldType::Long | FieldType::Double | FieldType::Decimal
        )
    }

    /// Check if this type is temporal.
    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldType::Date | FieldType::DateTime)
    }

    /// Short lowercase tag used in log output and plan rendering.
    pub fn tag(&self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::Decimal => "decimal",
            FieldType::String => "string",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Blob => "blob",
            FieldType::Enum { .. } => "enum",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Enum { variants } => write!(f, "enum({})", variants.join(",")),
            other => f.write_str(other.tag()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_checks() {
        assert!(FieldType::Int.is_numeric());
        assert!(FieldType::Decimal.is_numeric());
        assert!(!FieldType::String.is_numeric());
        assert!(FieldType::Date.is_temporal());
        assert!(!FieldType::Blob.is_temporal());
    }

    #[test]
    fn test_display() {
        assert_eq!(FieldType::Long.to_string(), "long");
        assert_eq!(
            FieldType::enumeration(["LOW", "HIGH"]).to_string(),
            "enum(LOW,HIGH)"
        );
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_string(&FieldType::enumeration(["A"])).unwrap();
        assert_eq!(json, r#"{"kind":"enum","variants":["A"]}"#);

        let parsed: FieldType = serde_json::from_str(r#"{"kind":"date_time"}"#).unwrap();
        assert_eq!(parsed, FieldType::DateTime);
    }
}

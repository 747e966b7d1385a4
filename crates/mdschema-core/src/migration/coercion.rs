//! Safe type coercions between declared field types.
//!
//! | From       | To                       |
//! |------------|--------------------------|
//! | `int`      | `long`, `double`, `decimal` |
//! | `long`     | `decimal`                |
//! | `string`   | `blob`                   |
//! | `date`     | `datetime`               |
//! | `enum(V)`  | `enum(W)` where W ⊇ V    |
//!
//! Every other change of declared type is breaking, including `long` to
//! `double`: longs beyond 2^53 lose precision.

use crate::catalog::FieldType;
use std::collections::HashSet;

/// Classification of a declared type change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeChange {
    /// Same type.
    Identical,
    /// Existing values convert without loss.
    Safe,
    /// Existing values may not survive conversion.
    Breaking,
}

/// Classify a change from `from` to `to`.
pub fn classify(from: &FieldType, to: &FieldType) -> TypeChange {
    if from == to {
        return TypeChange::Identical;
    }

    match (from, to) {
        (FieldType::Int, FieldType::Long | FieldType::Double | FieldType::Decimal) => {
            TypeChange::Safe
        }
        (FieldType::Long, FieldType::Decimal) => TypeChange::Safe,
        (FieldType::String, FieldType::Blob) => TypeChange::Safe,
        (FieldType::Date, FieldType::DateTime) => TypeChange::Safe,

        (FieldType::Enum { variants: v1 }, FieldType::Enum { variants: v2 }) => {
            let old: HashSet<_> = v1.iter().collect();
            let new: HashSet<_> = v2.iter().collect();
            if old.is_subset(&new) {
                TypeChange::Safe
            } else {
                TypeChange::Breaking
            }
        }

        _ => TypeChange::Breaking,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical() {
        assert_eq!(classify(&FieldType::Int, &FieldType::Int), TypeChange::Identical);
    }

    #[test]
    fn test_widening_is_safe() {
        assert_eq!(classify(&FieldType::Int, &FieldType::Long), TypeChange::Safe);
        assert_eq!(classify(&FieldType::Long, &FieldType::Decimal), TypeChange::Safe);
        assert_eq!(classify(&FieldType::Date, &FieldType::DateTime), TypeChange::Safe);
        assert_eq!(classify(&FieldType::String, &FieldType::Blob), TypeChange::Safe);
    }

    #[test]
    fn test_narrowing_is_breaking() {
        assert_eq!(classify(&FieldType::Long, &FieldType::Int), TypeChange::Breaking);
        assert_eq!(classify(&FieldType::Double, &FieldType::Long), TypeChange::Breaking);
        assert_eq!(classify(&FieldType::Long, &FieldType::Double), TypeChange::Breaking);
        assert_eq!(classify(&FieldType::DateTime, &FieldType::Date), TypeChange::Breaking);
        assert_eq!(classify(&FieldType::Int, &FieldType::String), TypeChange::Breaking);
    }

    #[test]
    fn test_enum_changes() {
        let two = FieldType::enumeration(["A", "B"]);
        let three = FieldType::enumeration(["A", "B", "C"]);
        let reordered = FieldType::enumeration(["B", "A"]);

        assert_eq!(classify(&two, &three), TypeChange::Safe);
        assert_eq!(classify(&two, &reordered), TypeChange::Safe);
        assert_eq!(classify(&three, &two), TypeChange::Breaking);
        assert_eq!(classify(&two, &FieldType::String), TypeChange::Breaking);
    }
}

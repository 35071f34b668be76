//! Slot and null-sentinel mapping for row-wise wire records.
//!
//! Row-oriented results carry every value in one of three physical slots and
//! have no null bitmap. A per-type sentinel written into the slot marks a
//! missing value instead.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::error::{InteropError, Result};

/// Physical slot of a wire datum that carries a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireSlot {
    IntCol,
    RealCol,
    StrCol,
}

/// Literal value that stands for null in a given slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NullSentinel {
    Int(i64),
    Real(f64),
    Str(&'static str),
}

impl NullSentinel {
    pub fn matches_int(&self, v: i64) -> bool {
        matches!(self, Self::Int(s) if *s == v)
    }

    pub fn matches_real(&self, v: f64) -> bool {
        matches!(self, Self::Real(s) if *s == v)
    }

    pub fn matches_str(&self, v: &str) -> bool {
        matches!(self, Self::Str(s) if *s == v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeMapping {
    pub slot: WireSlot,
    pub sentinel: NullSentinel,
}

fn int(sentinel: i64) -> TypeMapping {
    TypeMapping { slot: WireSlot::IntCol, sentinel: NullSentinel::Int(sentinel) }
}

fn real(sentinel: f64) -> TypeMapping {
    TypeMapping { slot: WireSlot::RealCol, sentinel: NullSentinel::Real(sentinel) }
}

const STR: TypeMapping = TypeMapping { slot: WireSlot::StrCol, sentinel: NullSentinel::Str("") };

/// Every type name understood by the row decoder.
///
/// Floating-point nulls use the smallest positive normal value of the column
/// width, which the server never emits for a real value.
pub static TYPE_MAPPINGS: Lazy<BTreeMap<&'static str, TypeMapping>> = Lazy::new(|| {
    BTreeMap::from([
        ("BOOL", int(i8::MIN as i64)),
        ("BOOLEAN", int(i8::MIN as i64)),
        ("TINYINT", int(i8::MIN as i64)),
        ("SMALLINT", int(i16::MIN as i64)),
        ("INT", int(i32::MIN as i64)),
        ("INTEGER", int(i32::MIN as i64)),
        ("BIGINT", int(i64::MIN)),
        ("DECIMAL", int(i64::MIN)),
        ("FLOAT", real(f32::MIN_POSITIVE as f64)),
        ("DOUBLE", real(f64::MIN_POSITIVE)),
        ("TIMESTAMP", int(i64::MIN)),
        ("DATE", int(i64::MIN)),
        ("TIME", int(i64::MIN)),
        ("STR", STR),
        ("POINT", STR),
        ("LINESTRING", STR),
        ("POLYGON", STR),
        ("MULTIPOLYGON", STR),
        ("GEOMETRY", STR),
        ("GEOGRAPHY", STR),
    ])
});

/// Look up a type name. Names are matched case-insensitively.
pub fn lookup(type_name: &str) -> Result<TypeMapping> {
    let upper = type_name.trim().to_ascii_uppercase();
    TYPE_MAPPINGS
        .get(upper.as_str())
        .copied()
        .ok_or_else(|| InteropError::UnknownType(type_name.to_string()))
}

pub fn supported_types() -> impl Iterator<Item = &'static str> {
    TYPE_MAPPINGS.keys().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_total_over_supported_names() {
        assert_eq!(TYPE_MAPPINGS.len(), 20);
        for name in supported_types() {
            assert!(lookup(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup("bigint").unwrap(), lookup("BIGINT").unwrap());
        assert!(matches!(lookup("UUID"), Err(InteropError::UnknownType(_))));
    }

    #[test]
    fn slots() {
        assert_eq!(lookup("DOUBLE").unwrap().slot, WireSlot::RealCol);
        assert_eq!(lookup("TIMESTAMP").unwrap().slot, WireSlot::IntCol);
        assert_eq!(lookup("POLYGON").unwrap().slot, WireSlot::StrCol);
    }

    #[test]
    fn sentinels_are_outside_legitimate_defaults() {
        // Values a test row would plausibly carry for a non-null entry.
        let ints = [0i64, 1, -1, 42, i8::MAX as i64, i16::MAX as i64, i32::MAX as i64];
        let reals = [0.0f64, 1.0, -1.0, 3.25, f32::MAX as f64];
        let strs = ["a", " ", "POINT (0 0)"];

        for name in supported_types() {
            let mapping = lookup(name).unwrap();
            match mapping.sentinel {
                NullSentinel::Int(s) => {
                    assert!(ints.iter().all(|v| !mapping.sentinel.matches_int(*v)), "{name}");
                    assert!(s < 0 && s <= i8::MIN as i64, "{name} sentinel {s} is not extremal");
                }
                NullSentinel::Real(_) => {
                    assert!(reals.iter().all(|v| !mapping.sentinel.matches_real(*v)), "{name}");
                }
                NullSentinel::Str(s) => {
                    assert!(s.is_empty());
                    assert!(strs.iter().all(|v| !mapping.sentinel.matches_str(v)), "{name}");
                }
            }
        }
    }

    #[test]
    fn integer_sentinels_follow_column_width() {
        assert!(lookup("TINYINT").unwrap().sentinel.matches_int(-128));
        assert!(lookup("SMALLINT").unwrap().sentinel.matches_int(-32768));
        assert!(lookup("INT").unwrap().sentinel.matches_int(-2_147_483_648));
        assert!(lookup("BIGINT").unwrap().sentinel.matches_int(i64::MIN));
    }
}

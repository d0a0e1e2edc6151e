//! Typed field getters that never fail.
//!
//! Every getter reads one top-level field and converts it to the requested
//! type. A missing field, a `null` or a value of the wrong type yields `None`
//! (or the `_or_*` fallback) instead of an error.
//!
//! Numeric getters accept any numeric representation: integers as stored,
//! doubles truncated toward zero when they fit, and strings that parse as a
//! number. Booleans never coerce to numbers or strings.

use crate::firestore::api::snapshot::DocumentSnapshot;
use crate::firestore::model::{GeoPoint, Timestamp};
use crate::firestore::value::{ArrayValue, FirestoreValue, MapValue, ValueKind};

pub trait FieldAccess {
    /// Raw value of `field`, if present.
    fn field_value(&self, field: &str) -> Option<&FirestoreValue>;

    fn get_i64(&self, field: &str) -> Option<i64> {
        self.field_value(field).and_then(coerce_i64)
    }

    fn get_i64_or_zero(&self, field: &str) -> i64 {
        self.get_i64(field).unwrap_or(0)
    }

    /// `None` as well when the number does not fit in an `i32`.
    fn get_i32(&self, field: &str) -> Option<i32> {
        self.get_i64(field).and_then(|value| i32::try_from(value).ok())
    }

    fn get_i32_or_zero(&self, field: &str) -> i32 {
        self.get_i32(field).unwrap_or(0)
    }

    fn get_f64(&self, field: &str) -> Option<f64> {
        self.field_value(field).and_then(coerce_f64)
    }

    fn get_f64_or_zero(&self, field: &str) -> f64 {
        self.get_f64(field).unwrap_or(0.0)
    }

    fn get_bool(&self, field: &str) -> Option<bool> {
        match self.field_value(field)?.kind() {
            ValueKind::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    fn get_bool_or_false(&self, field: &str) -> bool {
        self.get_bool(field).unwrap_or(false)
    }

    fn get_string(&self, field: &str) -> Option<String> {
        match self.field_value(field)?.kind() {
            ValueKind::String(value) => Some(value.clone()),
            _ => None,
        }
    }

    fn get_string_or_empty(&self, field: &str) -> String {
        self.get_string(field).unwrap_or_default()
    }

    fn get_timestamp(&self, field: &str) -> Option<Timestamp> {
        match self.field_value(field)?.kind() {
            ValueKind::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    fn get_geo_point(&self, field: &str) -> Option<GeoPoint> {
        match self.field_value(field)?.kind() {
            ValueKind::GeoPoint(value) => Some(*value),
            _ => None,
        }
    }

    fn get_array(&self, field: &str) -> Option<&ArrayValue> {
        match self.field_value(field)?.kind() {
            ValueKind::Array(value) => Some(value),
            _ => None,
        }
    }

    fn get_map(&self, field: &str) -> Option<&MapValue> {
        match self.field_value(field)?.kind() {
            ValueKind::Map(value) => Some(value),
            _ => None,
        }
    }

    /// String elements of an array field; other elements are skipped.
    fn get_string_list_or_empty(&self, field: &str) -> Vec<String> {
        let Some(array) = self.get_array(field) else {
            return Vec::new();
        };
        array
            .values()
            .iter()
            .filter_map(|value| match value.kind() {
                ValueKind::String(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

impl FieldAccess for DocumentSnapshot {
    fn field_value(&self, field: &str) -> Option<&FirestoreValue> {
        self.get(field)
    }
}

impl FieldAccess for MapValue {
    fn field_value(&self, field: &str) -> Option<&FirestoreValue> {
        self.get(field)
    }
}

fn coerce_i64(value: &FirestoreValue) -> Option<i64> {
    match value.kind() {
        ValueKind::Integer(value) => Some(*value),
        ValueKind::Double(value) => truncate(*value),
        ValueKind::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| text.parse::<f64>().ok().and_then(truncate))
        }
        _ => None,
    }
}

fn coerce_f64(value: &FirestoreValue) -> Option<f64> {
    match value.kind() {
        ValueKind::Integer(value) => Some(*value as f64),
        ValueKind::Double(value) => Some(*value),
        ValueKind::String(text) => text.trim().parse::<f64>().ok().filter(|parsed| parsed.is_finite()),
        _ => None,
    }
}

// 2^63 is exactly representable; anything at or above it overflows i64.
const I64_UPPER_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn truncate(value: f64) -> Option<i64> {
    let truncated = value.trunc();
    (truncated.is_finite() && truncated >= -I64_UPPER_BOUND && truncated < I64_UPPER_BOUND).then_some(truncated as i64)
}

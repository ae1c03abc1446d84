/// Field-level comparison of two versions of a record
///
/// Geometry fields are compared structurally. Property values use loose
/// equality so that serialization artifacts (a number coming back as its
/// string form, `1` vs `1.0`, `true` vs `1`) do not register as edits.

use serde_json::Value;

use crate::types::{ChangeType, FeatureRecord};

/// Loose equality for property values, `None` meaning unset.
///
/// Unset and `null` are equal to each other and to nothing else. Numbers,
/// numeric strings and booleans are compared numerically across types; an
/// empty or blank string counts as zero. Arrays and objects compare
/// structurally and never equal a scalar.
pub fn loose_eq(a: Option<&Value>, b: Option<&Value>) -> bool {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);

    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Array(_), _) | (_, Value::Array(_)) | (Value::Object(_), _) | (_, Value::Object(_)) => a == b,
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// True if `field` holds different values in the two records
pub fn field_differs(rec1: &FeatureRecord, rec2: &FeatureRecord, field: &str) -> bool {
    let def = &rec1.def;
    if def.is_primary_geom(field) {
        rec1.geometry != rec2.geometry
    } else if def.is_secondary_geom(field) {
        rec1.secondary_geometries.get(field) != rec2.secondary_geometries.get(field)
    } else {
        !loose_eq(rec1.field_value(field), rec2.field_value(field))
    }
}

/// Names of the fields that differ between two records.
///
/// Compares `fields` when given, otherwise every field declared on `rec1`'s
/// feature type, in declaration order. `None` if either record is missing.
pub fn changed_fields(
    rec1: Option<&FeatureRecord>,
    rec2: Option<&FeatureRecord>,
    fields: Option<&[String]>,
) -> Option<Vec<String>> {
    let (rec1, rec2) = (rec1?, rec2?);

    let all_fields;
    let fields = match fields {
        Some(fields) => fields,
        None => {
            all_fields = rec1.def.field_names();
            &all_fields
        }
    };

    Some(
        fields
            .iter()
            .filter(|field| field_differs(rec1, rec2, field))
            .cloned()
            .collect(),
    )
}

/// How `rec` differs from `base`; `None` means no change
pub fn change_type(base: Option<&FeatureRecord>, rec: Option<&FeatureRecord>) -> Option<ChangeType> {
    match (base, rec) {
        (None, None) => None,
        (None, Some(_)) => Some(ChangeType::Insert),
        (Some(_), None) => Some(ChangeType::Delete),
        (Some(base), Some(rec)) => {
            let changed = changed_fields(Some(base), Some(rec), None).unwrap_or_default();
            if changed.is_empty() {
                None
            } else {
                Some(ChangeType::Update)
            }
        }
    }
}

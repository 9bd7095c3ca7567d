//! Input record flattening.
//!
//! Order-capture parameters arrive as nested objects
//! (`{"WYMIAROWANIE_SLOPOW": {"TYP": "TYP19", "WYM_B": 1000}}`) mixed with
//! UI metadata keys. Both learning and translation operate on the flat form:
//! nested fields become `PARENT.CHILD` keys, the parent key itself is kept
//! with a null value, and metadata keys are dropped.

use serde_json::Value;

use super::value::Record;

/// Key suffixes that mark UI metadata rather than order parameters.
///
/// Order matters: the longer `_ALIAS___DESCRIPTION` must be checked before
/// its `___DESCRIPTION` suffix.
pub const METADATA_SUFFIXES: &[&str] = &[
    "_ALIAS___DESCRIPTION",
    "___DESCRIPTION",
    "___TITLE",
    "___VISIBLE",
    "___DICT",
    "_ALIAS",
];

/// Separator between a parent key and its nested field.
pub const PATH_SEPARATOR: char = '.';

/// Whether a key carries UI metadata.
pub fn is_metadata_key(key: &str) -> bool {
    METADATA_SUFFIXES.iter().any(|suffix| key.ends_with(suffix))
}

/// Flatten a parameter record.
///
/// Already-flat records pass through unchanged apart from metadata removal,
/// so flattening is idempotent.
pub fn flatten_parameters(params: &Record) -> Record {
    let mut flat = Record::new();
    flatten_into(&mut flat, None, params);
    flat
}

fn flatten_into(flat: &mut Record, prefix: Option<&str>, params: &Record) {
    for (key, value) in params {
        if is_metadata_key(key) {
            continue;
        }

        let path = match prefix {
            Some(parent) => format!("{parent}{PATH_SEPARATOR}{key}"),
            None => key.clone(),
        };

        match value {
            Value::Object(children) => {
                flat.insert(path.clone(), Value::Null);
                flatten_into(flat, Some(&path), children);
            }
            other => {
                flat.insert(path, other.clone());
            }
        }
    }
}

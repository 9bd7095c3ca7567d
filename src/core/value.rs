//! Scalar value handling shared by learning and translation.
//!
//! Records are JSON objects whose values come from two very different
//! sources: typed JSON order documents (`985.0`, `true`) and untyped
//! `KEY=VAL` strings from the training spreadsheets (`"985"`). Comparisons
//! therefore go through a canonical text form so that `985`, `985.0` and
//! `"985"` are the same value.

use serde_json::{Map, Number, Value};

/// A flat or nested parameter record, in insertion order.
pub type Record = Map<String, Value>;

/// Canonical text of a scalar value.
///
/// Returns `None` for null, arrays and objects. Strings are trimmed; whole
/// floats render without a fractional part.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(number_text(n)),
        Value::String(s) => Some(s.trim().to_string()),
    }
}

fn number_text(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Numeric interpretation of a scalar, if it has one.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Build a JSON number, preferring an integer when the value is whole.
pub fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        Value::Number(Number::from(f as i64))
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Whether an input value counts as absent.
///
/// Null, non-scalars and any of the configured null tokens are absent.
pub fn is_absent_input(value: &Value, null_tokens: &[String]) -> bool {
    match scalar_text(value) {
        None => true,
        Some(text) => null_tokens.iter().any(|t| t.trim() == text),
    }
}

/// Whether a training output value counts as absent (`""`, `"-"` or null).
pub fn is_blank_output(value: &Value) -> bool {
    match scalar_text(value) {
        None => true,
        Some(text) => text.is_empty() || text == "-",
    }
}

/// Case-insensitive key lookup, preferring an exact match.
pub fn get_key<'a>(record: &'a Record, key: &str) -> Option<&'a Value> {
    record.get(key).or_else(|| {
        let wanted = key.to_lowercase();
        record
            .iter()
            .find(|(k, _)| k.to_lowercase() == wanted)
            .map(|(_, v)| v)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_text_normalizes_numbers() {
        assert_eq!(scalar_text(&json!(985)), Some("985".to_string()));
        assert_eq!(scalar_text(&json!(985.0)), Some("985".to_string()));
        assert_eq!(scalar_text(&json!(98.5)), Some("98.5".to_string()));
        assert_eq!(scalar_text(&json!(" 985 ")), Some("985".to_string()));
        assert_eq!(scalar_text(&json!(true)), Some("true".to_string()));
    }

    #[test]
    fn test_scalar_text_rejects_structures() {
        assert_eq!(scalar_text(&Value::Null), None);
        assert_eq!(scalar_text(&json!({"TYP": "TYP19"})), None);
        assert_eq!(scalar_text(&json!([1, 2])), None);
    }

    #[test]
    fn test_numeric() {
        assert_eq!(numeric(&json!(985)), Some(985.0));
        assert_eq!(numeric(&json!("98.5")), Some(98.5));
        assert_eq!(numeric(&json!("biały")), None);
        assert_eq!(numeric(&json!("NaN")), None);
        assert_eq!(numeric(&Value::Null), None);
    }

    #[test]
    fn test_number_value() {
        assert_eq!(number_value(98.5), json!(98.5));
        assert_eq!(number_value(209.0), json!(209));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }

    #[test]
    fn test_absent_input() {
        let tokens = vec![String::new(), "<NULL>".to_string(), "None".to_string()];
        assert!(is_absent_input(&Value::Null, &tokens));
        assert!(is_absent_input(&json!("  "), &tokens));
        assert!(is_absent_input(&json!("<NULL>"), &tokens));
        assert!(is_absent_input(&json!({"a": 1}), &tokens));
        assert!(!is_absent_input(&json!("0"), &tokens));
        assert!(!is_absent_input(&json!(0), &tokens));
    }

    #[test]
    fn test_blank_output() {
        assert!(is_blank_output(&json!("-")));
        assert!(is_blank_output(&json!("")));
        assert!(is_blank_output(&Value::Null));
        assert!(!is_blank_output(&json!("SS")));
    }

    #[test]
    fn test_get_key_case_insensitive_fallback() {
        let mut record = Record::new();
        record.insert("Szerokosc".to_string(), json!(985));
        record.insert("KOLOR".to_string(), json!("white"));

        assert_eq!(get_key(&record, "KOLOR"), Some(&json!("white")));
        assert_eq!(get_key(&record, "SZEROKOSC"), Some(&json!(985)));
        assert_eq!(get_key(&record, "WYSOKOSC"), None);
    }
}

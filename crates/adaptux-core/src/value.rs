//! Comparison helpers over `serde_json::Value`
//!
//! Rule conditions compare loosely typed values the same way a dynamic
//! runtime would: ordering operators coerce both sides to numbers, equality
//! operators do not coerce at all.

use serde_json::Value;

/// Coerce a value to a number for ordering comparisons
///
/// `None` (a missing key) and anything without a numeric reading give `NaN`,
/// which makes every ordering comparison false.
pub fn to_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_numeric(s),
        Some(Value::Array(_) | Value::Object(_)) => f64::NAN,
    }
}

fn parse_numeric(s: &str) -> f64 {
    let trimmed = s.trim();
    match trimmed {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        // `str::parse` also accepts "inf" and "nan", which are not numeric text here
        _ if trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) =>
        {
            trimmed.parse().unwrap_or(f64::NAN)
        }
        _ => f64::NAN,
    }
}

/// Strict equality: same kind and same value, no coercion
///
/// Numbers compare by numeric value (`1` equals `1.0`). Arrays and objects
/// never compare equal, since condition literals are never the same instance
/// as a stored value. A missing key equals nothing.
pub fn strict_equals(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

/// Structural equality used by the deduplicating sinks
///
/// Like [`strict_equals`] for scalars, but arrays and objects compare by content.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| same_value(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, l)| y.get(k).is_some_and(|r| same_value(l, r)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_number_coercions() {
        assert_eq!(to_number(Some(&json!(0.3))), 0.3);
        assert_eq!(to_number(Some(&json!(true))), 1.0);
        assert_eq!(to_number(Some(&json!(false))), 0.0);
        assert_eq!(to_number(Some(&json!(null))), 0.0);
        assert_eq!(to_number(Some(&json!(" 42 "))), 42.0);
        assert_eq!(to_number(Some(&json!(""))), 0.0);
        assert_eq!(to_number(Some(&json!("1e3"))), 1000.0);
        assert_eq!(to_number(Some(&json!("-Infinity"))), f64::NEG_INFINITY);
    }

    #[test]
    fn test_to_number_nan_cases() {
        assert!(to_number(None).is_nan());
        assert!(to_number(Some(&json!("abc"))).is_nan());
        assert!(to_number(Some(&json!("inf"))).is_nan());
        assert!(to_number(Some(&json!("nan"))).is_nan());
        assert!(to_number(Some(&json!([1]))).is_nan());
        assert!(to_number(Some(&json!({"a": 1}))).is_nan());
    }

    #[test]
    fn test_strict_equals() {
        assert!(strict_equals(Some(&json!(1)), &json!(1.0)));
        assert!(strict_equals(Some(&json!("a")), &json!("a")));
        assert!(strict_equals(Some(&json!(null)), &json!(null)));
        assert!(!strict_equals(Some(&json!(1)), &json!("1")));
        assert!(!strict_equals(Some(&json!(true)), &json!(1)));
        assert!(!strict_equals(Some(&json!({})), &json!({})));
        assert!(!strict_equals(None, &json!(null)));
    }

    #[test]
    fn test_same_value_is_structural() {
        assert!(same_value(&json!({"a": [1, 2.0]}), &json!({"a": [1.0, 2]})));
        assert!(!same_value(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!same_value(&json!("v1"), &json!("v2")));
    }
}

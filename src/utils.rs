use serde_json::Value;

pub mod position_formatter;

/// Numeric coercion with the loose rules layouts rely on: numbers, numeric strings
/// and booleans convert; everything else is not a number.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Builds a JSON number, mapping non-finite values to `null`.
pub fn number_value(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Like [`number_value`], but whole numbers are stored as integers.
pub fn integral_value(value: f64) -> Value {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        number_value(value)
    }
}

/// Renders a value as display text. Integral floats print without a fractional part.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) => format!("{}", f),
            _ => n.to_string(),
        },
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Truthiness used by template conditionals and match predicates.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Equality that treats numerically equal numbers as equal regardless of representation.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_string_integral_float() {
        assert_eq!(display_string(&json!(10.0)), "10");
        assert_eq!(display_string(&json!(-2.5)), "-2.5");
        assert_eq!(display_string(&json!("abc")), "abc");
    }

    #[test]
    fn test_as_number() {
        assert_eq!(as_number(&json!("12")), Some(12.0));
        assert_eq!(as_number(&json!(" ")), None);
        assert_eq!(as_number(&json!(null)), None);
    }
}

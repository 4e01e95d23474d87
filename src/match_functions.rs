//! Binary predicates used by data layer `filters`.

use crate::registry::Registry;
use crate::utils::{as_number, display_string, strict_equals};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;

pub type MatchFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;
pub type MatchRegistry = Registry<MatchFn>;

fn match_fn<F>(f: F) -> MatchFn
where
    F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn builtin_match_functions() -> MatchRegistry {
    let mut registry = Registry::new("match functions");
    let builtins: [(&str, MatchFn); 9] = [
        ("=", match_fn(strict_equals)),
        ("!=", match_fn(|a, b| !loose_equals(a, b))),
        ("<", match_fn(|a, b| compare(a, b) == Some(Ordering::Less))),
        ("<=", match_fn(|a, b| matches!(compare(a, b), Some(Ordering::Less | Ordering::Equal)))),
        (">", match_fn(|a, b| compare(a, b) == Some(Ordering::Greater))),
        (">=", match_fn(|a, b| matches!(compare(a, b), Some(Ordering::Greater | Ordering::Equal)))),
        ("%", match_fn(remainder)),
        ("in", match_fn(|a, b| contains(b, a))),
        ("match", match_fn(contains)),
    ];
    for (name, f) in builtins {
        let _ = registry.add(name, f, true);
    }
    registry
}

/// Weak equality: `null` only equals `null`, numbers compare with numeric strings.
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(_) | Value::Bool(_), _) | (_, Value::Number(_) | Value::Bool(_)) => {
            match (as_number(a), as_number(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => as_number(a)?.partial_cmp(&as_number(b)?),
    }
}

fn remainder(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => {
            let r = x % y;
            r != 0.0 && !r.is_nan()
        }
        _ => false,
    }
}

/// Containment: arrays hold the element, strings hold the substring.
fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| strict_equals(item, needle)),
        Value::String(s) if !s.is_empty() => s.contains(display_string(needle).as_str()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(op: &str, a: Value, b: Value) -> bool {
        let registry = builtin_match_functions();
        let f = registry.get(op).unwrap();
        f(&a, &b)
    }

    #[test]
    fn test_loose_inequality() {
        assert!(!check("!=", json!(null), json!(null)));
        assert!(!check("!=", json!(5), json!("5")));
        assert!(check("!=", json!("a"), json!(null)));
        assert!(check("=", json!(5), json!(5.0)));
        assert!(!check("=", json!(5), json!("5")));
    }

    #[test]
    fn test_containment() {
        assert!(check("in", json!("b"), json!(["a", "b"])));
        assert!(check("match", json!("HLA-DRB1"), json!("HLA")));
        assert!(!check("match", json!(null), json!("HLA")));
    }

    #[test]
    fn test_ordering_and_remainder() {
        assert!(check("<", json!(1), json!(2)));
        assert!(check(">=", json!(2), json!(2)));
        assert!(check("%", json!(5), json!(2)));
        assert!(!check("%", json!(4), json!(2)));
    }
}

//! Scale functions map a data value to a rendered value (colour, shape, size).
//!
//! Layout directives take one of three forms:
//! - a plain value, used as-is;
//! - `{field?, scale_function, parameters}`, applying a registered function;
//! - an array of directives, where the first non-null result wins.

use crate::data_types::Record;
use crate::error::{PlotError, Result};
use crate::field::Field;
use crate::registry::{Registries, Registry};
use crate::utils::{as_number, display_string, is_truthy, number_value, strict_equals};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub type ScaleFn = Arc<dyn Fn(&ScaleParameters, &Value, Option<usize>) -> Result<Value> + Send + Sync>;
pub type ScaleRegistry = Registry<ScaleFn>;

const DEFAULT_MAX_CACHE_SIZE: usize = 500;

/// Parameters of one scale directive. Carries the memo used by `stable_choice`;
/// the memo lives as long as the directive that owns these parameters.
#[derive(Debug, Default)]
pub struct ScaleParameters {
    values: Map<String, Value>,
    cache: Mutex<HashMap<String, Value>>,
}

impl Clone for ScaleParameters {
    fn clone(&self) -> Self {
        Self::new(self.values.clone())
    }
}

impl ScaleParameters {
    pub fn new(values: Map<String, Value>) -> Self {
        Self {
            values,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_value(value: &Value) -> Self {
        Self::new(value.as_object().cloned().unwrap_or_default())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    fn array(&self, key: &str) -> &[Value] {
        self.values
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `null_value` when it is set to something truthy, else `null`.
    fn null_value(&self) -> Value {
        match self.values.get("null_value") {
            Some(v) if is_truthy(Some(v)) => v.clone(),
            _ => Value::Null,
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}

fn scale_fn<F>(f: F) -> ScaleFn
where
    F: Fn(&ScaleParameters, &Value, Option<usize>) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn builtin_scale_functions() -> ScaleRegistry {
    let mut registry = Registry::new("scale functions");
    let builtins: [(&str, ScaleFn); 7] = [
        ("if", scale_fn(if_value)),
        ("numerical_bin", scale_fn(numerical_bin)),
        ("categorical_bin", scale_fn(categorical_bin)),
        ("ordinal_cycle", scale_fn(ordinal_cycle)),
        ("stable_choice", scale_fn(stable_choice)),
        ("interpolate", scale_fn(interpolate)),
        ("effect_direction", scale_fn(effect_direction)),
    ];
    for (name, f) in builtins {
        let _ = registry.add(name, f, true);
    }
    registry
}

pub fn if_value(params: &ScaleParameters, value: &Value, _index: Option<usize>) -> Result<Value> {
    let matches = params
        .get("field_value")
        .is_some_and(|expected| strict_equals(expected, value));
    let key = if matches { "then" } else { "else" };
    Ok(params.get(key).cloned().unwrap_or(Value::Null))
}

pub fn numerical_bin(params: &ScaleParameters, value: &Value, _index: Option<usize>) -> Result<Value> {
    let breaks: Vec<f64> = params.array("breaks").iter().filter_map(as_number).collect();
    let values = params.array("values");
    let Some(input) = as_number(value) else {
        return Ok(params.null_value());
    };
    if breaks.is_empty() {
        return Ok(Value::Null);
    }
    // Below the first break falls into the first bin; the last bin is open upward.
    let bin = breaks
        .windows(2)
        .position(|w| input < w[1])
        .unwrap_or(breaks.len() - 1);
    Ok(values.get(bin).cloned().unwrap_or(Value::Null))
}

pub fn categorical_bin(params: &ScaleParameters, value: &Value, _index: Option<usize>) -> Result<Value> {
    let categories = params.array("categories");
    match categories.iter().position(|c| strict_equals(c, value)) {
        Some(idx) => Ok(params.array("values").get(idx).cloned().unwrap_or(Value::Null)),
        None => Ok(params.null_value()),
    }
}

pub fn ordinal_cycle(params: &ScaleParameters, _value: &Value, index: Option<usize>) -> Result<Value> {
    let values = params.array("values");
    if values.is_empty() {
        return Ok(Value::Null);
    }
    Ok(values[index.unwrap_or(0) % values.len()].clone())
}

/// 32-bit string hash over UTF-16 code units, `h = h * 31 + c` with wrapping.
pub fn string_hash(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |h, unit| (h << 5).wrapping_sub(h).wrapping_add(unit as i32))
}

pub fn stable_choice(params: &ScaleParameters, value: &Value, _index: Option<usize>) -> Result<Value> {
    let key = display_string(value);
    let max_cache_size = params
        .get("max_cache_size")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_MAX_CACHE_SIZE);
    let mut cache = params.cache.lock();
    if let Some(hit) = cache.get(&key) {
        return Ok(hit.clone());
    }
    let options = params.array("values");
    if options.is_empty() {
        return Ok(Value::Null);
    }
    let idx = (string_hash(&key) as i64).unsigned_abs() as usize % options.len();
    let result = options[idx].clone();
    if cache.len() >= max_cache_size {
        cache.clear();
    }
    cache.insert(key, result.clone());
    Ok(result)
}

fn parse_hex_color(text: &str) -> Option<[f64; 3]> {
    let hex = text.strip_prefix('#').filter(|h| h.is_ascii())?;
    let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(f64::from);
    match hex.len() {
        6 => Some([channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?]),
        3 => {
            let short = |i: usize| channel(&hex[i..i + 1].repeat(2));
            Some([short(0)?, short(1)?, short(2)?])
        }
        _ => None,
    }
}

fn parse_rgb_color(text: &str) -> Option<[f64; 3]> {
    let inner = text.trim().strip_prefix("rgb(")?.strip_suffix(')')?;
    let mut parts = inner.split(',').map(|p| p.trim().parse::<f64>().ok());
    Some([parts.next()??, parts.next()??, parts.next()??])
}

fn parse_color(value: &Value) -> Option<[f64; 3]> {
    let text = value.as_str()?;
    parse_hex_color(text).or_else(|| parse_rgb_color(text))
}

/// Interpolates numbers linearly and colours channel-wise in RGB. Other values
/// switch from `a` to `b` halfway.
pub fn interpolate_values(a: &Value, b: &Value, t: f64) -> Value {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return number_value(x + (y - x) * t);
    }
    if let (Some(ca), Some(cb)) = (parse_color(a), parse_color(b)) {
        let mix = |i: usize| (ca[i] + (cb[i] - ca[i]) * t).round().clamp(0.0, 255.0) as u8;
        return Value::String(format!("rgb({}, {}, {})", mix(0), mix(1), mix(2)));
    }
    if t < 0.5 {
        a.clone()
    } else {
        b.clone()
    }
}

pub fn interpolate(params: &ScaleParameters, value: &Value, _index: Option<usize>) -> Result<Value> {
    let breaks: Vec<f64> = params.array("breaks").iter().filter_map(as_number).collect();
    let values = params.array("values");
    let null_value = params.null_value();
    if breaks.len() < 2 || breaks.len() != values.len() {
        return Ok(null_value);
    }
    let Some(input) = as_number(value) else {
        return Ok(null_value);
    };
    let last = breaks.len() - 1;
    if input <= breaks[0] {
        return Ok(values[0].clone());
    }
    if input >= breaks[last] {
        return Ok(values[last].clone());
    }
    let Some(upper) = (1..breaks.len())
        .rev()
        .find(|&i| breaks[i - 1] <= input && input <= breaks[i])
    else {
        return Ok(null_value);
    };
    let t = (input - breaks[upper - 1]) / (breaks[upper] - breaks[upper - 1]);
    if !t.is_finite() {
        return Ok(null_value);
    }
    Ok(interpolate_values(&values[upper - 1], &values[upper], t))
}

pub fn effect_direction(params: &ScaleParameters, value: &Value, _index: Option<usize>) -> Result<Value> {
    let beta_field = params.get("beta_field").and_then(Value::as_str);
    let stderr_field = params.get("stderr_beta_field").and_then(Value::as_str);
    let (Some(beta_field), Some(stderr_field)) = (beta_field, stderr_field) else {
        return Err(PlotError::InvalidParameters(
            "effect_direction must specify how to find required 'beta' and 'stderr_beta' fields"
                .into(),
        ));
    };
    let choice = |key: &str| params.get(key).cloned().unwrap_or(Value::Null);
    let Some(beta) = value.get(beta_field).and_then(as_number) else {
        return Ok(Value::Null);
    };
    match value.get(stderr_field).and_then(as_number) {
        Some(se) if beta - 1.96 * se > 0.0 => Ok(choice("+")),
        Some(se) if beta + 1.96 * se < 0.0 => Ok(choice("-")),
        Some(_) => Ok(Value::Null),
        None if beta > 0.0 => Ok(choice("+")),
        None if beta < 0.0 => Ok(choice("-")),
        None => Ok(Value::Null),
    }
}

/// A parsed scalable layout option (colour, shape, size, ...).
#[derive(Debug, Clone)]
pub enum ScalableDirective {
    Constant(Value),
    Scaled {
        field: Option<Field>,
        function: String,
        parameters: ScaleParameters,
    },
    Chain(Vec<ScalableDirective>),
}

impl ScalableDirective {
    /// Parses a directive, validating field references and scale function names.
    pub fn parse(option: &Value, registries: &Registries) -> Result<Self> {
        match option {
            Value::Array(items) => Ok(Self::Chain(
                items
                    .iter()
                    .map(|item| Self::parse(item, registries))
                    .collect::<Result<_>>()?,
            )),
            Value::Object(map) if map.contains_key("scale_function") => {
                let function = map
                    .get("scale_function")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                registries.scale_functions.get(&function)?;
                let field = match map.get("field").and_then(Value::as_str) {
                    Some(name) => Some(Field::parse(name, &registries.transforms)?),
                    None => None,
                };
                Ok(Self::Scaled {
                    field,
                    function,
                    parameters: ScaleParameters::from_value(
                        map.get("parameters").unwrap_or(&Value::Null),
                    ),
                })
            }
            other => Ok(Self::Constant(other.clone())),
        }
    }

    /// Resolves the directive for one record. With a `field`, the function receives
    /// the field's value; without one it receives the whole record.
    pub fn resolve(&self, record: &mut Record, index: usize, registry: &ScaleRegistry) -> Result<Value> {
        match self {
            Self::Constant(v) => Ok(v.clone()),
            Self::Chain(items) => {
                for item in items {
                    let v = item.resolve(record, index, registry)?;
                    if !v.is_null() {
                        return Ok(v);
                    }
                }
                Ok(Value::Null)
            }
            Self::Scaled {
                field,
                function,
                parameters,
            } => {
                let f = registry.get(function)?;
                let input = match field {
                    Some(field) => field.resolve(record, None).unwrap_or(Value::Null),
                    None => Value::Object(record.clone()),
                };
                f(parameters, &input, Some(index))
            }
        }
    }
}

/// Parses and resolves a scalable option in one step, for callers without a cached directive.
pub fn resolve_scalable(option: &Value, record: &mut Record, index: usize, registries: &Registries) -> Result<Value> {
    ScalableDirective::parse(option, registries)?.resolve(record, index, &registries.scale_functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: Value) -> ScaleParameters {
        ScaleParameters::from_value(&v)
    }

    #[test]
    fn test_string_hash_matches_reference_values() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("ab"), 97 * 31 + 98);
    }

    #[test]
    fn test_stable_choice_cache_clears_on_overflow() {
        let p = params(json!({"values": ["a", "b", "c"], "max_cache_size": 2}));
        let first = stable_choice(&p, &json!("x"), None).unwrap();
        stable_choice(&p, &json!("y"), None).unwrap();
        assert_eq!(p.cache_len(), 2);
        stable_choice(&p, &json!("z"), None).unwrap();
        assert_eq!(p.cache_len(), 1);
        assert_eq!(stable_choice(&p, &json!("x"), None).unwrap(), first);
    }

    #[test]
    fn test_interpolate_colors() {
        let p = params(json!({"breaks": [0, 10], "values": ["#000000", "#ffffff"]}));
        assert_eq!(interpolate(&p, &json!(5), None).unwrap(), json!("rgb(128, 128, 128)"));
    }

    #[test]
    fn test_interpolate_non_ascii_hex_steps_instead_of_mixing() {
        let p = params(json!({"breaks": [0, 10], "values": ["#éa", "#000"]}));
        assert_eq!(interpolate(&p, &json!(2), None).unwrap(), json!("#éa"));
        assert_eq!(interpolate(&p, &json!(5), None).unwrap(), json!("#000"));
        assert_eq!(parse_hex_color("#ééé"), None);
        assert_eq!(parse_hex_color("#0f0"), Some([0.0, 255.0, 0.0]));
    }

    #[test]
    fn test_effect_direction_upper_bound_at_zero_is_null() {
        let p = params(json!({"beta_field": "b", "stderr_beta_field": "se", "+": "up", "-": "down"}));
        assert_eq!(effect_direction(&p, &json!({"b": -1.96, "se": 1.0}), None).unwrap(), Value::Null);
        assert_eq!(effect_direction(&p, &json!({"b": -2.0, "se": 1.0}), None).unwrap(), json!("down"));
        assert_eq!(effect_direction(&p, &json!({"b": 3.0}), None).unwrap(), json!("up"));
    }
}

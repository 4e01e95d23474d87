//! Field references: `[namespace:]field_name[|transform]*`.
//!
//! A `Field` is parsed once and then resolved against many records. Transformed
//! results are written back onto the record under the full reference so that the
//! pipeline runs at most once per record.

use crate::data_types::Record;
use crate::error::{PlotError, Result};
use crate::registry::Registry;
use crate::utils::{as_number, display_string, is_truthy, number_value};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::f64::consts::LN_10;
use tracing::warn;

pub type TransformFn = fn(&Value) -> Value;
pub type TransformRegistry = Registry<TransformFn>;

static BUILTIN_TRANSFORMS: Lazy<TransformRegistry> = Lazy::new(builtin_transforms);

pub fn builtin_transforms() -> TransformRegistry {
    let mut registry = Registry::new("transformations");
    let builtins: [(&str, TransformFn); 7] = [
        ("log10", log10),
        ("neglog10", neglog10),
        ("scinotation", scinotation),
        ("logtoscinotation", logtoscinotation),
        ("htmlescape", htmlescape),
        ("urlencode", urlencode),
        ("is_numeric", is_numeric),
    ];
    for (name, transform) in builtins {
        // Names are unique, so the first registration cannot collide.
        let _ = registry.add(name, transform, true);
    }
    registry
}

#[derive(Clone)]
pub struct Field {
    pub full_name: String,
    pub field_name: String,
    transformations: Vec<(String, TransformFn)>,
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("full_name", &self.full_name)
            .field("field_name", &self.field_name)
            .field("transformations", &self.transformation_names())
            .finish()
    }
}

impl Field {
    /// Parses a reference using the built-in transformations.
    pub fn new(reference: &str) -> Result<Self> {
        Self::parse(reference, &BUILTIN_TRANSFORMS)
    }

    pub fn parse(reference: &str, transforms: &TransformRegistry) -> Result<Self> {
        let mut parts = reference.split('|');
        let field_name = parts.next().unwrap_or_default().trim();
        if !is_valid_field_name(field_name) {
            return Err(PlotError::InvalidLayout(format!(
                "Invalid field specifier: '{}'",
                reference
            )));
        }
        let mut transformations = Vec::new();
        for name in parts {
            let transform = transforms
                .get(name)
                .map_err(|_| PlotError::UnknownTransform(name.to_string()))?;
            transformations.push((name.to_string(), *transform));
        }
        Ok(Self {
            full_name: reference.to_string(),
            field_name: field_name.to_string(),
            transformations,
        })
    }

    pub fn transformation_names(&self) -> Vec<&str> {
        self.transformations.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Name without its `namespace:` prefix.
    pub fn bare_name(&self) -> &str {
        self.field_name
            .split_once(':')
            .map(|(_, name)| name)
            .unwrap_or(&self.field_name)
    }

    fn raw_value(&self, record: &Record, annotations: Option<&Record>) -> Option<Value> {
        if let Some(value) = record.get(&self.field_name) {
            return Some(value.clone());
        }
        let annotations = annotations?;
        annotations
            .get(&self.field_name)
            .or_else(|| annotations.get(self.bare_name()))
            .cloned()
    }

    /// Resolves the field against a record, caching the transformed result on it.
    /// Returns `None` when the field is absent from both the record and annotations.
    pub fn resolve(&self, record: &mut Record, annotations: Option<&Record>) -> Option<Value> {
        if let Some(cached) = record.get(&self.full_name) {
            return Some(cached.clone());
        }
        let raw = self.raw_value(record, annotations)?;
        let value = self
            .transformations
            .iter()
            .fold(raw, |acc, (_, transform)| transform(&acc));
        record.insert(self.full_name.clone(), value.clone());
        Some(value)
    }

    /// Resolution without writing the cache, for callers holding a shared record.
    pub fn peek(&self, record: &Record, annotations: Option<&Record>) -> Option<Value> {
        if let Some(cached) = record.get(&self.full_name) {
            return Some(cached.clone());
        }
        let raw = self.raw_value(record, annotations)?;
        Some(
            self.transformations
                .iter()
                .fold(raw, |acc, (_, transform)| transform(&acc)),
        )
    }
}

fn is_valid_field_name(name: &str) -> bool {
    let is_word = |s: &str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    };
    match name.split_once(':') {
        Some((namespace, field)) => is_word(namespace) && is_word(field),
        None => is_word(name),
    }
}

fn log10(value: &Value) -> Value {
    match as_number(value) {
        Some(x) if x > 0.0 => number_value(x.ln() / LN_10),
        _ => Value::Null,
    }
}

fn neglog10(value: &Value) -> Value {
    match as_number(value) {
        Some(x) if x > 0.0 => number_value(-x.ln() / LN_10),
        _ => Value::Null,
    }
}

fn scinotation(value: &Value) -> Value {
    let x = match value {
        Value::Null => return Value::Null,
        Value::String(s) if s.is_empty() => return value.clone(),
        other => match as_number(other) {
            Some(x) => x,
            None => return value.clone(),
        },
    };
    if x == 0.0 {
        return Value::String("0".into());
    }
    let abs = x.abs();
    let exponent = if abs > 1.0 {
        (abs.ln() / LN_10).ceil()
    } else {
        (abs.ln() / LN_10).floor()
    };
    if exponent.abs() <= 3.0 {
        Value::String(format!("{:.3}", x))
    } else {
        Value::String(format!("{:.2e}", x).replace('e', " × 10^"))
    }
}

fn logtoscinotation(value: &Value) -> Value {
    let x = match as_number(value) {
        Some(x) => x,
        None => return Value::String("NaN".into()),
    };
    if x == 0.0 {
        return Value::String("1".into());
    }
    let exponent = x.ceil();
    let base = 10f64.powf(exponent - x);
    let text = if exponent == 1.0 {
        format!("{:.4}", base / 10.0)
    } else if exponent == 2.0 {
        format!("{:.3}", base / 100.0)
    } else {
        format!("{:.2} × 10^-{}", base, exponent)
    };
    Value::String(text)
}

fn htmlescape(value: &Value) -> Value {
    let text = display_string(value);
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\'' => escaped.push_str("&#039;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '`' => escaped.push_str("&#x60;"),
            other => escaped.push(other),
        }
    }
    Value::String(escaped)
}

fn urlencode(value: &Value) -> Value {
    let text = display_string(value);
    let mut encoded = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => encoded.push(byte as char),
            other => encoded.push_str(&format!("%{:02X}", other)),
        }
    }
    Value::String(encoded)
}

fn is_numeric(value: &Value) -> Value {
    Value::Bool(value.is_number())
}

enum TemplateNode {
    Text(String),
    Value(String),
    Conditional {
        field: String,
        negate: bool,
        then: Vec<TemplateNode>,
        otherwise: Vec<TemplateNode>,
    },
}

enum Tag<'a> {
    Value(&'a str),
    If(&'a str, bool),
    Else,
    EndIf,
}

fn classify_tag(inner: &str) -> Tag<'_> {
    let inner = inner.trim();
    if let Some(cond) = inner.strip_prefix("#if ") {
        let cond = cond.trim();
        match cond.strip_prefix('!') {
            Some(negated) => Tag::If(negated.trim(), true),
            None => Tag::If(cond, false),
        }
    } else if inner == "#else" {
        Tag::Else
    } else if inner == "/if" {
        Tag::EndIf
    } else {
        Tag::Value(inner)
    }
}

/// Parses until the end of input or a closing tag; returns the nodes and the
/// terminating tag (`Some(true)` for `#else`, `Some(false)` for `/if`).
/// Outside any `#if` block, closing tags are kept as literal text.
fn parse_nodes(template: &str, pos: &mut usize, nested: bool) -> (Vec<TemplateNode>, Option<bool>) {
    let mut nodes = Vec::new();
    while *pos < template.len() {
        let rest = &template[*pos..];
        let Some(open) = rest.find("{{") else {
            nodes.push(TemplateNode::Text(rest.to_string()));
            *pos = template.len();
            break;
        };
        let Some(close) = rest[open..].find("}}") else {
            nodes.push(TemplateNode::Text(rest.to_string()));
            *pos = template.len();
            break;
        };
        if open > 0 {
            nodes.push(TemplateNode::Text(rest[..open].to_string()));
        }
        let inner = &rest[open + 2..open + close];
        *pos += open + close + 2;
        match classify_tag(inner) {
            Tag::Value(name) => nodes.push(TemplateNode::Value(name.to_string())),
            Tag::If(field, negate) => {
                let (then, terminator) = parse_nodes(template, pos, true);
                let otherwise = if terminator == Some(true) {
                    parse_nodes(template, pos, true).0
                } else {
                    Vec::new()
                };
                nodes.push(TemplateNode::Conditional {
                    field: field.to_string(),
                    negate,
                    then,
                    otherwise,
                });
            }
            Tag::Else if nested => return (nodes, Some(true)),
            Tag::EndIf if nested => return (nodes, Some(false)),
            Tag::Else | Tag::EndIf => nodes.push(TemplateNode::Text(format!("{{{{{}}}}}", inner))),
        }
    }
    (nodes, None)
}

fn render_nodes(nodes: &[TemplateNode], data: &Record, out: &mut String) {
    for node in nodes {
        match node {
            TemplateNode::Text(text) => out.push_str(text),
            TemplateNode::Value(reference) => match Field::new(reference) {
                Ok(field) => {
                    if let Some(value) = field.peek(data, None) {
                        if !value.is_null() {
                            out.push_str(&display_string(&value));
                        }
                    }
                }
                Err(e) => warn!("Skipping template token {{{{{}}}}}: {}", reference, e),
            },
            TemplateNode::Conditional {
                field,
                negate,
                then,
                otherwise,
            } => {
                let value = Field::new(field)
                    .ok()
                    .and_then(|f| f.peek(data, None));
                if is_truthy(value.as_ref()) != *negate {
                    render_nodes(then, data, out);
                } else {
                    render_nodes(otherwise, data, out);
                }
            }
        }
    }
}

/// Substitutes `{{field}}` tokens and evaluates `{{#if field}}…{{#else}}…{{/if}}`
/// blocks against `data`. Missing values render as the empty string.
pub fn parse_fields(template: &str, data: &Record) -> String {
    let mut pos = 0;
    let (nodes, _) = parse_nodes(template, &mut pos, false);
    let mut out = String::with_capacity(template.len());
    render_nodes(&nodes, data, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_scinotation() {
        assert_eq!(scinotation(&json!(0.5)), json!("0.500"));
        assert_eq!(scinotation(&json!(0.000012)), json!("1.20 × 10^-5"));
    }

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode(&json!("a b&c")), json!("a%20b%26c"));
    }

    #[test]
    fn test_parse_fields_conditionals() {
        let data = record(json!({"assoc:gene": "TCF7L2", "empty": ""}));
        assert_eq!(parse_fields("Gene {{assoc:gene}}", &data), "Gene TCF7L2");
        assert_eq!(
            parse_fields("{{#if assoc:gene}}has{{#else}}none{{/if}}", &data),
            "has"
        );
        assert_eq!(parse_fields("{{#if !empty}}blank{{/if}}", &data), "blank");
        assert_eq!(parse_fields("x{{missing}}y", &data), "xy");
    }

    #[test]
    fn test_parse_fields_keeps_stray_closing_tags() {
        let data = record(json!({"assoc:gene": "TCF7L2"}));
        assert_eq!(parse_fields("a{{/if}}b", &data), "a{{/if}}b");
        assert_eq!(parse_fields("{{#else}} {{assoc:gene}}", &data), "{{#else}} TCF7L2");
        assert_eq!(
            parse_fields("{{#if assoc:gene}}x{{/if}}{{/if}}y", &data),
            "x{{/if}}y"
        );
    }
}

//! Layout documents: merging over defaults, field introspection and the shared store.

use crate::error::{PlotError, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// Merges `custom` over `default` into a fresh value.
///
/// Objects merge key by key; arrays and primitives from `custom` replace the default
/// wholesale. A `null` in `custom` counts as absent and falls back to the default.
pub fn merge(custom: &Value, default: &Value) -> Value {
    match (custom, default) {
        (Value::Object(c), Value::Object(d)) => {
            let mut out = Map::with_capacity(c.len().max(d.len()));
            for (key, default_value) in d {
                let merged = match c.get(key) {
                    None | Some(Value::Null) => default_value.clone(),
                    Some(custom_value) => merge(custom_value, default_value),
                };
                out.insert(key.clone(), merged);
            }
            for (key, custom_value) in c {
                if !d.contains_key(key) {
                    out.insert(key.clone(), custom_value.clone());
                }
            }
            Value::Object(out)
        }
        (Value::Null, _) => default.clone(),
        _ => custom.clone(),
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn collect_fields(text: &str, namespaces: &[&str], found: &mut BTreeSet<String>) {
    for namespace in namespaces {
        let prefix = format!("{}:", namespace);
        let mut search_from = 0;
        while let Some(offset) = text[search_from..].find(&prefix) {
            let start = search_from + offset;
            search_from = start + prefix.len();
            let preceded_by_word = text[..start].chars().next_back().is_some_and(is_word_char);
            if preceded_by_word {
                continue;
            }
            let name_len: usize = text[search_from..]
                .chars()
                .take_while(|c| is_word_char(*c))
                .map(char::len_utf8)
                .sum();
            if name_len > 0 {
                found.insert(text[start..search_from + name_len].to_string());
            }
        }
    }
}

fn walk_fields(value: &Value, namespaces: &[&str], found: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => collect_fields(s, namespaces, found),
        Value::Array(items) => items.iter().for_each(|v| walk_fields(v, namespaces, found)),
        Value::Object(map) => map.values().for_each(|v| walk_fields(v, namespaces, found)),
        _ => {}
    }
}

/// Every `namespace:field` reference in the layout, bare or inside `{{...}}`, with
/// transformation suffixes removed. Nothing is found without namespaces.
pub fn find_fields(layout: &Value, namespaces: &[&str]) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    if !namespaces.is_empty() {
        walk_fields(layout, namespaces, &mut found);
    }
    found
}

/// Byte offsets of `needle` occurring as a whole token (not followed by a word char,
/// not preceded by one).
fn token_matches(text: &str, needle: &str) -> Vec<usize> {
    let mut hits = Vec::new();
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find(needle) {
        let start = search_from + offset;
        let end = start + needle.len();
        search_from = end;
        let before = text[..start].chars().next_back().is_some_and(is_word_char);
        let after = text[end..].chars().next().is_some_and(is_word_char);
        if !before && !after {
            hits.push(start);
        }
    }
    hits
}

fn rename_in_string(text: &str, old_name: &str, new_name: &str, warn_filters: bool) -> Option<String> {
    let hits = token_matches(text, old_name);
    if hits.is_empty() {
        return None;
    }
    if warn_filters {
        for &start in &hits {
            let rest = &text[start + old_name.len()..];
            if rest.starts_with('|') && rest[1..].chars().next().is_some_and(is_word_char) {
                let filter: String = rest[1..].chars().take_while(|c| is_word_char(*c)).collect();
                warn!(
                    "Found usage of field {}|{}; check that the renamed field {} still works with this filter",
                    old_name, filter, new_name
                );
            }
        }
    }
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for start in hits {
        out.push_str(&text[cursor..start]);
        out.push_str(new_name);
        cursor = start + old_name.len();
    }
    out.push_str(&text[cursor..]);
    Some(out)
}

fn rename_walk(value: &mut Value, old_name: &str, new_name: &str, warn_filters: bool) {
    match value {
        Value::String(s) => {
            if let Some(renamed) = rename_in_string(s, old_name, new_name, warn_filters) {
                *s = renamed;
            }
        }
        Value::Array(items) => items
            .iter_mut()
            .for_each(|v| rename_walk(v, old_name, new_name, warn_filters)),
        Value::Object(map) => map
            .values_mut()
            .for_each(|v| rename_walk(v, old_name, new_name, warn_filters)),
        _ => {}
    }
}

/// Rewrites every whole-token use of `old_name` in place, preserving `|filter`
/// suffixes. Filtered uses are reported through a warning unless `warn` is false.
pub fn rename_field(layout: &mut Value, old_name: &str, new_name: &str, warn: bool) {
    rename_walk(layout, old_name, new_name, warn);
}

/// Shared plot layout document.
#[derive(Clone, Default)]
pub struct LayoutStore {
    root: Arc<RwLock<Value>>,
}

impl LayoutStore {
    pub fn new(root: Value) -> Self {
        Self {
            root: Arc::new(RwLock::new(root)),
        }
    }

    pub fn snapshot(&self) -> Value {
        self.root.read().clone()
    }

    pub fn get(&self, pointer: &str) -> Option<Value> {
        self.root.read().pointer(pointer).cloned()
    }

    pub fn handle(&self, pointer: impl Into<String>) -> LayoutHandle {
        LayoutHandle {
            store: self.clone(),
            pointer: Arc::new(RwLock::new(pointer.into())),
        }
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        f(&mut self.root.write())
    }

    pub fn rename_field(&self, old_name: &str, new_name: &str, warn: bool) {
        rename_field(&mut self.root.write(), old_name, new_name, warn);
    }
}

fn ensure_path<'a>(root: &'a mut Value, pointer: &str) -> &'a mut Value {
    let mut current = root;
    for token in pointer.split('/').skip(1) {
        let key = token.replace("~1", "/").replace("~0", "~");
        current = match current {
            Value::Array(items) => match key.parse::<usize>() {
                Ok(idx) if idx < items.len() => &mut items[idx],
                _ => {
                    items.push(Value::Null);
                    let last = items.len() - 1;
                    &mut items[last]
                }
            },
            other => {
                if !other.is_object() {
                    *other = Value::Object(Map::new());
                }
                match other {
                    Value::Object(map) => map.entry(key).or_insert(Value::Null),
                    _ => unreachable!("value was just made an object"),
                }
            }
        };
    }
    current
}

/// A stable address into a `LayoutStore`. Clones share the pointer, so an owner can
/// repoint every holder at once when array positions shift.
#[derive(Clone)]
pub struct LayoutHandle {
    store: LayoutStore,
    pointer: Arc<RwLock<String>>,
}

impl LayoutHandle {
    pub fn store(&self) -> &LayoutStore {
        &self.store
    }

    pub fn pointer(&self) -> String {
        self.pointer.read().clone()
    }

    pub fn repoint(&self, pointer: impl Into<String>) {
        *self.pointer.write() = pointer.into();
    }

    pub fn child(&self, relative: &str) -> LayoutHandle {
        self.store.handle(format!("{}{}", self.pointer(), relative))
    }

    pub fn get(&self) -> Value {
        self.store.get(&self.pointer()).unwrap_or(Value::Null)
    }

    /// Value at a pointer relative to this handle, e.g. `/axes/x/render`.
    pub fn get_path(&self, relative: &str) -> Option<Value> {
        self.store.get(&format!("{}{}", self.pointer(), relative))
    }

    pub fn read<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.get())?)
    }

    pub fn replace(&self, value: Value) {
        let pointer = self.pointer();
        self.store.update(|root| *ensure_path(root, &pointer) = value);
    }

    pub fn write<T: Serialize>(&self, typed: &T) -> Result<()> {
        self.replace(serde_json::to_value(typed)?);
        Ok(())
    }

    pub fn set_path(&self, relative: &str, value: Value) {
        let pointer = format!("{}{}", self.pointer(), relative);
        self.store.update(|root| *ensure_path(root, &pointer) = value);
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let pointer = self.pointer();
        self.store.update(|root| f(ensure_path(root, &pointer)))
    }

    /// Removes element `index` from the array at `relative`.
    pub fn remove_from_array(&self, relative: &str, index: usize) -> Result<Value> {
        let pointer = format!("{}{}", self.pointer(), relative);
        self.store.update(|root| match root.pointer_mut(&pointer) {
            Some(Value::Array(items)) if index < items.len() => Ok(items.remove(index)),
            _ => Err(PlotError::InvalidLayout(format!(
                "no array element {} at {}",
                index, pointer
            ))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_custom_wins_for_arrays() {
        let merged = merge(
            &json!({"a": [3], "n": {"x": 1}, "extra": true}),
            &json!({"a": [1, 2], "n": {"x": 0, "y": 2}, "d": null}),
        );
        assert_eq!(
            merged,
            json!({"a": [3], "n": {"x": 1, "y": 2}, "d": null, "extra": true})
        );
    }

    #[test]
    fn test_handle_set_path_creates_objects() {
        let store = LayoutStore::new(json!({"panels": [{"id": "a"}]}));
        let handle = store.handle("/panels/0");
        handle.set_path("/axes/x/floor", json!(5));
        assert_eq!(store.get("/panels/0/axes/x/floor"), Some(json!(5)));
    }
}

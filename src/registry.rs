//! String-keyed registries.
//!
//! Layouts refer to features by name (`"numerical_bin"`, `"points"`, `"zoom_region"`),
//! so every pluggable capability is looked up through a `Registry`. Registration is
//! explicit and happens at startup, usually through [`Registries::default`].

use crate::data_layers::DataLayerRegistry;
use crate::error::{PlotError, Result};
use crate::field::TransformRegistry;
use crate::match_functions::MatchRegistry;
use crate::scale_functions::ScaleRegistry;
use crate::toolbar::WidgetRegistry;
use indexmap::IndexMap;

pub struct Registry<T> {
    name: &'static str,
    items: IndexMap<String, T>,
}

impl<T> Registry<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            items: IndexMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Result<&T> {
        self.items.get(name).ok_or_else(|| PlotError::ItemNotFound {
            registry: self.name,
            name: name.to_string(),
        })
    }

    /// Adds an item. Redefining an existing name fails unless `override_existing` is set.
    pub fn add(&mut self, name: &str, item: T, override_existing: bool) -> Result<()> {
        if !override_existing && self.items.contains_key(name) {
            return Err(PlotError::AlreadyDefined(name.to_string()));
        }
        self.items.insert(name.to_string(), item);
        Ok(())
    }

    /// Returns true if the item was present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.items.shift_remove(name).is_some()
    }

    pub fn has(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }
}

/// Every registry a plot consults, bundled so it can be shared by handle.
pub struct Registries {
    pub transforms: TransformRegistry,
    pub scale_functions: ScaleRegistry,
    pub match_functions: MatchRegistry,
    pub data_layers: DataLayerRegistry,
    pub widgets: WidgetRegistry,
}

impl Default for Registries {
    fn default() -> Self {
        Self {
            transforms: crate::field::builtin_transforms(),
            scale_functions: crate::scale_functions::builtin_scale_functions(),
            match_functions: crate::match_functions::builtin_match_functions(),
            data_layers: crate::data_layers::builtin_data_layers(),
            widgets: crate::toolbar::builtin_widgets(),
        }
    }
}

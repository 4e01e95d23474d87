use futures_util::future::{self, BoxFuture};
use indexmap::IndexMap;
use std::sync::Arc;

use super::data::Record;
use super::state::PlotState;
use crate::error::{PlotError, Result};
use crate::utils::as_number;

/// Provider of records for one namespace.
pub trait DataSource: Send + Sync {
    /// Fetches the records needed to show the current state. `fields` lists the
    /// `namespace:field` references the requesting layer uses.
    fn fetch(&self, state: &PlotState, fields: &[String]) -> BoxFuture<'static, eyre::Result<Vec<Record>>>;
}

/// Data sources by namespace.
#[derive(Clone, Default)]
pub struct DataSources {
    sources: IndexMap<String, Arc<dyn DataSource>>,
}

impl DataSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, namespace: &str, source: Arc<dyn DataSource>) -> Result<&mut Self> {
        if namespace.is_empty()
            || !namespace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(PlotError::InvalidNamespace(namespace.to_string()));
        }
        if self.sources.contains_key(namespace) {
            return Err(PlotError::AlreadyDefined(namespace.to_string()));
        }
        self.sources.insert(namespace.to_string(), source);
        Ok(self)
    }

    pub fn get(&self, namespace: &str) -> Result<Arc<dyn DataSource>> {
        self.sources
            .get(namespace)
            .cloned()
            .ok_or_else(|| PlotError::ItemNotFound {
                registry: "data sources",
                name: namespace.to_string(),
            })
    }

    pub fn has(&self, namespace: &str) -> bool {
        self.sources.contains_key(namespace)
    }

    pub fn remove(&mut self, namespace: &str) -> bool {
        self.sources.shift_remove(namespace).is_some()
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }
}

/// In-memory records, optionally cut to the plot region by a position field.
#[derive(Clone, Debug, Default)]
pub struct StaticSource {
    records: Vec<Record>,
    position_field: Option<String>,
}

impl StaticSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            position_field: None,
        }
    }

    /// Only records whose `field` lies within `[start, end]` are returned.
    pub fn with_position_field(mut self, field: impl Into<String>) -> Self {
        self.position_field = Some(field.into());
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn in_region(&self, state: &PlotState) -> Vec<Record> {
        let (Some(field), Some(region)) = (&self.position_field, state.region()) else {
            return self.records.clone();
        };
        self.records
            .iter()
            .filter(|r| {
                r.get(field)
                    .and_then(as_number)
                    .is_some_and(|pos| pos >= region.min && pos <= region.max)
            })
            .cloned()
            .collect()
    }
}

impl DataSource for StaticSource {
    fn fetch(&self, state: &PlotState, _fields: &[String]) -> BoxFuture<'static, eyre::Result<Vec<Record>>> {
        Box::pin(future::ready(Ok(self.in_region(state))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_validation() {
        let mut sources = DataSources::new();
        let source: Arc<dyn DataSource> = Arc::new(StaticSource::default());
        assert!(matches!(
            sources.add("bad-name", source.clone()),
            Err(PlotError::InvalidNamespace(_))
        ));
        sources.add("assoc", source.clone()).unwrap();
        assert!(matches!(
            sources.add("assoc", source),
            Err(PlotError::AlreadyDefined(_))
        ));
    }
}

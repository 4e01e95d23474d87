//! Data layers turn fetched records into marks inside a panel.

pub mod base;

pub use base::BaseDataLayer;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::data_types::{
    AxisDim, AxisId, AxisRange, DataLayerLayout, DataSources, ElementStatus, Record, SharedState,
    Tick,
};
use crate::error::Result;
use crate::layout::LayoutHandle;
use crate::registry::{Registries, Registry};
use crate::svg::SvgNode;
use crate::theme::ChartTheme;
use crate::transform::PlotTransform;
use crate::utils::number_value;

/// Pending fetch for one layer. `'static` so a panel can await many at once.
pub type LayerFetch = BoxFuture<'static, eyre::Result<Vec<Record>>>;

/// Everything a layer needs from its panel and plot at construction.
#[derive(Clone)]
pub struct LayerContext {
    pub id: String,
    pub panel_id: String,
    pub layout: LayoutHandle,
    pub state: SharedState,
    pub registries: Arc<Registries>,
    pub data_sources: Arc<DataSources>,
    pub theme: Arc<ChartTheme>,
}

impl LayerContext {
    pub fn state_id(&self) -> String {
        format!("{}.{}", self.panel_id, self.id)
    }
}

pub trait DataLayer: Send + Sync {
    fn id(&self) -> &str;

    /// Key of this layer's slice in the plot state: `panel_id.layer_id`.
    fn state_id(&self) -> String;

    fn layout_handle(&self) -> &LayoutHandle;

    fn layout(&self) -> DataLayerLayout {
        self.layout_handle().read().unwrap_or_default()
    }

    /// `[min, max]` this layer wants on an axis, or `None` to abstain.
    fn axis_extent(&self, dim: AxisDim) -> Option<AxisRange>;

    /// Tick suggestions for `axis` given the panel's tick configuration.
    fn ticks(&self, _axis: AxisId, _config: &Map<String, Value>) -> Vec<Tick> {
        Vec::new()
    }

    /// Starts a fetch. An `Err` here is a synchronous failure; the future may
    /// also fail on its own.
    fn re_map(&mut self) -> eyre::Result<LayerFetch>;

    /// Installs the records of a successful fetch.
    fn receive_data(&mut self, records: Vec<Record>);

    fn data(&self) -> &[Record];

    fn render(&mut self, transform: &PlotTransform) -> SvgNode;

    fn destroy_all_tooltips(&mut self) {}

    fn set_element_status(&mut self, element_id: &str, status: ElementStatus, toggle: bool);

    fn set_all_element_status(&mut self, status: ElementStatus, toggle: bool);

    fn element_status(&self, element_id: &str, status: ElementStatus) -> bool;

    /// Pixel height the layer needs to show all of its data, if it has one.
    fn absolute_data_height(&self) -> Option<f64> {
        None
    }

    /// Pins (or with `None`, frees) the layer's extent on one axis.
    fn set_axis_bounds(&mut self, dim: AxisDim, floor: Option<f64>, ceiling: Option<f64>) {
        let key = dim.layout_key();
        let to_value = |v: Option<f64>| v.map(number_value).unwrap_or(Value::Null);
        self.layout_handle().update(|layout| {
            if let Some(axis) = layout.get_mut(key).and_then(Value::as_object_mut) {
                axis.insert("floor".into(), to_value(floor));
                axis.insert("ceiling".into(), to_value(ceiling));
            } else if let Some(obj) = layout.as_object_mut() {
                let mut axis = Map::new();
                axis.insert("floor".into(), to_value(floor));
                axis.insert("ceiling".into(), to_value(ceiling));
                obj.insert(key.into(), Value::Object(axis));
            }
        });
    }
}

pub type DataLayerConstructor =
    Arc<dyn Fn(LayerContext) -> Result<Box<dyn DataLayer>> + Send + Sync>;
pub type DataLayerRegistry = Registry<DataLayerConstructor>;

pub fn builtin_data_layers() -> DataLayerRegistry {
    let mut registry = Registry::new("data layers");
    let points: DataLayerConstructor = Arc::new(|ctx: LayerContext| {
        let layer: Box<dyn DataLayer> = Box::new(BaseDataLayer::new(ctx)?);
        Ok(layer)
    });
    let _ = registry.add("points", points, true);
    registry
}

//! Typed views of layout documents.
//!
//! Every struct defaults each field and keeps unknown keys in `extra`, so reading a
//! layout through these types and writing it back loses nothing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::axis::{AxisId, AxisRange, TickFormat};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Origin {
    pub x: f64,
    pub y: Option<f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipArea {
    pub height: f64,
    pub width: f64,
    pub origin: Point,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleLayout {
    pub text: String,
    pub style: Map<String, Value>,
    pub x: f64,
    pub y: f64,
}

impl Default for TitleLayout {
    fn default() -> Self {
        Self {
            text: String::new(),
            style: Map::new(),
            x: 10.0,
            y: 22.0,
        }
    }
}

/// Explicit pixel range override for an axis.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeOverride {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisLayout {
    pub render: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_offset: Option<f64>,
    /// `"state"` on the x axis pins the extent to the plot region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent: Option<String>,
    /// A literal tick array, or a configuration object passed to data layers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticks: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_format: Option<TickFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeOverride>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxesLayout {
    pub x: AxisLayout,
    pub y1: AxisLayout,
    pub y2: AxisLayout,
}

impl AxesLayout {
    pub fn get(&self, axis: AxisId) -> &AxisLayout {
        match axis {
            AxisId::X => &self.x,
            AxisId::Y1 => &self.y1,
            AxisId::Y2 => &self.y2,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionLayout {
    pub drag_background_to_pan: bool,
    pub drag_x_ticks_to_scale: bool,
    pub drag_y1_ticks_to_scale: bool,
    pub drag_y2_ticks_to_scale: bool,
    pub scroll_to_zoom: bool,
    pub x_linked: bool,
    pub y1_linked: bool,
    pub y2_linked: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolbarLayout {
    pub widgets: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelLayout {
    pub id: String,
    pub tag: String,
    pub title: TitleLayout,
    pub y_index: Option<i64>,
    pub min_height: f64,
    pub height: f64,
    pub origin: Origin,
    pub margin: Margin,
    pub background_click: String,
    pub toolbar: ToolbarLayout,
    pub cliparea: ClipArea,
    pub axes: AxesLayout,
    pub legend: Option<Value>,
    pub interaction: InteractionLayout,
    pub show_loading_indicator: bool,
    pub data_layers: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for PanelLayout {
    fn default() -> Self {
        Self {
            id: String::new(),
            tag: "custom_data_type".into(),
            title: TitleLayout::default(),
            y_index: None,
            min_height: 1.0,
            height: 1.0,
            origin: Origin::default(),
            margin: Margin::default(),
            background_click: "clear_selections".into(),
            toolbar: ToolbarLayout::default(),
            cliparea: ClipArea::default(),
            axes: AxesLayout::default(),
            legend: None,
            interaction: InteractionLayout::default(),
            show_loading_indicator: true,
            data_layers: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// How a data layer binds to one panel axis.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisBinding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// 1 or 2 for y bindings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub axis: Option<u8>,
    pub decoupled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ceiling: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower_buffer: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_buffer: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_extent: Option<AxisRange>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterLayout {
    pub field: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

fn default_operator() -> String {
    "=".into()
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataLayerLayout {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Name of the data source this layer reads from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub x_axis: AxisBinding,
    pub y_axis: AxisBinding,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    pub filters: Vec<FilterLayout>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_size: Option<Value>,
    /// Pixel height per row for layers that report an absolute data height.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_height: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotLayout {
    pub id: String,
    pub width: f64,
    pub min_width: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_region_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_region_scale: Option<f64>,
    pub toolbar: ToolbarLayout,
    pub panels: Vec<Value>,
    pub state: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for PlotLayout {
    fn default() -> Self {
        Self {
            id: String::new(),
            width: 800.0,
            min_width: 400.0,
            min_region_scale: None,
            max_region_scale: None,
            toolbar: ToolbarLayout::default(),
            panels: Vec::new(),
            state: Map::new(),
            extra: Map::new(),
        }
    }
}

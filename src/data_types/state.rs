use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::axis::AxisRange;
use crate::utils::{as_number, number_value};

/// Region coordinates plus per-panel and per-layer slices, shared by every panel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlotState {
    values: Map<String, Value>,
}

pub type SharedState = Arc<RwLock<PlotState>>;

impl PlotState {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn start(&self) -> Option<f64> {
        self.values.get("start").and_then(as_number)
    }

    pub fn end(&self) -> Option<f64> {
        self.values.get("end").and_then(as_number)
    }

    pub fn region(&self) -> Option<AxisRange> {
        Some(AxisRange::new(self.start()?, self.end()?))
    }

    pub fn set_region(&mut self, region: AxisRange) {
        self.values.insert("start".into(), number_value(region.min));
        self.values.insert("end".into(), number_value(region.max));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.shift_remove(key)
    }

    /// Shallow merge; keys in `partial` replace existing ones.
    pub fn apply(&mut self, partial: &Map<String, Value>) {
        for (key, value) in partial {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragMethod {
    Background,
    XTick,
    Y1Tick,
    Y2Tick,
}

impl DragMethod {
    pub fn is_x(self) -> bool {
        matches!(self, DragMethod::Background | DragMethod::XTick)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Dragging {
    pub method: DragMethod,
    pub start_x: f64,
    pub start_y: f64,
    pub dragged_x: f64,
    pub dragged_y: f64,
    /// Shift held at gesture start: tick drags pan instead of scale.
    pub modifier_held: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Zooming {
    pub scale: f64,
    /// Cursor x in page pixels.
    pub center: f64,
}

/// The one gesture in progress on a plot, if any.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Interaction {
    pub panel_id: Option<String>,
    pub linked_panel_ids: Vec<String>,
    pub dragging: Option<Dragging>,
    pub zooming: Option<Zooming>,
}

pub type SharedInteraction = Arc<RwLock<Interaction>>;

impl Interaction {
    pub fn is_active(&self) -> bool {
        self.panel_id.is_some() || self.dragging.is_some() || self.zooming.is_some()
    }

    pub fn clear(&mut self) {
        *self = Interaction::default();
    }

    /// True when the gesture targets `panel_id` directly or through an axis link.
    pub fn involves(&self, panel_id: &str) -> bool {
        self.panel_id.as_deref() == Some(panel_id)
            || self.linked_panel_ids.iter().any(|id| id == panel_id)
    }
}

//! Toolbar widgets.
//!
//! A widget never mutates the plot itself. `update` reports how it should look for
//! the current state and `click` returns a [`WidgetAction`] which the plot carries out
//! (see `Plot::click_widget`).

use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::data_types::{AxisRange, PlotState};
use crate::error::{PlotError, Result};
use crate::registry::Registry;
use crate::utils::as_number;
use crate::utils::position_formatter::{format_position, format_region_width};
use crate::view_controller::ViewController;

/// Which toolbar a widget lives in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WidgetScope {
    Plot,
    Panel(String),
}

/// Position of the owning panel in the plot's vertical order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PanelSlot<'a> {
    pub id: &'a str,
    pub y_index: usize,
    pub panel_count: usize,
}

pub struct WidgetContext<'a> {
    pub state: &'a PlotState,
    pub min_region_scale: Option<f64>,
    pub max_region_scale: Option<f64>,
    pub panel: Option<PanelSlot<'a>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WidgetView {
    pub label: String,
    pub title: String,
    pub disabled: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WidgetAction {
    ApplyState(Map<String, Value>),
    MovePanelUp(String),
    MovePanelDown(String),
    RemovePanel(String),
    ScaleHeightToData(String),
}

pub trait Widget: Send + Sync {
    fn kind(&self) -> &str;

    fn update(&self, ctx: &WidgetContext<'_>) -> WidgetView;

    /// The action for a click, or `None` when the widget is disabled or display only.
    fn click(&self, ctx: &WidgetContext<'_>) -> Option<WidgetAction>;
}

pub type WidgetConstructor =
    Arc<dyn Fn(&Value, &WidgetScope) -> Result<Box<dyn Widget>> + Send + Sync>;
pub type WidgetRegistry = Registry<WidgetConstructor>;

fn region_of(state: &PlotState) -> Option<AxisRange> {
    state.region().filter(AxisRange::is_finite)
}

fn region_change(region: AxisRange) -> Map<String, Value> {
    let mut changes = Map::new();
    changes.insert("start".into(), json!(region.min));
    changes.insert("end".into(), json!(region.max));
    changes
}

fn panel_id(kind: &str, scope: &WidgetScope) -> Result<String> {
    match scope {
        WidgetScope::Panel(id) => Ok(id.clone()),
        WidgetScope::Plot => Err(PlotError::InvalidLayout(format!(
            "widget {} can only be placed in a panel toolbar",
            kind
        ))),
    }
}

/// Grows or shrinks the region about its centre by a fraction of its width.
pub struct ZoomRegion {
    step: f64,
}

impl ZoomRegion {
    fn can_zoom(&self, ctx: &WidgetContext<'_>) -> bool {
        let Some(region) = region_of(ctx.state) else {
            return false;
        };
        let current = region.span();
        match (self.step > 0.0, self.step < 0.0) {
            (true, _) => ctx.max_region_scale.map_or(true, |max| current < max),
            (_, true) => ctx.min_region_scale.map_or(true, |min| current > min),
            _ => false,
        }
    }
}

impl Widget for ZoomRegion {
    fn kind(&self) -> &str {
        "zoom_region"
    }

    fn update(&self, ctx: &WidgetContext<'_>) -> WidgetView {
        let direction = if self.step > 0.0 { "out" } else { "in" };
        WidgetView {
            label: if self.step > 0.0 { "z-" } else { "z+" }.into(),
            title: format!("Zoom region {} by {:.1}%", direction, self.step.abs() * 100.0),
            disabled: !self.can_zoom(ctx),
        }
    }

    fn click(&self, ctx: &WidgetContext<'_>) -> Option<WidgetAction> {
        if !self.can_zoom(ctx) {
            return None;
        }
        let region = region_of(ctx.state)?;
        let target = ViewController::step_zoom_region(
            region,
            self.step,
            ctx.min_region_scale,
            ctx.max_region_scale,
        );
        Some(WidgetAction::ApplyState(region_change(target)))
    }
}

/// Moves the region by a fixed number of bases.
pub struct ShiftRegion {
    step: f64,
}

impl Widget for ShiftRegion {
    fn kind(&self) -> &str {
        "shift_region"
    }

    fn update(&self, ctx: &WidgetContext<'_>) -> WidgetView {
        let sign = if self.step > 0.0 { "+" } else { "-" };
        WidgetView {
            label: if self.step > 0.0 { ">" } else { "<" }.into(),
            title: format!(
                "Shift region by {}{}",
                sign,
                format_position(self.step.abs(), None, true)
            ),
            disabled: region_of(ctx.state).is_none(),
        }
    }

    fn click(&self, ctx: &WidgetContext<'_>) -> Option<WidgetAction> {
        let region = region_of(ctx.state)?;
        let target = ViewController::shift_region(region, self.step);
        Some(WidgetAction::ApplyState(region_change(target)))
    }
}

pub struct MovePanel {
    panel_id: String,
    up: bool,
}

impl MovePanel {
    fn at_boundary(&self, ctx: &WidgetContext<'_>) -> bool {
        match ctx.panel {
            Some(slot) if self.up => slot.y_index == 0,
            Some(slot) => slot.y_index + 1 >= slot.panel_count,
            None => true,
        }
    }
}

impl Widget for MovePanel {
    fn kind(&self) -> &str {
        if self.up {
            "move_panel_up"
        } else {
            "move_panel_down"
        }
    }

    fn update(&self, ctx: &WidgetContext<'_>) -> WidgetView {
        WidgetView {
            label: if self.up { "▴" } else { "▾" }.into(),
            title: if self.up { "Move panel up" } else { "Move panel down" }.into(),
            disabled: self.at_boundary(ctx),
        }
    }

    fn click(&self, ctx: &WidgetContext<'_>) -> Option<WidgetAction> {
        if self.at_boundary(ctx) {
            return None;
        }
        let id = self.panel_id.clone();
        Some(if self.up {
            WidgetAction::MovePanelUp(id)
        } else {
            WidgetAction::MovePanelDown(id)
        })
    }
}

pub struct RemovePanel {
    panel_id: String,
}

impl Widget for RemovePanel {
    fn kind(&self) -> &str {
        "remove_panel"
    }

    fn update(&self, _ctx: &WidgetContext<'_>) -> WidgetView {
        WidgetView {
            label: "×".into(),
            title: "Remove panel".into(),
            disabled: false,
        }
    }

    fn click(&self, _ctx: &WidgetContext<'_>) -> Option<WidgetAction> {
        Some(WidgetAction::RemovePanel(self.panel_id.clone()))
    }
}

/// Display only: the width of the current region, e.g. `1.50 Mb`.
pub struct RegionScale;

impl Widget for RegionScale {
    fn kind(&self) -> &str {
        "region_scale"
    }

    fn update(&self, ctx: &WidgetContext<'_>) -> WidgetView {
        WidgetView {
            label: region_of(ctx.state)
                .map(|r| format_region_width(r.span()))
                .unwrap_or_default(),
            title: String::new(),
            disabled: true,
        }
    }

    fn click(&self, _ctx: &WidgetContext<'_>) -> Option<WidgetAction> {
        None
    }
}

pub struct ResizeToData {
    panel_id: String,
}

impl Widget for ResizeToData {
    fn kind(&self) -> &str {
        "resize_to_data"
    }

    fn update(&self, _ctx: &WidgetContext<'_>) -> WidgetView {
        WidgetView {
            label: "Resize to Data".into(),
            title: "Automatically resize this panel to show all data available".into(),
            disabled: false,
        }
    }

    fn click(&self, _ctx: &WidgetContext<'_>) -> Option<WidgetAction> {
        Some(WidgetAction::ScaleHeightToData(self.panel_id.clone()))
    }
}

fn step(layout: &Value, default: f64) -> f64 {
    layout
        .get("step")
        .and_then(as_number)
        .filter(|s| s.is_finite() && *s != 0.0)
        .unwrap_or(default)
}

fn constructor<F>(build: F) -> WidgetConstructor
where
    F: Fn(&Value, &WidgetScope) -> Result<Box<dyn Widget>> + Send + Sync + 'static,
{
    Arc::new(build)
}

pub fn builtin_widgets() -> WidgetRegistry {
    let mut registry = Registry::new("widgets");
    let entries = [
        (
            "zoom_region",
            constructor(|layout, _| {
                let widget: Box<dyn Widget> = Box::new(ZoomRegion { step: step(layout, 0.2) });
                Ok(widget)
            }),
        ),
        (
            "shift_region",
            constructor(|layout, _| {
                let widget: Box<dyn Widget> = Box::new(ShiftRegion { step: step(layout, 50_000.0) });
                Ok(widget)
            }),
        ),
        (
            "move_panel_up",
            constructor(|_, scope| {
                let widget: Box<dyn Widget> = Box::new(MovePanel {
                    panel_id: panel_id("move_panel_up", scope)?,
                    up: true,
                });
                Ok(widget)
            }),
        ),
        (
            "move_panel_down",
            constructor(|_, scope| {
                let widget: Box<dyn Widget> = Box::new(MovePanel {
                    panel_id: panel_id("move_panel_down", scope)?,
                    up: false,
                });
                Ok(widget)
            }),
        ),
        (
            "remove_panel",
            constructor(|_, scope| {
                let widget: Box<dyn Widget> = Box::new(RemovePanel {
                    panel_id: panel_id("remove_panel", scope)?,
                });
                Ok(widget)
            }),
        ),
        (
            "region_scale",
            constructor(|_, _| {
                let widget: Box<dyn Widget> = Box::new(RegionScale);
                Ok(widget)
            }),
        ),
        (
            "resize_to_data",
            constructor(|_, scope| {
                let widget: Box<dyn Widget> = Box::new(ResizeToData {
                    panel_id: panel_id("resize_to_data", scope)?,
                });
                Ok(widget)
            }),
        ),
    ];
    for (name, build) in entries {
        let _ = registry.add(name, build, true);
    }
    registry
}

/// The widgets of one toolbar, built from a layout's `toolbar.widgets` list.
pub struct Toolbar {
    scope: WidgetScope,
    widgets: Vec<Box<dyn Widget>>,
}

impl Toolbar {
    pub fn from_layout(layouts: &[Value], scope: WidgetScope, registry: &WidgetRegistry) -> Result<Self> {
        let mut widgets = Vec::with_capacity(layouts.len());
        for layout in layouts {
            let kind = layout
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| PlotError::InvalidLayout("widget layouts must specify \"type\"".into()))?;
            let constructor = registry.get(kind)?;
            widgets.push(constructor(layout, &scope)?);
        }
        Ok(Self { scope, widgets })
    }

    pub fn scope(&self) -> &WidgetScope {
        &self.scope
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.widgets.iter().map(|w| w.kind()).collect()
    }

    pub fn views(&self, ctx: &WidgetContext<'_>) -> Vec<WidgetView> {
        self.widgets.iter().map(|w| w.update(ctx)).collect()
    }

    pub fn click(&self, index: usize, ctx: &WidgetContext<'_>) -> Result<Option<WidgetAction>> {
        let widget = self
            .widgets
            .get(index)
            .ok_or_else(|| PlotError::InvalidLayout(format!("no widget at index {}", index)))?;
        Ok(widget.click(ctx))
    }
}

impl std::fmt::Debug for Toolbar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolbar")
            .field("scope", &self.scope)
            .field("widgets", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(start: f64, end: f64) -> PlotState {
        let mut s = PlotState::default();
        s.set_region(AxisRange::new(start, end));
        s
    }

    #[test]
    fn test_zoom_out_disabled_at_max_scale() {
        let toolbar = Toolbar::from_layout(
            &[json!({"type": "zoom_region", "step": 0.5})],
            WidgetScope::Plot,
            &builtin_widgets(),
        )
        .unwrap();
        let state = state(1.0, 1_000_001.0);
        let ctx = WidgetContext {
            state: &state,
            min_region_scale: None,
            max_region_scale: Some(1_000_000.0),
            panel: None,
        };
        assert!(toolbar.views(&ctx)[0].disabled);
        assert_eq!(toolbar.click(0, &ctx).unwrap(), None);
    }

    #[test]
    fn test_panel_widget_rejected_in_plot_toolbar() {
        let err = Toolbar::from_layout(
            &[json!({"type": "remove_panel"})],
            WidgetScope::Plot,
            &builtin_widgets(),
        );
        assert!(matches!(err, Err(PlotError::InvalidLayout(_))));
    }
}

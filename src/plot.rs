//! The plot: owns the layout store, the shared region state, the interaction
//! record, and the panels stacked top to bottom.

use futures_util::future::join_all;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::data_types::{
    AxisId, AxisRange, DataSources, DragMethod, Dragging, Interaction, PlotLayout, PlotState,
    Point, SharedInteraction, SharedState, Zooming,
};
use crate::error::{PlotError, Result};
use crate::events::{EventContext, EventHub, EventPayload, ListenerId};
use crate::layout::{merge, LayoutStore};
use crate::panel::{Panel, RemapStatus, ZOOM_HINT};
use crate::registry::Registries;
use crate::svg::SvgNode;
use crate::theme::ChartTheme;
use crate::toolbar::{PanelSlot, Toolbar, WidgetAction, WidgetContext, WidgetScope, WidgetView};
use crate::utils::{as_number, integral_value};
use crate::view_controller::ViewController;

/// Quiet period after the last wheel event before a zoom is committed.
pub const ZOOM_DEBOUNCE: Duration = Duration::from_millis(500);
/// How long the scroll-to-zoom hint stays up.
pub const ZOOM_HINT_DURATION: Duration = Duration::from_millis(1000);

/// Handles a panel shares with its plot. Clones refer to the same plot.
#[derive(Clone)]
pub struct PlotContext {
    pub plot_id: String,
    pub store: LayoutStore,
    pub state: SharedState,
    pub interaction: SharedInteraction,
    pub loading_data: Arc<AtomicBool>,
    pub registries: Arc<Registries>,
    pub data_sources: Arc<DataSources>,
    pub theme: Arc<ChartTheme>,
    pub hub: EventHub,
    container_offset: Arc<RwLock<Point>>,
}

impl PlotContext {
    pub fn plot_width(&self) -> f64 {
        self.store
            .get("/width")
            .as_ref()
            .and_then(as_number)
            .unwrap_or(0.0)
    }

    pub(crate) fn set_plot_width(&self, width: f64) {
        self.store.handle("").set_path("/width", integral_value(width));
    }

    /// `(min_region_scale, max_region_scale)` from the plot layout.
    pub fn region_scale_bounds(&self) -> (Option<f64>, Option<f64>) {
        let bound = |key: &str| {
            self.store
                .get(key)
                .as_ref()
                .and_then(as_number)
                .filter(|v| v.is_finite() && *v > 0.0)
        };
        (bound("/min_region_scale"), bound("/max_region_scale"))
    }

    /// Whether a gesture may start or continue.
    ///
    /// With a panel id: no other panel holds the interaction record and no data is
    /// loading. Without one: nothing is being dragged, zoomed or loaded.
    pub fn can_interact(&self, panel_id: Option<&str>) -> bool {
        let loading = self.loading_data.load(Ordering::SeqCst);
        let interaction = self.interaction.read();
        match panel_id {
            Some(id) => {
                interaction.panel_id.as_deref().map_or(true, |owner| owner == id) && !loading
            }
            None => {
                interaction.dragging.is_none() && interaction.zooming.is_none() && !loading
            }
        }
    }

    pub fn container_offset(&self) -> Point {
        self.container_offset.read().clone()
    }

    pub fn page_origin(&self) -> Point {
        self.container_offset()
    }
}

/// Keeps region bounds sane: whole bases, start at 1 or above, start before end,
/// and a width inside the plot's region scale bounds.
fn constrain_region(
    changes: &mut Map<String, Value>,
    min_region_scale: Option<f64>,
    max_region_scale: Option<f64>,
) {
    let start = changes.get("start").and_then(as_number);
    let end = changes.get("end").and_then(as_number);
    let (mut start, mut end) = match (start, end) {
        (Some(s), Some(e)) if s.is_finite() && e.is_finite() => (s.trunc().max(1.0), e.trunc().max(1.0)),
        (Some(s), _) if s.is_finite() => (s.trunc().max(1.0), s.trunc().max(1.0)),
        (_, Some(e)) if e.is_finite() => (e.trunc().max(1.0), e.trunc().max(1.0)),
        (None, None) => return,
        _ => (1.0, 1.0),
    };
    if end < start {
        std::mem::swap(&mut start, &mut end);
    }
    let midpoint = ((start + end) / 2.0).round();
    let scale = end - start;
    if let Some(min) = min_region_scale.filter(|min| scale < *min) {
        start = (midpoint - (min / 2.0).floor()).max(1.0);
        end = start + min;
    }
    if let Some(max) = max_region_scale.filter(|max| scale > *max) {
        start = (midpoint - (max / 2.0).floor()).max(1.0);
        end = start + max;
    }
    changes.insert("start".into(), integral_value(start));
    changes.insert("end".into(), integral_value(end));
}

pub struct Plot {
    id: String,
    ctx: PlotContext,
    panels: IndexMap<String, Panel>,
    panel_ids_by_y_index: Vec<String>,
    toolbar: Toolbar,
    zoom_deadlines: IndexMap<String, Instant>,
    hint_deadlines: IndexMap<String, Instant>,
    initialized: bool,
    total_height: f64,
}

impl Plot {
    pub fn new(id: &str, layout: Value, data_sources: DataSources) -> Result<Self> {
        Self::with_registries(
            id,
            layout,
            data_sources,
            Registries::default(),
            ChartTheme::default(),
        )
    }

    pub fn with_registries(
        id: &str,
        layout: Value,
        data_sources: DataSources,
        registries: Registries,
        theme: ChartTheme,
    ) -> Result<Self> {
        if id.is_empty() {
            return Err(PlotError::MissingId("Plot"));
        }
        if !layout.is_object() && !layout.is_null() {
            return Err(PlotError::InvalidLayout("plot layout must be an object".into()));
        }
        let defaults = serde_json::to_value(PlotLayout::default())?;
        let mut merged = merge(&layout, &defaults);
        if let Some(obj) = merged.as_object_mut() {
            obj.insert("id".into(), Value::String(id.to_string()));
        }
        let typed: PlotLayout = serde_json::from_value(merged.clone())?;

        let mut initial = typed.state.clone();
        constrain_region(&mut initial, typed.min_region_scale, typed.max_region_scale);
        let toolbar = Toolbar::from_layout(&typed.toolbar.widgets, WidgetScope::Plot, &registries.widgets)?;

        let ctx = PlotContext {
            plot_id: id.to_string(),
            store: LayoutStore::new(merged),
            state: Arc::new(RwLock::new(PlotState::new(initial))),
            interaction: Arc::new(RwLock::new(Interaction::default())),
            loading_data: Arc::new(AtomicBool::new(false)),
            registries: Arc::new(registries),
            data_sources: Arc::new(data_sources),
            theme: Arc::new(theme),
            hub: EventHub::new(id),
            container_offset: Arc::new(RwLock::new(Point::default())),
        };
        let mut plot = Self {
            id: id.to_string(),
            ctx,
            panels: IndexMap::new(),
            panel_ids_by_y_index: Vec::new(),
            toolbar,
            zoom_deadlines: IndexMap::new(),
            hint_deadlines: IndexMap::new(),
            initialized: false,
            total_height: 0.0,
        };
        for panel_layout in typed.panels {
            plot.add_panel(panel_layout)?;
        }
        Ok(plot)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> &PlotContext {
        &self.ctx
    }

    /// Plot-level layout fields; panel layouts are read through their panels.
    pub fn layout(&self) -> PlotLayout {
        self.ctx.store.handle("").read().unwrap_or_default()
    }

    pub fn store(&self) -> &LayoutStore {
        &self.ctx.store
    }

    pub fn state(&self) -> PlotState {
        self.ctx.state.read().clone()
    }

    pub fn interaction(&self) -> Interaction {
        self.ctx.interaction.read().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.ctx.loading_data.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn panel(&self, id: &str) -> Option<&Panel> {
        self.panels.get(id)
    }

    pub fn panel_mut(&mut self, id: &str) -> Option<&mut Panel> {
        self.panels.get_mut(id)
    }

    fn panel_or_err(&mut self, id: &str) -> Result<&mut Panel> {
        self.panels
            .get_mut(id)
            .ok_or_else(|| PlotError::UnknownPanel(id.to_string()))
    }

    pub fn panels(&self) -> impl Iterator<Item = &Panel> {
        self.panels.values()
    }

    pub fn panel_ids_by_y_index(&self) -> &[String] {
        &self.panel_ids_by_y_index
    }

    pub fn total_height(&self) -> f64 {
        self.total_height
    }

    pub fn rename_field(&self, old_name: &str, new_name: &str, warn: bool) {
        self.ctx.store.rename_field(old_name, new_name, warn);
    }

    // Events

    pub fn on<F>(&self, event: &str, handler: F) -> Result<ListenerId>
    where
        F: Fn(&EventContext) + Send + Sync + 'static,
    {
        self.ctx.hub.on(event, handler)
    }

    pub fn off(&self, event: &str, id: Option<ListenerId>) -> Result<()> {
        self.ctx.hub.off(event, id)
    }

    pub fn emit(&self, event: &str, payload: impl Into<EventPayload>) -> Result<()> {
        self.ctx.hub.emit(event, payload)
    }

    // Panels

    fn panel_layout_index(&self, id: &str) -> Option<usize> {
        self.ctx
            .store
            .get("/panels")?
            .as_array()?
            .iter()
            .position(|panel| panel.get("id").and_then(Value::as_str) == Some(id))
    }

    fn repoint_panels(&self) {
        for (id, panel) in &self.panels {
            if let Some(idx) = self.panel_layout_index(id) {
                panel.repoint(format!("/panels/{}", idx));
            }
        }
    }

    fn apply_panel_y_indexes(&self) {
        for (y_index, id) in self.panel_ids_by_y_index.iter().enumerate() {
            if let Some(panel) = self.panels.get(id) {
                panel.layout_handle().set_path("/y_index", json!(y_index));
            }
        }
    }

    /// Adds a panel and slots it into the vertical order. A `y_index` in the layout
    /// is spliced in (negative values count from the bottom); otherwise the panel
    /// goes last. On an initialized plot, call [`Plot::remap_panel`] to load it.
    pub fn add_panel(&mut self, layout: Value) -> Result<&mut Panel> {
        if !layout.is_object() {
            return Err(PlotError::InvalidLayout("panel layout must be an object".into()));
        }
        let id = layout
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or(PlotError::MissingId("Panel"))?
            .to_string();
        if self.panels.contains_key(&id) {
            return Err(PlotError::DuplicateId { kind: "panel", id });
        }

        let (layout_idx, pushed) = match self.panel_layout_index(&id) {
            Some(idx) => {
                self.ctx.store.handle(format!("/panels/{}", idx)).replace(layout);
                (idx, false)
            }
            None => {
                let idx = self.ctx.store.update(|root| {
                    match root.get_mut("panels") {
                        Some(Value::Array(panels)) => {
                            panels.push(layout);
                            panels.len() - 1
                        }
                        _ => {
                            if let Some(obj) = root.as_object_mut() {
                                obj.insert("panels".into(), Value::Array(vec![layout]));
                            }
                            0
                        }
                    }
                });
                (idx, true)
            }
        };
        let handle = self.ctx.store.handle(format!("/panels/{}", layout_idx));
        let panel = match Panel::new(handle.clone(), self.ctx.clone()) {
            Ok(panel) => panel,
            Err(e) => {
                if pushed {
                    let _ = self.ctx.store.handle("").remove_from_array("/panels", layout_idx);
                }
                return Err(e);
            }
        };
        let requested = panel.y_index();
        self.panels.insert(id.clone(), panel);

        let order = &mut self.panel_ids_by_y_index;
        match requested {
            Some(y) if !order.is_empty() => {
                let len = order.len() as i64;
                let y = if y < 0 { (len + y).max(0) } else { y };
                order.insert((y as usize).min(order.len()), id.clone());
            }
            _ => order.push(id.clone()),
        }
        self.apply_panel_y_indexes();
        self.position_panels();
        debug!(plot = %self.id, panel = %id, "panel added");
        self.panel_or_err(&id)
    }

    /// Removes a panel with its layers, layout entry and state slice, and restacks
    /// the remaining panels.
    pub fn remove_panel(&mut self, id: &str) -> Result<()> {
        let mut panel = self
            .panels
            .shift_remove(id)
            .ok_or_else(|| PlotError::UnknownPanel(id.to_string()))?;
        panel.destroy();
        if let Some(idx) = self.panel_layout_index(id) {
            self.ctx.store.handle("").remove_from_array("/panels", idx)?;
        }
        self.ctx.state.write().remove(id);
        self.zoom_deadlines.shift_remove(id);
        self.hint_deadlines.shift_remove(id);
        {
            let mut interaction = self.ctx.interaction.write();
            if interaction.panel_id.as_deref() == Some(id) {
                interaction.clear();
            } else {
                interaction.linked_panel_ids.retain(|linked| linked != id);
            }
        }
        self.panel_ids_by_y_index.retain(|existing| existing != id);
        self.repoint_panels();
        self.apply_panel_y_indexes();
        self.position_panels();
        debug!(plot = %self.id, panel = %id, "panel removed");
        self.ctx.hub.emit("panel_removed", json!(id))
    }

    /// Swaps a panel with the one above it. At the top this does nothing and
    /// returns false.
    pub fn move_panel_up(&mut self, id: &str) -> Result<bool> {
        let pos = self.y_position(id)?;
        if pos == 0 {
            return Ok(false);
        }
        self.panel_ids_by_y_index.swap(pos, pos - 1);
        self.apply_panel_y_indexes();
        self.position_panels();
        Ok(true)
    }

    /// Swaps a panel with the one below it. At the bottom this does nothing and
    /// returns false.
    pub fn move_panel_down(&mut self, id: &str) -> Result<bool> {
        let pos = self.y_position(id)?;
        if pos + 1 >= self.panel_ids_by_y_index.len() {
            return Ok(false);
        }
        self.panel_ids_by_y_index.swap(pos, pos + 1);
        self.apply_panel_y_indexes();
        self.position_panels();
        Ok(true)
    }

    fn y_position(&self, id: &str) -> Result<usize> {
        self.panel_ids_by_y_index
            .iter()
            .position(|existing| existing == id)
            .ok_or_else(|| PlotError::UnknownPanel(id.to_string()))
    }

    /// Stacks panels top to bottom by cumulative height and gives x-linked panels
    /// the widest left and right margins among them.
    pub fn position_panels(&mut self) {
        let (mut linked_left, mut linked_right) = (0.0f64, 0.0f64);
        for panel in self.panels.values() {
            let layout = panel.layout();
            if layout.interaction.x_linked {
                linked_left = linked_left.max(layout.margin.left);
                linked_right = linked_right.max(layout.margin.right);
            }
        }

        let mut y_offset = 0.0;
        for id in &self.panel_ids_by_y_index {
            let Some(panel) = self.panels.get_mut(id) else {
                continue;
            };
            panel.set_origin(0.0, y_offset);
            let layout = panel.layout();
            y_offset += layout.height;
            if layout.interaction.x_linked {
                let m = layout.margin;
                panel.set_margin(m.top, linked_right, m.bottom, linked_left);
            }
        }
        self.total_height = y_offset;

        let width = self.ctx.plot_width();
        for id in &self.panel_ids_by_y_index {
            if let Some(panel) = self.panels.get_mut(id) {
                let height = panel.layout().height;
                panel.set_dimensions(width, height);
            }
        }
    }

    /// Resizes the plot. Panel heights are scaled to fill `height`; the width never
    /// drops below `min_width`. Invalid values are ignored.
    pub fn set_dimensions(&mut self, width: f64, height: f64) {
        let valid = |v: f64| v.is_finite() && v >= 0.0;
        if valid(width) && valid(height) {
            let scaling = if self.total_height > 0.0 {
                height / self.total_height
            } else {
                1.0
            };
            let min_width = self.layout().min_width;
            let width = width.round().max(min_width);
            self.ctx.set_plot_width(width);
            let mut y_offset = 0.0;
            for id in &self.panel_ids_by_y_index {
                if let Some(panel) = self.panels.get_mut(id) {
                    let panel_height = panel.layout().height * scaling;
                    panel.set_dimensions(width, panel_height);
                    panel.set_origin(0.0, y_offset);
                    y_offset += panel.layout().height;
                }
            }
        }
        self.position_panels();
    }

    pub fn set_container_offset(&self, x: f64, y: f64) {
        *self.ctx.container_offset.write() = Point { x, y };
    }

    pub fn container_offset(&self) -> Point {
        self.ctx.container_offset()
    }

    pub fn page_origin(&self) -> Point {
        self.ctx.page_origin()
    }

    pub fn can_interact(&self, panel_id: Option<&str>) -> bool {
        self.ctx.can_interact(panel_id)
    }

    /// Other panels sharing gestures with `panel_id` on `axis`, in vertical order.
    pub fn linked_panel_ids(&self, panel_id: &str, axis: AxisId) -> Vec<String> {
        let linked = |panel: &Panel| {
            let interaction = panel.layout().interaction;
            match axis {
                AxisId::X => interaction.x_linked,
                AxisId::Y1 => interaction.y1_linked,
                AxisId::Y2 => interaction.y2_linked,
            }
        };
        let Some(source) = self.panels.get(panel_id) else {
            return Vec::new();
        };
        if !linked(source) {
            return Vec::new();
        }
        self.panel_ids_by_y_index
            .iter()
            .filter(|id| id.as_str() != panel_id)
            .filter(|id| self.panels.get(id.as_str()).is_some_and(|p| linked(p)))
            .cloned()
            .collect()
    }

    fn render_involved(&mut self, panel_id: &str, linked: &[String]) {
        for id in std::iter::once(panel_id).chain(linked.iter().map(String::as_str)) {
            if let Some(panel) = self.panels.get_mut(id) {
                panel.render();
            }
        }
    }

    // Gestures

    /// Begins a drag at plot coordinates `(x, y)`. Returns false when the panel
    /// does not allow this gesture or another gesture is live.
    pub fn start_drag(
        &mut self,
        panel_id: &str,
        method: DragMethod,
        x: f64,
        y: f64,
        modifier_held: bool,
    ) -> Result<bool> {
        let panel = self
            .panels
            .get(panel_id)
            .ok_or_else(|| PlotError::UnknownPanel(panel_id.to_string()))?;
        let interaction = panel.layout().interaction;
        let (allowed, axis) = match method {
            DragMethod::Background => (interaction.drag_background_to_pan, AxisId::X),
            DragMethod::XTick => (interaction.drag_x_ticks_to_scale, AxisId::X),
            DragMethod::Y1Tick => (interaction.drag_y1_ticks_to_scale, AxisId::Y1),
            DragMethod::Y2Tick => (interaction.drag_y2_ticks_to_scale, AxisId::Y2),
        };
        if !allowed || !self.can_interact(None) {
            return Ok(false);
        }
        let linked_panel_ids = self.linked_panel_ids(panel_id, axis);
        *self.ctx.interaction.write() = Interaction {
            panel_id: Some(panel_id.to_string()),
            linked_panel_ids,
            dragging: Some(Dragging {
                method,
                start_x: x,
                start_y: y,
                dragged_x: 0.0,
                dragged_y: 0.0,
                modifier_held,
            }),
            zooming: None,
        };
        debug!(plot = %self.id, panel = %panel_id, ?method, "drag started");
        Ok(true)
    }

    /// Updates the live drag with the pointer at `(x, y)` and re-renders the panels
    /// it involves.
    pub fn drag_to(&mut self, x: f64, y: f64) {
        let (panel_id, linked) = {
            let mut interaction = self.ctx.interaction.write();
            let Some(panel_id) = interaction.panel_id.clone() else {
                return;
            };
            let Some(drag) = interaction.dragging.as_mut() else {
                return;
            };
            drag.dragged_x = x - drag.start_x;
            drag.dragged_y = y - drag.start_y;
            (panel_id, interaction.linked_panel_ids.clone())
        };
        self.render_involved(&panel_id, &linked);
    }

    /// Ends the drag. An x gesture pins the x bounds of every involved layer and
    /// commits the region; a y gesture pins the dragged y axis and re-renders.
    pub async fn stop_drag(&mut self) -> Result<()> {
        let interaction = self.interaction();
        let (Some(drag), Some(panel_id)) = (interaction.dragging, interaction.panel_id) else {
            return Ok(());
        };
        let linked = interaction.linked_panel_ids;
        self.ctx.interaction.write().clear();
        let Some(source) = self.panels.get(&panel_id) else {
            return Ok(());
        };
        let targets: Vec<String> = std::iter::once(panel_id.clone()).chain(linked).collect();
        debug!(plot = %self.id, panel = %panel_id, method = ?drag.method, "drag stopped");

        if drag.method.is_x() {
            if drag.dragged_x == 0.0 {
                return Ok(());
            }
            let Some(extent) = source.extent(AxisId::X) else {
                return Ok(());
            };
            let region = AxisRange::new(extent.min.round(), extent.max.round());
            for id in &targets {
                if let Some(panel) = self.panels.get_mut(id) {
                    panel.pin_axis(AxisId::X, region);
                }
            }
            let mut changes = Map::new();
            changes.insert("start".into(), integral_value(region.min));
            changes.insert("end".into(), integral_value(region.max));
            return self.apply_state(changes).await;
        }

        if drag.dragged_y == 0.0 {
            return Ok(());
        }
        let axis = if drag.method == DragMethod::Y1Tick {
            AxisId::Y1
        } else {
            AxisId::Y2
        };
        let Some(extent) = source.extent(axis) else {
            return Ok(());
        };
        for id in &targets {
            if let Some(panel) = self.panels.get_mut(id) {
                panel.pin_axis(axis, extent);
                panel.render();
            }
        }
        Ok(())
    }

    /// Handles a wheel event over a panel at plot x coordinate `center_x`.
    ///
    /// Without shift or alt held this only shows a hint, which [`Plot::poll_zoom`]
    /// takes down after `ZOOM_HINT_DURATION`. Otherwise the zoom is
    /// previewed on the panel and its x-linked panels, and the commit is pushed
    /// back to `now + ZOOM_DEBOUNCE`; [`Plot::poll_zoom`] applies it.
    pub fn wheel(
        &mut self,
        panel_id: &str,
        delta: f64,
        center_x: f64,
        modifier_held: bool,
        now: Instant,
    ) -> Result<bool> {
        let can_interact = self.can_interact(Some(panel_id));
        let panel = self.panel_or_err(panel_id)?;
        if !panel.layout().interaction.scroll_to_zoom {
            return Ok(false);
        }
        if !modifier_held {
            if can_interact {
                panel.show_loader(ZOOM_HINT);
                self.hint_deadlines
                    .insert(panel_id.to_string(), now + ZOOM_HINT_DURATION);
            }
            return Ok(false);
        }
        if !can_interact {
            return Ok(false);
        }
        let Some(scale) = ViewController::wheel_zoom_scale(delta) else {
            return Ok(false);
        };
        panel.hide_loader();
        self.hint_deadlines.shift_remove(panel_id);
        let linked_panel_ids = self.linked_panel_ids(panel_id, AxisId::X);
        *self.ctx.interaction.write() = Interaction {
            panel_id: Some(panel_id.to_string()),
            linked_panel_ids: linked_panel_ids.clone(),
            dragging: None,
            zooming: Some(Zooming {
                scale,
                center: center_x,
            }),
        };
        self.render_involved(panel_id, &linked_panel_ids);
        self.zoom_deadlines
            .insert(panel_id.to_string(), now + ZOOM_DEBOUNCE);
        debug!(plot = %self.id, panel = %panel_id, scale, "zoom step");
        Ok(true)
    }

    pub fn zoom_pending(&self) -> bool {
        !self.zoom_deadlines.is_empty()
    }

    /// The earliest instant at which [`Plot::poll_zoom`] has work to do.
    pub fn next_zoom_deadline(&self) -> Option<Instant> {
        self.zoom_deadlines
            .values()
            .chain(self.hint_deadlines.values())
            .min()
            .copied()
    }

    /// Commits every zoom whose quiet period has elapsed by `now`, and takes down
    /// expired zoom hints. Returns true if a zoom was committed.
    pub async fn poll_zoom(&mut self, now: Instant) -> Result<bool> {
        self.expire_hints(now);
        let due: Vec<String> = self
            .zoom_deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        if due.is_empty() {
            return Ok(false);
        }
        for id in due {
            self.zoom_deadlines.shift_remove(&id);
            self.ctx.interaction.write().clear();
            let Some(extent) = self.panels.get(&id).and_then(|p| p.extent(AxisId::X)) else {
                continue;
            };
            debug!(plot = %self.id, panel = %id, start = extent.min, end = extent.max, "zoom committed");
            let mut changes = Map::new();
            changes.insert("start".into(), integral_value(extent.min.round()));
            changes.insert("end".into(), integral_value(extent.max.round()));
            self.apply_state(changes).await?;
        }
        Ok(true)
    }

    fn expire_hints(&mut self, now: Instant) {
        let panels = &mut self.panels;
        self.hint_deadlines.retain(|id, deadline| {
            if *deadline > now {
                return true;
            }
            if let Some(panel) = panels.get_mut(id) {
                if panel.loader() == Some(ZOOM_HINT) {
                    panel.hide_loader();
                }
            }
            false
        });
    }

    // State

    /// Merges `changes` into the plot state and remaps every panel concurrently.
    ///
    /// Region changes are constrained first. Interaction is blocked while data
    /// loads. Emits `data_requested`, then `layout_changed`, `data_rendered`,
    /// `state_changed`, and `region_changed` when the region was touched.
    pub async fn apply_state(&mut self, changes: Map<String, Value>) -> Result<()> {
        let mut mods = Map::new();
        {
            let state = self.ctx.state.read();
            for key in ["chr", "start", "end"] {
                if let Some(value) = state.get(key) {
                    mods.insert(key.into(), value.clone());
                }
            }
        }
        for (key, value) in &changes {
            mods.insert(key.clone(), value.clone());
        }
        let (min_scale, max_scale) = self.ctx.region_scale_bounds();
        constrain_region(&mut mods, min_scale, max_scale);
        self.ctx.state.write().apply(&mods);

        self.ctx.hub.emit("data_requested", ())?;
        self.ctx.loading_data.store(true, Ordering::SeqCst);
        let statuses = join_all(self.panels.values_mut().map(|panel| panel.re_map())).await;
        self.ctx.loading_data.store(false, Ordering::SeqCst);
        for status in &statuses {
            if let RemapStatus::Failed(message) = status {
                warn!(plot = %self.id, "panel failed to load: {}", message);
            }
        }

        self.ctx.hub.emit("layout_changed", ())?;
        self.ctx.hub.emit("data_rendered", ())?;
        self.ctx
            .hub
            .emit("state_changed", Value::Object(changes.clone()))?;
        if ["chr", "start", "end"].iter().any(|key| changes.contains_key(*key)) {
            let state = self.state();
            let region = json!({
                "chr": state.get("chr").cloned().unwrap_or(Value::Null),
                "start": state.get("start").cloned().unwrap_or(Value::Null),
                "end": state.get("end").cloned().unwrap_or(Value::Null),
            });
            self.ctx.hub.emit("region_changed", region)?;
        }
        Ok(())
    }

    /// First load: stacks the panels and remaps all of them.
    pub async fn initialize(&mut self) -> Result<()> {
        self.position_panels();
        self.initialized = true;
        self.apply_state(Map::new()).await
    }

    pub async fn remap_panel(&mut self, id: &str) -> Result<RemapStatus> {
        let panel = self.panel_or_err(id)?;
        Ok(panel.re_map().await)
    }

    /// Resizes a panel to fit its data and restacks the plot.
    pub fn scale_panel_height_to_data(&mut self, id: &str, target: Option<f64>) -> Result<Option<f64>> {
        let height = self.panel_or_err(id)?.scale_height_to_data(target);
        if height.is_some() {
            self.position_panels();
        }
        Ok(height)
    }

    // Toolbar

    fn widget_context<'a>(&'a self, state: &'a PlotState, panel_id: Option<&'a str>) -> WidgetContext<'a> {
        let (min_region_scale, max_region_scale) = self.ctx.region_scale_bounds();
        let panel = panel_id.and_then(|id| {
            let y_index = self.panel_ids_by_y_index.iter().position(|p| p == id)?;
            Some(PanelSlot {
                id,
                y_index,
                panel_count: self.panel_ids_by_y_index.len(),
            })
        });
        WidgetContext {
            state,
            min_region_scale,
            max_region_scale,
            panel,
        }
    }

    fn toolbar_for(&self, panel_id: Option<&str>) -> Result<&Toolbar> {
        match panel_id {
            None => Ok(&self.toolbar),
            Some(id) => self
                .panels
                .get(id)
                .map(Panel::toolbar)
                .ok_or_else(|| PlotError::UnknownPanel(id.to_string())),
        }
    }

    /// How the plot toolbar, or a panel's with `Some(panel_id)`, should look now.
    pub fn toolbar_views(&self, panel_id: Option<&str>) -> Result<Vec<WidgetView>> {
        let state = self.state();
        let ctx = self.widget_context(&state, panel_id);
        Ok(self.toolbar_for(panel_id)?.views(&ctx))
    }

    /// Clicks widget `index` and carries out its action. Returns false when the
    /// widget did nothing.
    pub async fn click_widget(&mut self, panel_id: Option<&str>, index: usize) -> Result<bool> {
        let state = self.state();
        let action = {
            let ctx = self.widget_context(&state, panel_id);
            self.toolbar_for(panel_id)?.click(index, &ctx)?
        };
        let Some(action) = action else {
            return Ok(false);
        };
        debug!(plot = %self.id, ?action, "widget action");
        match action {
            WidgetAction::ApplyState(changes) => self.apply_state(changes).await?,
            WidgetAction::MovePanelUp(id) => {
                self.move_panel_up(&id)?;
            }
            WidgetAction::MovePanelDown(id) => {
                self.move_panel_down(&id)?;
            }
            WidgetAction::RemovePanel(id) => self.remove_panel(&id)?,
            WidgetAction::ScaleHeightToData(id) => {
                self.scale_panel_height_to_data(&id, None)?;
            }
        }
        Ok(true)
    }

    // Output

    /// Re-renders every initialized panel and returns the whole plot.
    pub fn render(&mut self) -> SvgNode {
        for id in &self.panel_ids_by_y_index {
            if let Some(panel) = self.panels.get_mut(id) {
                if panel.is_initialized() {
                    panel.render();
                }
            }
        }
        self.to_svg()
    }

    /// The plot as last rendered, panels in vertical order.
    pub fn to_svg(&self) -> SvgNode {
        let mut svg = SvgNode::new("svg")
            .attr("id", format!("{}_svg", self.id))
            .attr("class", "lz-locuszoom")
            .attr("xmlns", "http://www.w3.org/2000/svg")
            .attr("width", self.ctx.plot_width())
            .attr("height", self.total_height);
        for id in &self.panel_ids_by_y_index {
            if let Some(node) = self.panels.get(id).and_then(Panel::svg) {
                svg.push(node);
            }
        }
        svg
    }
}

impl std::fmt::Debug for Plot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plot")
            .field("id", &self.id)
            .field("panels", &self.panel_ids_by_y_index)
            .field("initialized", &self.initialized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constrain_region_orders_and_clamps() {
        let mut changes = Map::new();
        changes.insert("start".into(), json!(500.7));
        changes.insert("end".into(), json!(-3));
        constrain_region(&mut changes, None, None);
        assert_eq!(changes["start"], json!(1));
        assert_eq!(changes["end"], json!(500));
    }

    #[test]
    fn test_constrain_region_respects_max_scale() {
        let mut changes = Map::new();
        changes.insert("start".into(), json!(1000));
        changes.insert("end".into(), json!(5000));
        constrain_region(&mut changes, None, Some(1000.0));
        assert_eq!(changes["start"], json!(2500));
        assert_eq!(changes["end"], json!(3500));
    }
}

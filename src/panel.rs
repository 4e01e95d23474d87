//! A panel: one horizontally-stacked region of a plot with its own x/y1/y2 axes.
//!
//! The panel aggregates extents from its data layers, builds the scales for the
//! current render (shifted while a drag or zoom gesture involves it), draws its
//! axes and layers into an [`SvgNode`], and runs the fetch-then-render cycle.

use futures_util::future::join_all;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::{debug, error, warn};

use crate::axis_renderer::{AxisPlacement, AxisRenderer};
use crate::data_layers::{DataLayer, LayerContext, LayerFetch};
use crate::data_types::{
    AxisDim, AxisId, AxisRange, DragMethod, ElementStatus, PanelLayout, Point, Record, Tick,
};
use crate::error::{PlotError, Result};
use crate::events::{EventContext, EventHub, EventPayload, ListenerId};
use crate::field::parse_fields;
use crate::layout::{merge, LayoutHandle};
use crate::plot::PlotContext;
use crate::scales::{pretty_ticks, ChartScale, TickClip};
use crate::svg::{translate, SvgNode};
use crate::toolbar::{Toolbar, WidgetScope};
use crate::transform::PlotTransform;
use crate::utils::{as_number, integral_value, number_value};
use crate::view_controller::ViewController;

pub const LOADING_MESSAGE: &str = "Loading...";
pub const ZOOM_HINT: &str = "Press [SHIFT] or [ALT] while scrolling to zoom";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelLifecycle {
    Unattached,
    LayoutInitialized,
    FirstRenderPending,
    Initialized,
    Destroyed,
}

/// Outcome of completing a remap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemapStatus {
    Rendered,
    /// A layer fetch failed; the message is shown on the curtain.
    Failed(String),
    /// A newer remap started after this one; its results were dropped.
    Stale,
}

/// Fetches started by [`Panel::begin_remap`], tagged with the remap generation.
pub struct RemapBatch {
    generation: u64,
    fetches: Vec<(String, LayerFetch)>,
}

impl RemapBatch {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Waits for every fetch. A failing fetch does not cut the others short.
    pub async fn settle(self) -> SettledRemap {
        let (ids, fetches): (Vec<String>, Vec<LayerFetch>) = self.fetches.into_iter().unzip();
        let results = join_all(fetches).await;
        SettledRemap {
            generation: self.generation,
            results: ids.into_iter().zip(results).collect(),
        }
    }
}

pub struct SettledRemap {
    generation: u64,
    results: Vec<(String, eyre::Result<Vec<Record>>)>,
}

impl SettledRemap {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Shrinks a pair of opposing margins so they fit in `available`.
fn shrink_to_fit(a: f64, b: f64, available: f64) -> (f64, f64) {
    let mut a = a;
    let mut b = b;
    if a + b > available {
        let extra = ((a + b - available) / 2.0).ceil();
        a -= extra;
        b -= extra;
    }
    a = a.max(0.0);
    b = b.max(0.0);
    if a + b > available {
        a = a.min(available.max(0.0));
        b = (available - a).max(0.0);
    }
    (a, b)
}

fn valid_dimension(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

pub struct Panel {
    id: String,
    layout: LayoutHandle,
    ctx: PlotContext,
    hub: EventHub,
    lifecycle: PanelLifecycle,
    data_layers: IndexMap<String, Box<dyn DataLayer>>,
    data_layer_ids_by_z_index: Vec<String>,
    extents: [Option<AxisRange>; 3],
    scales: [Option<ChartScale>; 3],
    ticks: [Vec<Tick>; 3],
    toolbar: Toolbar,
    remap_generation: u64,
    curtain: Option<String>,
    loader: Option<String>,
    last_render: Option<SvgNode>,
}

impl Panel {
    /// Builds a panel over the layout already stored at `layout`.
    ///
    /// The stored layout is replaced by its merge over [`PanelLayout::default`], and
    /// every layer listed under `data_layers` is constructed.
    pub fn new(layout: LayoutHandle, ctx: PlotContext) -> Result<Self> {
        let raw = layout.get();
        if !raw.is_object() {
            return Err(PlotError::InvalidLayout("panel layout must be an object".into()));
        }
        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or(PlotError::MissingId("Panel"))?
            .to_string();

        let defaults = serde_json::to_value(PanelLayout::default())?;
        let mut merged = merge(&raw, &defaults);
        for axis in AxisId::ALL {
            let requested = raw.pointer(&format!("/axes/{}", axis));
            let render = match requested {
                Some(Value::Object(config)) => {
                    !config.is_empty() && config.get("render") != Some(&Value::Bool(false))
                }
                _ => false,
            };
            if let Some(axis_layout) = merged
                .pointer_mut(&format!("/axes/{}", axis))
                .and_then(Value::as_object_mut)
            {
                axis_layout.insert("render".into(), Value::Bool(render));
            }
        }
        layout.replace(merged);

        let typed: PanelLayout = layout.read()?;
        let toolbar = Toolbar::from_layout(
            &typed.toolbar.widgets,
            WidgetScope::Panel(id.clone()),
            &ctx.registries.widgets,
        )?;
        {
            let mut state = ctx.state.write();
            if state.get(&id).is_none() {
                state.set(id.clone(), Value::Object(Map::new()));
            }
        }
        let base_id = format!("{}.{}", ctx.plot_id, id);
        let hub = EventHub::child(base_id, &ctx.hub);

        let mut panel = Self {
            id,
            layout,
            ctx,
            hub,
            lifecycle: PanelLifecycle::Unattached,
            data_layers: IndexMap::new(),
            data_layer_ids_by_z_index: Vec::new(),
            extents: [None; 3],
            scales: [None; 3],
            ticks: Default::default(),
            toolbar,
            remap_generation: 0,
            curtain: None,
            loader: None,
            last_render: None,
        };
        if typed.height < typed.min_height {
            panel.layout.set_path("/height", integral_value(typed.min_height));
        }
        panel.update_cliparea();
        for layer_layout in typed.data_layers {
            panel.add_data_layer(layer_layout)?;
        }
        panel.lifecycle = PanelLifecycle::LayoutInitialized;
        Ok(panel)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `plot_id.panel_id`, the prefix of every SVG id this panel renders.
    pub fn base_id(&self) -> String {
        format!("{}.{}", self.ctx.plot_id, self.id)
    }

    pub fn layout(&self) -> PanelLayout {
        self.layout.read().unwrap_or_default()
    }

    pub fn layout_handle(&self) -> &LayoutHandle {
        &self.layout
    }

    pub fn lifecycle(&self) -> PanelLifecycle {
        self.lifecycle
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle == PanelLifecycle::Initialized
    }

    pub fn extent(&self, axis: AxisId) -> Option<AxisRange> {
        self.extents[axis.index()]
    }

    pub fn scale(&self, axis: AxisId) -> Option<ChartScale> {
        self.scales[axis.index()]
    }

    /// Ticks drawn on `axis` by the last render.
    pub fn ticks(&self, axis: AxisId) -> &[Tick] {
        &self.ticks[axis.index()]
    }

    pub fn curtain(&self) -> Option<&str> {
        self.curtain.as_deref()
    }

    pub fn loader(&self) -> Option<&str> {
        self.loader.as_deref()
    }

    pub fn toolbar(&self) -> &Toolbar {
        &self.toolbar
    }

    pub fn last_render(&self) -> Option<&SvgNode> {
        self.last_render.as_ref()
    }

    pub fn remap_generation(&self) -> u64 {
        self.remap_generation
    }

    /// Absolute position of the panel's top-left corner on the page.
    pub fn page_origin(&self) -> Point {
        let plot = self.ctx.page_origin();
        let origin = self.layout().origin;
        Point {
            x: plot.x + origin.x,
            y: plot.y + origin.y.unwrap_or(0.0),
        }
    }

    pub(crate) fn repoint(&self, pointer: String) {
        self.layout.repoint(pointer);
        self.repoint_layers();
    }

    // Events

    pub fn on<F>(&self, event: &str, handler: F) -> Result<ListenerId>
    where
        F: Fn(&EventContext) + Send + Sync + 'static,
    {
        self.hub.on(event, handler)
    }

    pub fn off(&self, event: &str, id: Option<ListenerId>) -> Result<()> {
        self.hub.off(event, id)
    }

    pub fn emit(&self, event: &str, payload: impl Into<EventPayload>) -> Result<()> {
        self.hub.emit(event, payload)
    }

    fn notify(&self, event: &str, payload: impl Into<EventPayload>) {
        if let Err(e) = self.hub.emit(event, payload) {
            warn!(panel = %self.id, event, "event could not be emitted: {}", e);
        }
    }

    // Geometry

    fn update_cliparea(&self) {
        let layout = self.layout();
        let plot_width = self.ctx.plot_width();
        let margin = layout.margin;
        self.layout.set_path(
            "/cliparea/width",
            number_value((plot_width - (margin.left + margin.right)).max(0.0)),
        );
        self.layout.set_path(
            "/cliparea/height",
            number_value((layout.height - (margin.top + margin.bottom)).max(0.0)),
        );
    }

    /// Sets the plot width and this panel's height. Height never drops below
    /// `min_height`; the call is ignored unless both values are finite and
    /// non-negative. The clip area is recomputed either way.
    pub fn set_dimensions(&mut self, width: f64, height: f64) {
        if valid_dimension(width) && valid_dimension(height) {
            self.ctx.set_plot_width(width.round());
            let min_height = self.layout().min_height;
            self.layout
                .set_path("/height", integral_value(height.round().max(min_height)));
        }
        self.update_cliparea();
        if self.is_initialized() {
            self.render();
        }
    }

    /// Moves the panel. Invalid coordinates leave the previous value in place.
    pub fn set_origin(&mut self, x: f64, y: f64) {
        if valid_dimension(x) {
            self.layout.set_path("/origin/x", integral_value(x.round()));
        }
        if valid_dimension(y) {
            self.layout.set_path("/origin/y", integral_value(y.round()));
        }
        if self.is_initialized() {
            self.render();
        }
    }

    /// Sets margins, ignoring negative or non-finite values. Margins that would not
    /// fit the panel height or plot width are shrunk evenly from both sides.
    pub fn set_margin(&mut self, top: f64, right: f64, bottom: f64, left: f64) {
        let layout = self.layout();
        let mut margin = layout.margin;
        for (slot, value) in [
            (&mut margin.top, top),
            (&mut margin.right, right),
            (&mut margin.bottom, bottom),
            (&mut margin.left, left),
        ] {
            if valid_dimension(value) {
                *slot = value.round();
            }
        }
        (margin.top, margin.bottom) = shrink_to_fit(margin.top, margin.bottom, layout.height);
        (margin.left, margin.right) =
            shrink_to_fit(margin.left, margin.right, self.ctx.plot_width());

        self.layout.set_path(
            "/margin",
            json!({
                "top": integral_value(margin.top),
                "right": integral_value(margin.right),
                "bottom": integral_value(margin.bottom),
                "left": integral_value(margin.left),
            }),
        );
        self.update_cliparea();
        self.layout
            .set_path("/cliparea/origin", json!({"x": integral_value(margin.left), "y": integral_value(margin.top)}));
        if self.is_initialized() {
            self.render();
        }
    }

    pub fn set_title(&mut self, text: &str) {
        self.layout.set_path("/title/text", Value::String(text.to_string()));
        if self.is_initialized() {
            self.render();
        }
    }

    // Data layers

    fn layer_layout_index(&self, id: &str) -> Option<usize> {
        self.layout
            .get_path("/data_layers")?
            .as_array()?
            .iter()
            .position(|layer| layer.get("id").and_then(Value::as_str) == Some(id))
    }

    fn repoint_layers(&self) {
        let base = self.layout.pointer();
        for (id, layer) in &self.data_layers {
            if let Some(idx) = self.layer_layout_index(id) {
                layer
                    .layout_handle()
                    .repoint(format!("{}/data_layers/{}", base, idx));
            }
        }
    }

    fn apply_data_layer_z_indexes(&self) {
        for (z_index, id) in self.data_layer_ids_by_z_index.iter().enumerate() {
            if let Some(layer) = self.data_layers.get(id) {
                layer.layout_handle().set_path("/z_index", json!(z_index));
            }
        }
    }

    /// Creates a layer from its layout and places it in the z-order.
    ///
    /// An explicit `z_index` is spliced in (negative values count back from the
    /// top) and the other layers are renumbered; otherwise the layer goes on top.
    pub fn add_data_layer(&mut self, layout: Value) -> Result<&mut dyn DataLayer> {
        let Value::Object(mut fields) = layout else {
            return Err(PlotError::InvalidLayout("data layer layout must be an object".into()));
        };
        let id = fields
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or(PlotError::MissingId("Data layer"))?
            .to_string();
        if self.data_layers.contains_key(&id) {
            return Err(PlotError::DuplicateId {
                kind: "data layer",
                id,
            });
        }
        let kind = fields
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| PlotError::InvalidDataLayerType(format!("missing type for {}", id)))?
            .to_string();
        let constructor = self
            .ctx
            .registries
            .data_layers
            .get(&kind)
            .map_err(|_| PlotError::InvalidDataLayerType(kind.clone()))?
            .clone();
        if let Some(y_axis) = fields.get_mut("y_axis").and_then(Value::as_object_mut) {
            let axis = y_axis.get("axis").and_then(Value::as_u64);
            if !matches!(axis, Some(1) | Some(2)) {
                y_axis.insert("axis".into(), json!(1));
            }
        }
        let requested_z = fields.get("z_index").and_then(Value::as_i64);
        let layout = Value::Object(fields);

        let (layout_idx, pushed) = match self.layer_layout_index(&id) {
            Some(idx) => {
                self.layout
                    .child(&format!("/data_layers/{}", idx))
                    .replace(layout);
                (idx, false)
            }
            None => {
                let idx = self.layout.update(|panel| match panel.get_mut("data_layers") {
                    Some(Value::Array(items)) => {
                        items.push(layout);
                        items.len() - 1
                    }
                    _ => {
                        if let Some(obj) = panel.as_object_mut() {
                            obj.insert("data_layers".into(), Value::Array(vec![layout]));
                        }
                        0
                    }
                });
                (idx, true)
            }
        };

        let context = LayerContext {
            id: id.clone(),
            panel_id: self.id.clone(),
            layout: self.layout.child(&format!("/data_layers/{}", layout_idx)),
            state: self.ctx.state.clone(),
            registries: self.ctx.registries.clone(),
            data_sources: self.ctx.data_sources.clone(),
            theme: self.ctx.theme.clone(),
        };
        let layer = match constructor(context) {
            Ok(layer) => layer,
            Err(e) => {
                if pushed {
                    let _ = self.layout.remove_from_array("/data_layers", layout_idx);
                }
                return Err(e);
            }
        };
        {
            let mut state = self.ctx.state.write();
            let state_id = layer.state_id();
            if state.get(&state_id).is_none() {
                state.set(state_id, Value::Object(Map::new()));
            }
        }
        self.data_layers.insert(id.clone(), layer);

        let order = &mut self.data_layer_ids_by_z_index;
        match requested_z {
            Some(z) if !order.is_empty() => {
                let len = order.len() as i64;
                let z = if z < 0 { (len + z).max(0) } else { z };
                order.insert((z as usize).min(order.len()), id.clone());
            }
            _ => order.push(id.clone()),
        }
        self.apply_data_layer_z_indexes();
        debug!(panel = %self.id, layer = %id, %kind, "data layer added");

        match self.data_layers.get_mut(&id) {
            Some(layer) => Ok(layer.as_mut()),
            None => Err(PlotError::UnknownDataLayer(id)),
        }
    }

    /// Deletes a layer, its layout entry and its state slice, then renumbers the rest.
    pub fn remove_data_layer(&mut self, id: &str) -> Result<()> {
        let mut layer = self
            .data_layers
            .shift_remove(id)
            .ok_or_else(|| PlotError::UnknownDataLayer(id.to_string()))?;
        layer.destroy_all_tooltips();
        if let Some(idx) = self.layer_layout_index(id) {
            self.layout.remove_from_array("/data_layers", idx)?;
        }
        self.ctx.state.write().remove(&layer.state_id());
        self.data_layer_ids_by_z_index.retain(|existing| existing != id);
        self.repoint_layers();
        self.apply_data_layer_z_indexes();
        if self.is_initialized() {
            self.render();
        }
        Ok(())
    }

    pub fn data_layer(&self, id: &str) -> Option<&dyn DataLayer> {
        self.data_layers.get(id).map(|layer| layer.as_ref())
    }

    pub fn data_layer_mut(&mut self, id: &str) -> Option<&mut (dyn DataLayer + 'static)> {
        self.data_layers.get_mut(id).map(|layer| layer.as_mut())
    }

    pub fn data_layer_ids_by_z_index(&self) -> &[String] {
        &self.data_layer_ids_by_z_index
    }

    /// Reorders layers by the `z_index` stored in their layouts, then renumbers.
    pub fn resort_data_layers(&mut self) {
        let layers = &self.data_layers;
        self.data_layer_ids_by_z_index.sort_by_key(|id| {
            layers
                .get(id)
                .and_then(|layer| layer.layout().z_index)
                .unwrap_or(i64::MAX)
        });
        self.apply_data_layer_z_indexes();
        if self.is_initialized() {
            self.render();
        }
    }

    /// Swaps a layer with the one above it. Returns false at the top.
    pub fn move_data_layer_forward(&mut self, id: &str) -> Result<bool> {
        let pos = self.z_position(id)?;
        if pos + 1 >= self.data_layer_ids_by_z_index.len() {
            return Ok(false);
        }
        self.data_layer_ids_by_z_index.swap(pos, pos + 1);
        self.resort_after_move();
        Ok(true)
    }

    /// Swaps a layer with the one below it. Returns false at the bottom.
    pub fn move_data_layer_back(&mut self, id: &str) -> Result<bool> {
        let pos = self.z_position(id)?;
        if pos == 0 {
            return Ok(false);
        }
        self.data_layer_ids_by_z_index.swap(pos, pos - 1);
        self.resort_after_move();
        Ok(true)
    }

    fn z_position(&self, id: &str) -> Result<usize> {
        self.data_layer_ids_by_z_index
            .iter()
            .position(|existing| existing == id)
            .ok_or_else(|| PlotError::UnknownDataLayer(id.to_string()))
    }

    fn resort_after_move(&mut self) {
        self.apply_data_layer_z_indexes();
        if self.is_initialized() {
            self.render();
        }
    }

    // Element status

    pub fn set_all_element_status(&mut self, status: ElementStatus, toggle: bool) {
        for id in &self.data_layer_ids_by_z_index {
            if let Some(layer) = self.data_layers.get_mut(id) {
                layer.set_all_element_status(status, toggle);
            }
        }
        if self.is_initialized() {
            self.render();
        }
    }

    /// Status change by verb: `highlight`, `select`, `fade` or `hide`.
    pub fn apply_status_verb(&mut self, verb: &str, toggle: bool) -> Result<()> {
        let status = ElementStatus::from_verb(verb)
            .ok_or_else(|| PlotError::InvalidLayout(format!("unknown element status verb: {}", verb)))?;
        self.set_all_element_status(status, toggle);
        Ok(())
    }

    pub fn highlight_all_elements(&mut self, toggle: bool) {
        self.set_all_element_status(ElementStatus::Highlighted, toggle);
    }

    pub fn select_all_elements(&mut self, toggle: bool) {
        self.set_all_element_status(ElementStatus::Selected, toggle);
    }

    pub fn fade_all_elements(&mut self, toggle: bool) {
        self.set_all_element_status(ElementStatus::Faded, toggle);
    }

    pub fn hide_all_elements(&mut self, toggle: bool) {
        self.set_all_element_status(ElementStatus::Hidden, toggle);
    }

    pub fn clear_selections(&mut self) {
        self.set_all_element_status(ElementStatus::Selected, false);
    }

    // Extents and ticks

    /// Recomputes the x/y1/y2 extents from scratch.
    ///
    /// Every non-decoupled layer's extent is folded in; `axes.x.extent = "state"`
    /// replaces the x extent with the plot region.
    pub fn generate_extents(&mut self) {
        self.extents = [None; 3];
        for id in &self.data_layer_ids_by_z_index {
            let Some(layer) = self.data_layers.get(id) else {
                continue;
            };
            let layout = layer.layout();
            if !layout.x_axis.decoupled {
                if let Some(extent) = layer.axis_extent(AxisDim::X).filter(AxisRange::is_finite) {
                    let slot = &mut self.extents[AxisId::X.index()];
                    *slot = Some(slot.map_or(extent, |e| e.union(extent)));
                }
            }
            if !layout.y_axis.decoupled {
                let axis = AxisId::from_y_number(layout.y_axis.axis.unwrap_or(1)).unwrap_or(AxisId::Y1);
                if let Some(extent) = layer.axis_extent(AxisDim::Y).filter(AxisRange::is_finite) {
                    let slot = &mut self.extents[axis.index()];
                    *slot = Some(slot.map_or(extent, |e| e.union(extent)));
                }
            }
        }
        if self.layout().axes.x.extent.as_deref() == Some("state") {
            self.extents[AxisId::X.index()] = self.ctx.state.read().region();
        }
    }

    /// Ticks for `axis`.
    ///
    /// A literal `ticks` array wins. A `ticks` object is a base configuration:
    /// every layer is asked for suggestions, and each suggested label is laid over
    /// the base configuration, the suggestion's own keys taking precedence.
    /// Otherwise ticks are derived from the extent.
    pub fn generate_ticks(&self, axis: AxisId) -> Vec<Tick> {
        let layout = self.layout();
        match &layout.axes.get(axis).ticks {
            Some(Value::Array(items)) => {
                return items.iter().filter_map(Tick::from_value).collect();
            }
            Some(Value::Object(base)) => {
                let mut config = Map::new();
                if let Some(position) = base.get("position") {
                    config.insert("position".into(), position.clone());
                }
                let mut base_style = base.clone();
                base_style.shift_remove("position");
                let base_style = Value::Object(base_style);

                let mut combined = Vec::new();
                for id in &self.data_layer_ids_by_z_index {
                    let Some(layer) = self.data_layers.get(id) else {
                        continue;
                    };
                    for tick in layer.ticks(axis, &config) {
                        combined.push(match tick {
                            Tick::Value(v) => Tick::Value(v),
                            Tick::Label(label) => serde_json::to_value(&label)
                                .ok()
                                .map(|suggested| merge(&suggested, &base_style))
                                .and_then(|merged| Tick::from_value(&merged))
                                .unwrap_or(Tick::Label(label)),
                        });
                    }
                }
                return combined;
            }
            _ => {}
        }
        match self.extents[axis.index()] {
            Some(extent) => pretty_ticks(extent, TickClip::Both, 5)
                .into_iter()
                .map(Tick::Value)
                .collect(),
            None => Vec::new(),
        }
    }

    // Rendering

    fn nominal_range(layout: &PanelLayout, axis: AxisId) -> (f64, f64) {
        let clip = &layout.cliparea;
        let (start, end) = match axis {
            AxisId::X => (0.0, clip.width),
            AxisId::Y1 | AxisId::Y2 => (clip.height, 0.0),
        };
        match &layout.axes.get(axis).range {
            // A zero override falls back to the default, as an unset one does.
            Some(range) => (
                range.start.filter(|v| *v != 0.0).unwrap_or(start),
                range.end.filter(|v| *v != 0.0).unwrap_or(end),
            ),
            None => (start, end),
        }
    }

    /// Pixel ranges displaced by the gesture in progress, if it involves this panel.
    fn shifted_ranges(&self, layout: &PanelLayout, nominal: &[(f64, f64); 3]) -> [(f64, f64); 3] {
        let mut shifted = *nominal;
        let interaction = self.ctx.interaction.read().clone();
        if !interaction.involves(&self.id) {
            return shifted;
        }
        let clip = &layout.cliparea;
        let margin = layout.margin;
        let origin_y = layout.origin.y.unwrap_or(0.0);
        let x = AxisId::X.index();

        if let Some(zoom) = interaction.zooming {
            if let (Some(previous), Some(extent)) = (self.scales[x], self.extents[x]) {
                let (min_scale, max_scale) = self.ctx.region_scale_bounds();
                let anchor = zoom.center - margin.left - layout.origin.x;
                let target = ViewController::zoom_target(
                    &previous, nominal[x], zoom.scale, anchor, min_scale, max_scale,
                );
                shifted[x] = ViewController::shifted_range_for(extent, target, nominal[x]);
            }
        } else if let Some(drag) = &interaction.dragging {
            match drag.method {
                DragMethod::Background => {
                    shifted[x] = ViewController::background_pan(clip.width, drag.dragged_x);
                }
                DragMethod::XTick if drag.modifier_held => {
                    shifted[x] = ViewController::background_pan(clip.width, drag.dragged_x);
                }
                DragMethod::XTick => {
                    let anchor = drag.start_x - margin.left - layout.origin.x;
                    shifted[x] = ViewController::x_tick_scale(clip.width, anchor, drag.dragged_x);
                }
                DragMethod::Y1Tick | DragMethod::Y2Tick => {
                    let axis = if drag.method == DragMethod::Y1Tick {
                        AxisId::Y1
                    } else {
                        AxisId::Y2
                    };
                    shifted[axis.index()] = if drag.modifier_held {
                        ViewController::y_tick_pan(clip.height, drag.dragged_y)
                    } else {
                        let anchor = clip.height - (drag.start_y - margin.top - origin_y);
                        ViewController::y_tick_scale(clip.height, anchor, drag.dragged_y)
                    };
                }
            }
        }
        shifted
    }

    /// Full render: extents, scales (shifted by any gesture in progress), axes,
    /// then every data layer in z-order.
    pub fn render(&mut self) -> &SvgNode {
        let layout = self.layout();
        let plot_width = self.ctx.plot_width();
        self.generate_extents();

        let nominal = AxisId::ALL.map(|axis| Self::nominal_range(&layout, axis));
        let shifted = self.shifted_ranges(&layout, &nominal);
        for axis in AxisId::ALL {
            let i = axis.index();
            self.scales[i] = None;
            if let Some(extent) = self.extents[i] {
                let adjusted = ViewController::adjusted_extent(extent, shifted[i], nominal[i]);
                self.extents[i] = Some(adjusted);
                self.scales[i] = Some(ChartScale::from_extent(adjusted, nominal[i]));
            }
        }

        let base_id = self.base_id();
        let margin = layout.margin;
        let theme = self.ctx.theme.clone();
        let mut container = SvgNode::group(format!("{}.panel_container", base_id))
            .attr("class", "lz-panel-container")
            .attr(
                "transform",
                translate(layout.origin.x, layout.origin.y.unwrap_or(0.0)),
            );
        container.push(
            SvgNode::new("clipPath").attr("id", format!("{}.clip", base_id)).child(
                SvgNode::new("rect")
                    .attr("width", plot_width)
                    .attr("height", layout.height),
            ),
        );

        let mut panel = SvgNode::group(format!("{}.panel", base_id))
            .attr("class", "lz-panel")
            .attr("clip-path", format!("url(#{}.clip)", base_id));
        panel.push(
            SvgNode::new("rect")
                .attr("class", "lz-panel-background")
                .attr("width", plot_width)
                .attr("height", layout.height)
                .attr("fill", &theme.background),
        );
        if let Some(stroke) = layout.extra.get("inner_border").and_then(Value::as_str) {
            panel.push(
                SvgNode::new("rect")
                    .attr("class", "lz-panel-inner-border")
                    .attr("x", margin.left)
                    .attr("y", margin.top)
                    .attr("width", plot_width - (margin.left + margin.right))
                    .attr("height", layout.height - (margin.top + margin.bottom))
                    .attr("stroke", stroke)
                    .attr("stroke-width", 1)
                    .attr("fill", "none"),
            );
        }
        if !layout.title.text.is_empty() {
            let state = self.ctx.state.read().as_map().clone();
            panel.push(
                SvgNode::new("text")
                    .attr("class", "lz-panel-title")
                    .attr("x", layout.title.x)
                    .attr("y", layout.title.y)
                    .attr("font-size", theme.title_size)
                    .with_text(parse_fields(&layout.title.text, &state)),
            );
        }

        let transform = PlotTransform {
            x_scale: self.scales[0],
            y1_scale: self.scales[1],
            y2_scale: self.scales[2],
            width: layout.cliparea.width,
            height: layout.cliparea.height,
        };
        let mut layers = SvgNode::group(format!("{}.data_layers", base_id))
            .attr("class", "lz-data-layers")
            .attr("transform", translate(margin.left, margin.top));
        for id in &self.data_layer_ids_by_z_index {
            if let Some(layer) = self.data_layers.get_mut(id) {
                layers.push(layer.render(&transform));
            }
        }
        panel.push(layers);
        container.push(panel);

        for axis in AxisId::ALL {
            if let Some(node) = self.render_axis(axis) {
                container.push(node);
            }
        }

        self.last_render.insert(container)
    }

    /// Draws one axis and records its ticks. Returns `None` when the axis is not
    /// rendered or its scale cannot place a value, as with an empty panel.
    pub fn render_axis(&mut self, axis: AxisId) -> Option<SvgNode> {
        let layout = self.layout();
        let config = layout.axes.get(axis);
        let scale = self.scales[axis.index()].filter(ChartScale::is_renderable)?;
        if !config.render {
            return None;
        }
        let ticks = self.generate_ticks(axis);
        self.ticks[axis.index()] = ticks.clone();

        let mut placement = AxisPlacement::for_panel(
            axis,
            &self.base_id(),
            self.ctx.plot_width(),
            layout.height,
            layout.margin,
            (layout.cliparea.width, layout.cliparea.height),
            config.label_offset.unwrap_or(0.0),
        );
        placement.format = config.tick_format.unwrap_or_default();
        if let Some(label) = &config.label {
            let state = self.ctx.state.read().as_map().clone();
            placement.label = Some(parse_fields(label, &state));
        }
        Some(AxisRenderer::render_axis(&placement, &scale, &ticks, &self.ctx.theme))
    }

    /// The last render with the curtain and loader laid over it.
    pub fn svg(&self) -> Option<SvgNode> {
        let mut node = self.last_render.clone()?;
        let layout = self.layout();
        let theme = &self.ctx.theme;
        if let Some(message) = &self.curtain {
            node.push(
                SvgNode::new("g")
                    .attr("class", "lz-curtain")
                    .child(
                        SvgNode::new("rect")
                            .attr("width", self.ctx.plot_width())
                            .attr("height", layout.height)
                            .attr("fill", &theme.curtain_background),
                    )
                    .child(
                        SvgNode::new("text")
                            .attr("x", layout.margin.left + 10.0)
                            .attr("y", layout.margin.top + 20.0)
                            .attr("fill", &theme.curtain_text)
                            .with_text(message.clone()),
                    ),
            );
        }
        if let Some(message) = &self.loader {
            node.push(
                SvgNode::new("text")
                    .attr("class", "lz-loader")
                    .attr("x", layout.margin.left + 10.0)
                    .attr("y", (layout.height - layout.margin.bottom - 10.0).max(0.0))
                    .attr("fill", &theme.loader_text)
                    .with_text(message.clone()),
            );
        }
        Some(node)
    }

    pub fn show_curtain(&mut self, message: impl Into<String>) {
        self.curtain = Some(message.into());
    }

    pub fn hide_curtain(&mut self) {
        self.curtain = None;
    }

    pub fn show_loader(&mut self, message: impl Into<String>) {
        self.loader = Some(message.into());
    }

    pub fn hide_loader(&mut self) {
        self.loader = None;
    }

    /// Height that would show every layer's data, plus margins. Resizes the panel
    /// and returns the new height; the plot restacks panels afterwards.
    pub fn scale_height_to_data(&mut self, target: Option<f64>) -> Option<f64> {
        let data_height = target
            .filter(|h| h.is_finite() && *h > 0.0)
            .or_else(|| {
                self.data_layer_ids_by_z_index
                    .iter()
                    .filter_map(|id| self.data_layers.get(id)?.absolute_data_height())
                    .filter(|h| h.is_finite() && *h > 0.0)
                    .reduce(f64::max)
            })?;
        let layout = self.layout();
        let height = data_height + layout.margin.top + layout.margin.bottom;
        self.set_dimensions(self.ctx.plot_width(), height);
        Some(self.layout().height)
    }

    // Remap

    /// Starts a fetch on every layer and bumps the remap generation.
    ///
    /// A layer that fails synchronously is logged and shown on the curtain; the
    /// other layers still fetch.
    pub fn begin_remap(&mut self) -> RemapBatch {
        self.remap_generation += 1;
        self.notify("data_requested", ());
        self.curtain = None;
        if self.layout().show_loading_indicator {
            self.loader = Some(LOADING_MESSAGE.to_string());
        }
        if self.lifecycle == PanelLifecycle::LayoutInitialized {
            self.lifecycle = PanelLifecycle::FirstRenderPending;
        }
        let mut fetches = Vec::with_capacity(self.data_layers.len());
        for id in &self.data_layer_ids_by_z_index {
            let Some(layer) = self.data_layers.get_mut(id) else {
                continue;
            };
            match layer.re_map() {
                Ok(fetch) => fetches.push((id.clone(), fetch)),
                Err(e) => {
                    error!(panel = %self.id, layer = %id, "data layer could not start a fetch: {:#}", e);
                    self.curtain = Some(e.to_string());
                }
            }
        }
        RemapBatch {
            generation: self.remap_generation,
            fetches,
        }
    }

    /// Installs the results of a settled remap and renders.
    ///
    /// Results from an older generation are dropped. If any fetch failed, the
    /// error goes on the curtain and the panel keeps its previous render.
    pub fn complete_remap(&mut self, settled: SettledRemap) -> RemapStatus {
        if settled.generation != self.remap_generation {
            debug!(
                panel = %self.id,
                generation = settled.generation,
                current = self.remap_generation,
                "discarding stale remap"
            );
            return RemapStatus::Stale;
        }
        self.loader = None;
        let mut failure = None;
        for (id, result) in settled.results {
            match result {
                Ok(records) => {
                    if let Some(layer) = self.data_layers.get_mut(&id) {
                        layer.receive_data(records);
                    }
                }
                Err(e) => {
                    error!(panel = %self.id, layer = %id, "data fetch failed: {:#}", e);
                    failure.get_or_insert_with(|| e.to_string());
                }
            }
        }
        if let Some(message) = failure {
            self.curtain = Some(message.clone());
            return RemapStatus::Failed(message);
        }
        self.lifecycle = PanelLifecycle::Initialized;
        self.render();
        self.notify("layout_changed", true);
        self.notify("data_rendered", ());
        RemapStatus::Rendered
    }

    /// Fetches for every layer, waits for all of them, then renders.
    pub async fn re_map(&mut self) -> RemapStatus {
        let batch = self.begin_remap();
        let settled = batch.settle().await;
        self.complete_remap(settled)
    }

    /// Pins every layer bound to `axis` to `extent`, as a finished drag does.
    pub(crate) fn pin_axis(&mut self, axis: AxisId, extent: AxisRange) {
        for id in &self.data_layer_ids_by_z_index {
            let Some(layer) = self.data_layers.get_mut(id) else {
                continue;
            };
            let bound = match axis.y_number() {
                None => true,
                Some(n) => layer.layout().y_axis.axis.unwrap_or(1) == n,
            };
            if bound {
                layer.set_axis_bounds(axis.dim(), Some(extent.min), Some(extent.max));
            }
        }
    }

    /// Tears down layer tooltips and state slices. The panel is unusable afterwards.
    pub(crate) fn destroy(&mut self) {
        let mut state = self.ctx.state.write();
        for layer in self.data_layers.values_mut() {
            layer.destroy_all_tooltips();
            state.remove(&layer.state_id());
        }
        drop(state);
        self.curtain = None;
        self.loader = None;
        self.lifecycle = PanelLifecycle::Destroyed;
    }

    pub(crate) fn y_index(&self) -> Option<i64> {
        self.layout.get_path("/y_index").as_ref().and_then(as_number).map(|v| v as i64)
    }
}

impl std::fmt::Debug for Panel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Panel")
            .field("id", &self.id)
            .field("lifecycle", &self.lifecycle)
            .field("data_layers", &self.data_layer_ids_by_z_index)
            .field("remap_generation", &self.remap_generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shrink_to_fit_splits_excess() {
        assert_eq!(shrink_to_fit(700.0, 900.0, 500.0), (150.0, 350.0));
        assert_eq!(shrink_to_fit(0.0, 1000.0, 500.0), (0.0, 500.0));
        assert_eq!(shrink_to_fit(10.0, 20.0, 500.0), (10.0, 20.0));
    }
}

use locus_plot::data_layers::{BaseDataLayer, DataLayerConstructor, LayerContext, LayerFetch};
use locus_plot::data_types::{
    AxisDim, AxisId, AxisRange, ElementStatus, Margin, Record, Tick, TickLabel,
};
use locus_plot::transform::PlotTransform;
use locus_plot::{
    ChartTheme, DataLayer, DataSources, LayoutHandle, Plot, PlotError, Registries, SvgNode,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;

fn plot_with(panel: serde_json::Value) -> Plot {
    Plot::new(
        "plot",
        json!({"width": 500, "state": {"chr": "1", "start": 1000, "end": 2000}, "panels": [panel]}),
        DataSources::new(),
    )
    .unwrap()
}

#[test]
fn test_height_never_below_min_height() {
    let mut plot = plot_with(json!({"id": "p", "height": 50, "min_height": 120}));
    assert_eq!(plot.panel("p").unwrap().layout().height, 120.0);

    let panel = plot.panel_mut("p").unwrap();
    panel.set_dimensions(500.0, 30.0);
    assert_eq!(panel.layout().height, 120.0);
    panel.set_dimensions(500.0, 300.0);
    assert_eq!(panel.layout().height, 300.0);
}

#[test]
fn test_invalid_dimensions_are_ignored() {
    let mut plot = plot_with(json!({"id": "p", "height": 200}));
    let panel = plot.panel_mut("p").unwrap();
    panel.set_dimensions(f64::NAN, 80.0);
    panel.set_dimensions(-10.0, 80.0);
    assert_eq!(panel.layout().height, 200.0);
}

#[test]
fn test_overlapping_margins_shrink_to_fit() {
    let mut plot = plot_with(json!({"id": "p", "height": 500}));
    let panel = plot.panel_mut("p").unwrap();
    panel.set_margin(700.0, 1000.0, 900.0, 800.0);
    let layout = panel.layout();
    assert_eq!(
        layout.margin,
        Margin { top: 150.0, right: 350.0, bottom: 350.0, left: 150.0 }
    );
    assert!(layout.margin.top + layout.margin.bottom <= layout.height);
    assert_eq!(layout.cliparea.width, 0.0);
    assert_eq!(layout.cliparea.height, 0.0);
}

#[test]
fn test_negative_margins_are_ignored() {
    let mut plot = plot_with(json!({"id": "p", "height": 300}));
    let panel = plot.panel_mut("p").unwrap();
    panel.set_margin(10.0, 20.0, 30.0, 40.0);
    panel.set_margin(-5.0, f64::NAN, 15.0, -1.0);
    let layout = panel.layout();
    assert_eq!(
        layout.margin,
        Margin { top: 10.0, right: 20.0, bottom: 15.0, left: 40.0 }
    );
    assert_eq!(layout.cliparea.width, 440.0);
    assert_eq!(layout.cliparea.height, 275.0);
    assert_eq!(layout.cliparea.origin.x, 40.0);
}

#[test]
fn test_axis_render_requires_a_non_empty_config() {
    let plot = plot_with(json!({
        "id": "p",
        "axes": {"x": {"label": "Position"}, "y1": {}, "y2": {"render": false, "label": "n"}},
    }));
    let axes = plot.panel("p").unwrap().layout().axes;
    assert!(axes.x.render);
    assert!(!axes.y1.render);
    assert!(!axes.y2.render);
}

#[test]
fn test_data_layer_z_index_splicing() {
    let mut plot = plot_with(json!({"id": "p"}));
    let panel = plot.panel_mut("p").unwrap();
    for id in ["a", "b", "c"] {
        panel
            .add_data_layer(json!({"id": id, "type": "points", "namespace": "assoc"}))
            .unwrap();
    }
    panel
        .add_data_layer(json!({"id": "d", "type": "points", "namespace": "assoc", "z_index": -1}))
        .unwrap();
    assert_eq!(panel.data_layer_ids_by_z_index(), ["a", "b", "d", "c"]);
    for (z, id) in ["a", "b", "d", "c"].iter().enumerate() {
        assert_eq!(panel.data_layer(id).unwrap().layout().z_index, Some(z as i64));
    }

    panel.remove_data_layer("b").unwrap();
    assert_eq!(panel.data_layer_ids_by_z_index(), ["a", "d", "c"]);
    assert_eq!(panel.data_layer("c").unwrap().layout().z_index, Some(2));
    assert_eq!(panel.layout().data_layers.len(), 3);
}

#[test]
fn test_data_layer_moves_stop_at_the_ends() {
    let mut plot = plot_with(json!({"id": "p"}));
    let panel = plot.panel_mut("p").unwrap();
    for id in ["a", "b"] {
        panel
            .add_data_layer(json!({"id": id, "type": "points", "namespace": "assoc"}))
            .unwrap();
    }
    assert!(!panel.move_data_layer_forward("b").unwrap());
    assert!(!panel.move_data_layer_back("a").unwrap());
    assert!(panel.move_data_layer_forward("a").unwrap());
    assert_eq!(panel.data_layer_ids_by_z_index(), ["b", "a"]);
    assert!(matches!(
        panel.move_data_layer_back("missing"),
        Err(PlotError::UnknownDataLayer(_))
    ));
}

#[test]
fn test_data_layer_validation() {
    let mut plot = plot_with(json!({"id": "p"}));
    let panel = plot.panel_mut("p").unwrap();
    assert!(matches!(
        panel.add_data_layer(json!({"type": "points"})),
        Err(PlotError::MissingId(_))
    ));
    assert!(matches!(
        panel.add_data_layer(json!({"id": "x", "type": "nope"})),
        Err(PlotError::InvalidDataLayerType(_))
    ));
    panel.add_data_layer(json!({"id": "x", "type": "points"})).unwrap();
    assert!(matches!(
        panel.add_data_layer(json!({"id": "x", "type": "points"})),
        Err(PlotError::DuplicateId { .. })
    ));
    assert!(panel.layout().data_layers.len() == 1);
}

#[test]
fn test_y_axis_binding_defaults_to_one() {
    let mut plot = plot_with(json!({"id": "p"}));
    let panel = plot.panel_mut("p").unwrap();
    panel
        .add_data_layer(json!({"id": "l", "type": "points", "y_axis": {"axis": 7}}))
        .unwrap();
    assert_eq!(panel.data_layer("l").unwrap().layout().y_axis.axis, Some(1));
}

#[test]
fn test_literal_ticks_win() {
    let plot = plot_with(json!({
        "id": "p",
        "axes": {"x": {"ticks": [1500, {"x": 1750, "text": "mid"}]}},
    }));
    let ticks = plot.panel("p").unwrap().generate_ticks(AxisId::X);
    assert_eq!(ticks.len(), 2);
    assert_eq!(ticks[0], Tick::Value(1500.0));
    assert_eq!(ticks[1].position(), 1750.0);
}

#[test]
fn test_state_slices_follow_layers() {
    let mut plot = plot_with(json!({"id": "p", "data_layers": [{"id": "l", "type": "points"}]}));
    assert!(plot.state().get("p").is_some());
    assert!(plot.state().get("p.l").is_some());
    plot.panel_mut("p").unwrap().remove_data_layer("l").unwrap();
    assert!(plot.state().get("p.l").is_none());
}

#[test]
fn test_resort_follows_layout_z_index() {
    let mut plot = plot_with(json!({"id": "p"}));
    let panel = plot.panel_mut("p").unwrap();
    for id in ["a", "b", "c"] {
        panel.add_data_layer(json!({"id": id, "type": "points"})).unwrap();
    }
    panel
        .data_layer("c")
        .unwrap()
        .layout_handle()
        .set_path("/z_index", json!(-1));
    panel.resort_data_layers();
    assert_eq!(panel.data_layer_ids_by_z_index(), ["c", "a", "b"]);
    assert_eq!(panel.data_layer("a").unwrap().layout().z_index, Some(1));
}

fn values(field: &str, offset: i64) -> Vec<Record> {
    (0..20)
        .filter_map(|i| json!({"assoc:pos": i, field: offset + i}).as_object().cloned())
        .collect()
}

#[test]
fn test_extents_union_layers_by_axis() {
    let mut plot = plot_with(json!({
        "id": "p",
        "height": 300,
        "axes": {"x": {"extent": "state"}, "y1": {"label": "p"}, "y2": {"label": "q"}},
        "data_layers": [
            {"id": "a", "type": "points", "x_axis": {"field": "assoc:pos"}, "y_axis": {"field": "assoc:p"}},
            {"id": "b", "type": "points", "x_axis": {"field": "assoc:pos"},
             "y_axis": {"field": "assoc:p", "decoupled": true}},
            {"id": "c", "type": "points", "x_axis": {"field": "assoc:pos"},
             "y_axis": {"field": "assoc:q", "axis": 2}},
        ],
    }));
    let panel = plot.panel_mut("p").unwrap();
    for (id, field, offset) in [("a", "assoc:p", 0), ("b", "assoc:p", 100), ("c", "assoc:q", 100)] {
        panel.data_layer_mut(id).unwrap().receive_data(values(field, offset));
    }

    panel.generate_extents();
    // The region replaces the layers' own x extent of [0, 19].
    assert_eq!(panel.extent(AxisId::X), Some(AxisRange::new(1000.0, 2000.0)));
    assert_eq!(panel.extent(AxisId::Y1), Some(AxisRange::new(0.0, 19.0)));
    assert_eq!(panel.extent(AxisId::Y2), Some(AxisRange::new(100.0, 119.0)));

    let expected: Vec<Tick> = [0.0, 5.0, 10.0, 15.0].into_iter().map(Tick::Value).collect();
    assert_eq!(panel.generate_ticks(AxisId::Y1), expected);

    panel.render();
    assert_eq!(panel.ticks(AxisId::Y1), expected.as_slice());
    let axis = panel.render_axis(AxisId::Y1).unwrap();
    assert_eq!(axis.find_all_by_class("tick").len(), 4);
}

/// A `points` layer that also suggests one label tick per axis and records the
/// tick configuration it was handed.
struct LabelledLayer {
    inner: BaseDataLayer,
    seen: Arc<Mutex<Vec<Map<String, Value>>>>,
}

impl DataLayer for LabelledLayer {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn state_id(&self) -> String {
        self.inner.state_id()
    }

    fn layout_handle(&self) -> &LayoutHandle {
        self.inner.layout_handle()
    }

    fn axis_extent(&self, dim: AxisDim) -> Option<AxisRange> {
        self.inner.axis_extent(dim)
    }

    fn ticks(&self, _axis: AxisId, config: &Map<String, Value>) -> Vec<Tick> {
        self.seen.lock().push(config.clone());
        vec![Tick::Label(TickLabel {
            position: 5.0,
            text: "five".into(),
            style: Some(json!({"fill": "red"})),
            ..TickLabel::default()
        })]
    }

    fn re_map(&mut self) -> eyre::Result<LayerFetch> {
        self.inner.re_map()
    }

    fn receive_data(&mut self, records: Vec<Record>) {
        self.inner.receive_data(records)
    }

    fn data(&self) -> &[Record] {
        self.inner.data()
    }

    fn render(&mut self, transform: &PlotTransform) -> SvgNode {
        self.inner.render(transform)
    }

    fn set_element_status(&mut self, element_id: &str, status: ElementStatus, toggle: bool) {
        self.inner.set_element_status(element_id, status, toggle)
    }

    fn set_all_element_status(&mut self, status: ElementStatus, toggle: bool) {
        self.inner.set_all_element_status(status, toggle)
    }

    fn element_status(&self, element_id: &str, status: ElementStatus) -> bool {
        self.inner.element_status(element_id, status)
    }
}

#[test]
fn test_layer_tick_suggestions_override_panel_style() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registries = Registries::default();
    let recorder = seen.clone();
    let labelled: DataLayerConstructor = Arc::new(move |ctx: LayerContext| -> locus_plot::Result<Box<dyn DataLayer>> {
        let layer: Box<dyn DataLayer> = Box::new(LabelledLayer {
            inner: BaseDataLayer::new(ctx)?,
            seen: recorder.clone(),
        });
        Ok(layer)
    });
    registries.data_layers.add("labelled", labelled, false).unwrap();

    let plot = Plot::with_registries(
        "plot",
        json!({
            "state": {"start": 1, "end": 100},
            "panels": [{
                "id": "p",
                "axes": {"y1": {"ticks": {
                    "position": "left",
                    "style": {"fill": "blue", "font-size": "9px"},
                    "transform": "rotate(45)",
                }}},
                "data_layers": [{"id": "l", "type": "labelled"}],
            }],
        }),
        DataSources::new(),
        registries,
        ChartTheme::default(),
    )
    .unwrap();

    let ticks = plot.panel("p").unwrap().generate_ticks(AxisId::Y1);
    let Tick::Label(label) = &ticks[0] else {
        panic!("expected a label tick, got {:?}", ticks[0]);
    };
    assert_eq!(label.position, 5.0);
    assert_eq!(label.text, "five");
    assert_eq!(label.style, Some(json!({"fill": "red", "font-size": "9px"})));
    assert_eq!(label.transform.as_deref(), Some("rotate(45)"));

    let configs = seen.lock();
    let last = configs.last().unwrap();
    assert_eq!(last.get("position"), Some(&json!("left")));
    assert_eq!(last.len(), 1);
}

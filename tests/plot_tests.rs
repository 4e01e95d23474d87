use locus_plot::data_types::{Record, StaticSource};
use locus_plot::{DataSources, EventContext, Plot, PlotError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

fn sources() -> DataSources {
    let records = vec![
        record(json!({"assoc:position": 1200, "assoc:pvalue": 3.5})),
        record(json!({"assoc:position": 1600, "assoc:pvalue": 7.1})),
        record(json!({"assoc:position": 9000, "assoc:pvalue": 1.0})),
    ];
    let mut sources = DataSources::new();
    sources
        .add(
            "assoc",
            Arc::new(StaticSource::new(records).with_position_field("assoc:position")),
        )
        .unwrap();
    sources
}

fn stacked_plot() -> Plot {
    Plot::new(
        "plot",
        json!({
            "width": 800,
            "state": {"chr": "10", "start": 1000, "end": 2000},
            "panels": [
                {"id": "a", "height": 100},
                {"id": "b", "height": 150},
                {"id": "c", "height": 200},
            ],
        }),
        sources(),
    )
    .unwrap()
}

fn ids(plot: &Plot) -> Vec<&str> {
    plot.panel_ids_by_y_index().iter().map(String::as_str).collect()
}

#[test]
fn test_panels_stack_by_height() {
    let plot = stacked_plot();
    assert_eq!(ids(&plot), ["a", "b", "c"]);
    assert_eq!(plot.panel("b").unwrap().layout().origin.y, Some(100.0));
    assert_eq!(plot.panel("c").unwrap().layout().origin.y, Some(250.0));
    assert_eq!(plot.total_height(), 450.0);
}

#[test]
fn test_missing_and_duplicate_panel_ids() {
    let mut plot = stacked_plot();
    assert!(matches!(plot.add_panel(json!({"height": 10})), Err(PlotError::MissingId(_))));
    assert!(matches!(
        plot.add_panel(json!({"id": "a"})),
        Err(PlotError::DuplicateId { .. })
    ));
    assert!(matches!(Plot::new("", json!({}), DataSources::new()), Err(PlotError::MissingId(_))));
}

#[test]
fn test_add_panel_with_y_index() {
    let mut plot = stacked_plot();
    plot.add_panel(json!({"id": "d", "y_index": 1, "height": 50})).unwrap();
    assert_eq!(ids(&plot), ["a", "d", "b", "c"]);
    plot.add_panel(json!({"id": "e", "y_index": -1, "height": 50})).unwrap();
    assert_eq!(ids(&plot), ["a", "d", "b", "e", "c"]);
    for (y, id) in ids(&plot).iter().enumerate() {
        assert_eq!(plot.panel(id).unwrap().layout().y_index, Some(y as i64));
    }
}

#[test]
fn test_move_panels_at_boundaries() {
    let mut plot = stacked_plot();
    assert!(!plot.move_panel_up("a").unwrap());
    assert!(!plot.move_panel_down("c").unwrap());
    assert_eq!(ids(&plot), ["a", "b", "c"]);

    assert!(plot.move_panel_down("a").unwrap());
    assert_eq!(ids(&plot), ["b", "a", "c"]);
    assert_eq!(plot.panel("a").unwrap().layout().origin.y, Some(150.0));
    assert!(matches!(plot.move_panel_up("zz"), Err(PlotError::UnknownPanel(_))));
}

#[test]
fn test_remove_panel_restacks_and_repoints() {
    let mut plot = stacked_plot();
    let removed = Arc::new(Mutex::new(Vec::new()));
    let sink = removed.clone();
    plot.on("panel_removed", move |ctx: &EventContext| sink.lock().push(ctx.data.clone()))
        .unwrap();

    plot.remove_panel("a").unwrap();
    assert_eq!(ids(&plot), ["b", "c"]);
    assert_eq!(*removed.lock(), vec![json!("a")]);
    assert!(plot.state().get("a").is_none());

    // Later panels now live one slot earlier in the layout document.
    let c = plot.panel_mut("c").unwrap();
    c.set_title("moved");
    assert_eq!(plot.store().get("/panels/1/title/text"), Some(json!("moved")));
    assert_eq!(plot.panel("c").unwrap().layout().y_index, Some(1));
    assert_eq!(plot.panel("c").unwrap().layout().origin.y, Some(150.0));
}

#[test]
fn test_set_dimensions_scales_panels_and_respects_min_width() {
    let mut plot = stacked_plot();
    plot.set_dimensions(200.0, 900.0);
    assert_eq!(plot.layout().width, 400.0);
    assert_eq!(plot.panel("a").unwrap().layout().height, 200.0);
    assert_eq!(plot.panel("c").unwrap().layout().height, 400.0);
    assert_eq!(plot.total_height(), 900.0);
}

#[test]
fn test_x_linked_panels_share_outer_margins() {
    let plot = Plot::new(
        "plot",
        json!({
            "panels": [
                {"id": "a", "height": 100, "margin": {"left": 30, "right": 10}, "interaction": {"x_linked": true}},
                {"id": "b", "height": 100, "margin": {"left": 50, "right": 5}, "interaction": {"x_linked": true}},
                {"id": "c", "height": 100, "margin": {"left": 5}},
            ],
        }),
        DataSources::new(),
    )
    .unwrap();
    for id in ["a", "b"] {
        let margin = plot.panel(id).unwrap().layout().margin;
        assert_eq!((margin.left, margin.right), (50.0, 10.0));
    }
    assert_eq!(plot.panel("c").unwrap().layout().margin.left, 5.0);
}

#[test]
fn test_bubbled_events_reach_the_plot() {
    let plot = stacked_plot();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    plot.on("custom", move |ctx: &EventContext| {
        sink.lock().push((ctx.source_id.clone(), ctx.data.clone()))
    })
    .unwrap();

    let panel = plot.panel("a").unwrap();
    panel.emit("custom", json!({"local": true})).unwrap();
    assert!(seen.lock().is_empty());

    panel.emit("custom", true).unwrap();
    panel.emit("custom", (json!(5), true)).unwrap();
    assert_eq!(
        *seen.lock(),
        vec![
            ("plot.a".to_string(), Value::Null),
            ("plot.a".to_string(), json!(5)),
        ]
    );
}

#[tokio::test]
async fn test_apply_state_normalizes_region() {
    let mut plot = stacked_plot();
    let mut changes = serde_json::Map::new();
    changes.insert("start".into(), json!(5000.9));
    changes.insert("end".into(), json!(-20));
    plot.apply_state(changes).await.unwrap();
    let state = plot.state();
    assert_eq!(state.get("start"), Some(&json!(1)));
    assert_eq!(state.get("end"), Some(&json!(5000)));
    assert_eq!(state.get("chr"), Some(&json!("10")));
    assert!(!plot.is_loading());
}

#[tokio::test]
async fn test_apply_state_event_order() {
    let mut plot = stacked_plot();
    let events = Arc::new(Mutex::new(Vec::new()));
    for name in ["data_requested", "layout_changed", "data_rendered", "state_changed", "region_changed"] {
        let sink = events.clone();
        plot.on(name, move |ctx: &EventContext| {
            if ctx.source_id == "plot" {
                sink.lock().push(name);
            }
        })
        .unwrap();
    }

    let mut changes = serde_json::Map::new();
    changes.insert("end".into(), json!(3000));
    plot.apply_state(changes).await.unwrap();
    assert_eq!(
        *events.lock(),
        ["data_requested", "layout_changed", "data_rendered", "state_changed", "region_changed"]
    );

    events.lock().clear();
    let mut changes = serde_json::Map::new();
    changes.insert("ldrefvar".into(), json!("10:1500_A/G"));
    plot.apply_state(changes).await.unwrap();
    assert!(!events.lock().contains(&"region_changed"));
}

#[tokio::test]
async fn test_initialize_loads_region_data() {
    let mut plot = Plot::new(
        "plot",
        json!({
            "state": {"chr": "10", "start": 1000, "end": 2000},
            "panels": [{
                "id": "assoc",
                "height": 200,
                "axes": {"x": {"label": "Chromosome {{chr}}"}},
                "data_layers": [{
                    "id": "points",
                    "type": "points",
                    "namespace": "assoc",
                    "x_axis": {"field": "assoc:position"},
                    "y_axis": {"field": "assoc:pvalue"},
                }],
            }],
        }),
        sources(),
    )
    .unwrap();
    plot.initialize().await.unwrap();
    assert!(plot.is_initialized());

    let panel = plot.panel("assoc").unwrap();
    assert!(panel.is_initialized());
    assert_eq!(panel.data_layer("points").unwrap().data().len(), 2);
    assert!(panel.loader().is_none());

    let svg = plot.to_svg();
    let circles = svg.find_all_by_class("lz-data_layer-points");
    assert_eq!(circles.len(), 2);
    assert!(svg.find_by_id("plot.assoc.x_axis").is_some());
    let label = svg.find_by_id("plot.assoc.x_axis_label").unwrap();
    assert_eq!(label.text.as_deref(), Some("Chromosome 10"));
}

fn assoc_plot() -> Plot {
    Plot::new(
        "plot",
        json!({
            "state": {"chr": "10", "start": 1000, "end": 2000},
            "panels": [{
                "id": "assoc",
                "height": 200,
                "data_layers": [{
                    "id": "points",
                    "type": "points",
                    "namespace": "assoc",
                    "x_axis": {"field": "assoc:position"},
                    "y_axis": {"field": "assoc:pvalue"},
                }],
            }],
        }),
        sources(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_element_status_changes_rendered_classes() {
    let mut plot = assoc_plot();
    plot.initialize().await.unwrap();

    let panel = plot.panel_mut("assoc").unwrap();
    panel.apply_status_verb("select", true).unwrap();
    let svg = panel.svg().unwrap();
    assert_eq!(svg.find_all_by_class("lz-data_layer-points-selected").len(), 2);

    panel.clear_selections();
    panel.hide_all_elements(true);
    let svg = panel.svg().unwrap();
    assert!(svg.find_all_by_class("lz-data_layer-points").is_empty());
    assert!(matches!(
        panel.apply_status_verb("sparkle", true),
        Err(PlotError::InvalidLayout(_))
    ));
}

#[tokio::test]
async fn test_curtain_overlays_last_render() {
    let mut plot = assoc_plot();
    plot.initialize().await.unwrap();
    let panel = plot.panel_mut("assoc").unwrap();
    panel.show_curtain("region too large");
    let svg = panel.svg().unwrap();
    let curtain = svg.find_all_by_class("lz-curtain");
    assert_eq!(curtain.len(), 1);
    assert_eq!(curtain[0].children[1].text.as_deref(), Some("region too large"));
    panel.hide_curtain();
    assert!(panel.svg().unwrap().find_all_by_class("lz-curtain").is_empty());
}

#[test]
fn test_page_origin_adds_container_offset() {
    let plot = stacked_plot();
    plot.set_container_offset(20.0, 35.0);
    let origin = plot.panel("b").unwrap().page_origin();
    assert_eq!((origin.x, origin.y), (20.0, 135.0));
}

#[test]
fn test_listeners_can_be_removed() {
    let plot = stacked_plot();
    let seen = Arc::new(Mutex::new(0));
    let counter = seen.clone();
    let id = plot.on("custom", move |_| *counter.lock() += 1).unwrap();
    plot.emit("custom", ()).unwrap();
    plot.off("custom", Some(id)).unwrap();
    plot.emit("custom", ()).unwrap();
    assert_eq!(*seen.lock(), 1);
    assert!(matches!(plot.off("custom", Some(id)), Err(PlotError::ListenerNotRegistered)));
}

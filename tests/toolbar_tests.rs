use locus_plot::data_types::{AxisRange, StaticSource};
use locus_plot::{DataSources, Plot, PlotError};
use serde_json::json;
use std::sync::Arc;

fn plot() -> Plot {
    let records = (0..5)
        .filter_map(|i| json!({"genes:start": 1200 + i * 10}).as_object().cloned())
        .collect();
    let mut sources = DataSources::new();
    sources.add("genes", Arc::new(StaticSource::new(records))).unwrap();
    Plot::new(
        "plot",
        json!({
            "width": 800,
            "max_region_scale": 1_000_000,
            "state": {"chr": "16", "start": 100_000, "end": 200_000},
            "toolbar": {"widgets": [
                {"type": "zoom_region", "step": 0.5},
                {"type": "zoom_region", "step": -0.5},
                {"type": "shift_region", "step": -150_000},
                {"type": "region_scale"},
            ]},
            "panels": [
                {"id": "top", "height": 100, "toolbar": {"widgets": [
                    {"type": "move_panel_up"}, {"type": "move_panel_down"}, {"type": "remove_panel"},
                ]}},
                {"id": "genes", "height": 100, "margin": {"top": 10, "bottom": 15}, "toolbar": {"widgets": [
                    {"type": "move_panel_up"}, {"type": "resize_to_data"},
                ]}, "data_layers": [
                    {"id": "g", "type": "points", "namespace": "genes", "row_height": 30},
                ]},
            ],
        }),
        sources,
    )
    .unwrap()
}

fn region(plot: &Plot) -> AxisRange {
    plot.state().region().unwrap()
}

#[tokio::test]
async fn test_zoom_widgets_step_about_the_centre() {
    let mut plot = plot();
    assert!(plot.click_widget(None, 0).await.unwrap());
    assert_eq!(region(&plot), AxisRange::new(75_000.0, 225_000.0));
    assert!(plot.click_widget(None, 1).await.unwrap());
    assert_eq!(region(&plot), AxisRange::new(112_500.0, 187_500.0));
}

#[tokio::test]
async fn test_zoom_out_disabled_at_max_region_scale() {
    let mut plot = plot();
    let mut changes = serde_json::Map::new();
    changes.insert("start".into(), json!(1));
    changes.insert("end".into(), json!(1_000_001));
    plot.apply_state(changes).await.unwrap();

    let views = plot.toolbar_views(None).unwrap();
    assert!(views[0].disabled);
    assert!(!views[1].disabled);
    assert!(!plot.click_widget(None, 0).await.unwrap());
}

#[tokio::test]
async fn test_shift_region_keeps_start_positive() {
    let mut plot = plot();
    assert!(plot.click_widget(None, 2).await.unwrap());
    let shifted = region(&plot);
    assert_eq!(shifted.min, 1.0);
    assert_eq!(shifted.max, 50_000.0);
}

#[test]
fn test_region_scale_label() {
    let plot = plot();
    let views = plot.toolbar_views(None).unwrap();
    assert_eq!(views[3].label, "100.00 Kb");
    assert!(views[3].disabled);
}

#[tokio::test]
async fn test_panel_widgets_move_and_remove() {
    let mut plot = plot();
    let views = plot.toolbar_views(Some("top")).unwrap();
    assert!(views[0].disabled);
    assert!(!views[1].disabled);

    assert!(!plot.click_widget(Some("top"), 0).await.unwrap());
    assert!(plot.click_widget(Some("top"), 1).await.unwrap());
    assert_eq!(plot.panel_ids_by_y_index(), ["genes", "top"]);

    assert!(plot.click_widget(Some("top"), 2).await.unwrap());
    assert_eq!(plot.panel_ids_by_y_index(), ["genes"]);
    assert!(matches!(
        plot.toolbar_views(Some("top")),
        Err(PlotError::UnknownPanel(_))
    ));
}

#[tokio::test]
async fn test_resize_to_data_fits_rows() {
    let mut plot = plot();
    plot.initialize().await.unwrap();
    assert!(plot.click_widget(Some("genes"), 1).await.unwrap());
    assert_eq!(plot.panel("genes").unwrap().layout().height, 175.0);
    assert_eq!(plot.total_height(), 275.0);
}

#[test]
fn test_panel_only_widget_rejected_in_plot_toolbar() {
    let result = Plot::new(
        "plot",
        json!({"toolbar": {"widgets": [{"type": "remove_panel"}]}}),
        DataSources::new(),
    );
    assert!(matches!(result, Err(PlotError::InvalidLayout(_))));
    let result = Plot::new(
        "plot",
        json!({"toolbar": {"widgets": [{"type": "unknown_widget"}]}}),
        DataSources::new(),
    );
    assert!(matches!(result, Err(PlotError::ItemNotFound { .. })));
}

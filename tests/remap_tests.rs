use futures_util::future::{self, BoxFuture};
use locus_plot::data_types::{PlotState, Record};
use locus_plot::panel::LOADING_MESSAGE;
use locus_plot::{DataSource, DataSources, Plot, RemapStatus};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Serves one record per call and can be switched into failure.
#[derive(Default)]
struct FlakySource {
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl DataSource for FlakySource {
    fn fetch(&self, _state: &PlotState, _fields: &[String]) -> BoxFuture<'static, eyre::Result<Vec<Record>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Box::pin(future::ready(Err(eyre::eyre!("server returned 500"))));
        }
        let record = json!({"assoc:call": call}).as_object().cloned().unwrap_or_default();
        Box::pin(future::ready(Ok(vec![record])))
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn plot_with(source: Arc<FlakySource>, layers: serde_json::Value) -> Plot {
    let mut sources = DataSources::new();
    sources.add("assoc", source).unwrap();
    Plot::new(
        "plot",
        json!({
            "state": {"start": 1, "end": 1000},
            "panels": [{"id": "p", "height": 200, "data_layers": layers}],
        }),
        sources,
    )
    .unwrap()
}

#[tokio::test]
async fn test_stale_remap_is_discarded() {
    let source = Arc::new(FlakySource::default());
    let mut plot = plot_with(
        source.clone(),
        json!([{"id": "l", "type": "points", "namespace": "assoc"}]),
    );
    let panel = plot.panel_mut("p").unwrap();

    let first = panel.begin_remap();
    assert_eq!(panel.loader(), Some(LOADING_MESSAGE));
    let second = panel.begin_remap();
    assert!(second.generation() > first.generation());

    let late = first.settle().await;
    assert_eq!(panel.complete_remap(late), RemapStatus::Stale);
    assert!(panel.data_layer("l").unwrap().data().is_empty());
    assert!(!panel.is_initialized());

    let current = second.settle().await;
    assert_eq!(panel.complete_remap(current), RemapStatus::Rendered);
    let data = panel.data_layer("l").unwrap().data();
    assert_eq!(data[0].get("assoc:call"), Some(&json!(1)));
    assert!(panel.is_initialized());
    assert!(panel.loader().is_none());
}

#[tokio::test]
async fn test_async_failure_keeps_previous_render() {
    init_logging();
    let source = Arc::new(FlakySource::default());
    let mut plot = plot_with(
        source.clone(),
        json!([{"id": "l", "type": "points", "namespace": "assoc"}]),
    );
    plot.initialize().await.unwrap();
    let before = plot.panel("p").unwrap().last_render().cloned();
    assert!(before.is_some());

    source.failing.store(true, Ordering::SeqCst);
    let status = plot.remap_panel("p").await.unwrap();
    assert_eq!(status, RemapStatus::Failed("server returned 500".into()));

    let panel = plot.panel("p").unwrap();
    assert_eq!(panel.curtain(), Some("server returned 500"));
    assert_eq!(panel.last_render().cloned(), before);
    let svg = panel.svg().unwrap();
    assert_eq!(svg.find_all_by_class("lz-curtain").len(), 1);
    // The layer keeps the records of the last good fetch.
    assert_eq!(panel.data_layer("l").unwrap().data().len(), 1);

    source.failing.store(false, Ordering::SeqCst);
    assert_eq!(plot.remap_panel("p").await.unwrap(), RemapStatus::Rendered);
    assert!(plot.panel("p").unwrap().curtain().is_none());
}

#[tokio::test]
async fn test_sync_failure_shows_curtain_and_still_renders() {
    init_logging();
    let source = Arc::new(FlakySource::default());
    let mut plot = plot_with(
        source.clone(),
        json!([
            {"id": "orphan", "type": "points"},
            {"id": "l", "type": "points", "namespace": "assoc"},
        ]),
    );
    plot.initialize().await.unwrap();

    let panel = plot.panel("p").unwrap();
    assert!(panel.curtain().unwrap().contains("p.orphan"));
    assert!(panel.is_initialized());
    assert_eq!(panel.data_layer("l").unwrap().data().len(), 1);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_apply_state_blocks_interaction_while_loading() {
    let source = Arc::new(FlakySource::default());
    let mut plot = plot_with(
        source,
        json!([{"id": "l", "type": "points", "namespace": "assoc"}]),
    );
    let ctx = plot.context().clone();
    let seen = Arc::new(AtomicBool::new(true));
    let flag = seen.clone();
    plot.panel("p")
        .unwrap()
        .on("data_requested", move |_| {
            flag.store(ctx.can_interact(None), Ordering::SeqCst);
        })
        .unwrap();
    plot.apply_state(serde_json::Map::new()).await.unwrap();
    assert!(!seen.load(Ordering::SeqCst));
    assert!(!plot.is_loading());
    assert!(plot.can_interact(None));
}

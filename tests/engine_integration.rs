//! End-to-end map scenarios against the public API
//!
//! Every test drives a `MapEngine` over the headless surface and checks what
//! the surface was asked to do.

use map_engine::engine::{EventKind, FilterReconciler, MapEvent, StaticFetcher, ViewState};
use map_engine::geo::LatLng;
use map_engine::surface::{FIT_PADDING, HeadlessFactory};
use map_engine::{
    BorderLayerDescriptor, CategoryData, Dataset, EntryRecord, FilterEvent, MapEngine, MapError,
    MapOptionsPatch,
};
use std::sync::{Arc, Mutex};

const FIXTURE: &str = include_str!("fixtures/institutes.json");

fn engine_with(factory: &HeadlessFactory, fetcher: StaticFetcher) -> MapEngine {
    MapEngine::new(Arc::new(factory.clone()), Arc::new(fetcher), MapOptionsPatch::default())
}

fn fit_bounds() -> MapOptionsPatch {
    MapOptionsPatch {
        fit_bounds: Some(true),
        ..Default::default()
    }
}

fn events(engine: &MapEngine, kind: EventKind) -> Arc<Mutex<Vec<MapEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.bus().subscribe(kind, move |e| sink.lock().unwrap().push(e.clone()));
    seen
}

/// Single Berlin entry with fitBounds produces one group and a padded fit around it
#[tokio::test]
async fn test_single_place_fits_viewport() {
    let factory = HeadlessFactory::new();
    let mut engine = engine_with(&factory, StaticFetcher::new());
    let dataset = Dataset::from_json(
        r##"{"cat1": {"title": "Places", "data": [
            {"entry_id": "1", "lat": 52.5, "lon": 13.4, "color": "#ff0000"}
        ]}}"##,
    )
    .unwrap();

    engine.mount("oes_map_1", dataset, &fit_bounds()).settle().await;

    let summary = engine.summary("oes_map_1").unwrap();
    assert_eq!(summary.groups.len(), 1);
    assert_eq!(summary.groups[0].key, "cat1");
    assert_eq!(summary.groups[0].markers.len(), 1);
    assert_eq!(summary.groups[0].markers[0].position, LatLng::new(52.5, 13.4));

    let surface = factory.latest().unwrap();
    let (region, padding) = surface.last_fit().unwrap();
    assert_eq!(*padding, FIT_PADDING);
    assert!(region.contains(LatLng::new(52.5, 13.4)));
}

#[tokio::test]
async fn test_reinit_leaves_one_live_surface() {
    let factory = HeadlessFactory::new();
    let mut engine = engine_with(&factory, StaticFetcher::new());

    for _ in 0..3 {
        engine
            .mount("oes_map_1", Dataset::from_json(FIXTURE).unwrap(), &MapOptionsPatch::default())
            .settle()
            .await;
    }

    assert_eq!(factory.built_count(), 3);
    assert_eq!(factory.live_handles(), 1);
    assert_eq!(engine.registry().lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_fixture_wire_format_renders() {
    let factory = HeadlessFactory::new();
    let mut engine = engine_with(&factory, StaticFetcher::new());
    let patch: MapOptionsPatch =
        serde_json::from_str(r#"{"showLegend": true, "fitBounds": true, "controlText": "Key"}"#)
            .unwrap();

    engine.mount("m", Dataset::from_json(FIXTURE).unwrap(), &patch).settle().await;

    let summary = engine.summary("m").unwrap();
    let keys: Vec<&str> = summary.groups.iter().map(|g| g.key.as_str()).collect();
    assert_eq!(keys, vec!["cat1", "cat3"]);
    assert_eq!(summary.groups[0].markers[0].entry_id, "101");
    assert_eq!(summary.groups[0].color, "#1f77b4");
    assert_eq!(summary.legend.len(), 2);

    let surface = factory.latest().unwrap();
    assert_eq!(surface.controls[0].toggle_label, "Key");
    let (region, _) = surface.last_fit().unwrap();
    assert!(region.contains(LatLng::new(50.9375, 6.9603)));
    assert!(region.contains(LatLng::new(52.52, 13.405)));
}

#[tokio::test]
async fn test_filter_event_rebuilds_and_counts() {
    let factory = HeadlessFactory::new();
    let mut engine = engine_with(&factory, StaticFetcher::new());
    let counts = events(&engine, EventKind::ResultCountChanged);
    engine.mount("m", Dataset::from_json(FIXTURE).unwrap(), &fit_bounds()).settle().await;

    let event: FilterEvent =
        serde_json::from_str(r#"{"filteredIDs": [9], "currentFilterPostIDs": {"type": [9]}}"#)
            .unwrap();
    let rebuild = engine.on_filter("m", &event).unwrap();
    assert!(rebuild.is_built());

    let summary = engine.summary("m").unwrap();
    assert_eq!(summary.groups.len(), 1);
    assert_eq!(summary.groups[0].markers[0].entry_id, "102");
    assert_eq!(
        counts.lock().unwrap().as_slice(),
        &[MapEvent::ResultCountChanged {
            map_id: "m".into(),
            count: 1
        }]
    );

    // Clearing the filter brings the original dataset back
    let _ = engine.on_filter("m", &FilterEvent::default()).unwrap();
    assert_eq!(engine.with_map("m", |m| m.marker_count()), Some(3));
    assert_eq!(counts.lock().unwrap().len(), 1);
    assert_eq!(factory.live_handles(), 1);
}

#[tokio::test]
async fn test_rapid_filters_last_one_wins() {
    let factory = HeadlessFactory::new();
    let mut engine = engine_with(&factory, StaticFetcher::new());
    let _ = engine.mount("m", Dataset::from_json(FIXTURE).unwrap(), &MapOptionsPatch::default());

    let first = engine.on_filter("m", &FilterEvent::new(["7"])).unwrap();
    let second = engine.on_filter("m", &FilterEvent::new(["8"])).unwrap();
    first.settle().await;
    second.settle().await;

    let mut ids: Vec<String> = engine
        .with_map("m", |m| m.visible_entry_ids().into_iter().map(str::to_string).collect())
        .unwrap();
    ids.sort();
    assert_eq!(ids, vec!["101", "201"]);
}

/// Borders of a filter rebuild that was overtaken never reach the live map
#[tokio::test]
async fn test_superseded_filter_rebuild_discards_its_borders() {
    let factory = HeadlessFactory::new();
    let fetcher =
        StaticFetcher::new().with_geometry("states.json", StaticFetcher::empty_collection());
    let mut engine = engine_with(&factory, fetcher);
    let attached = events(&engine, EventKind::BorderLayerAttached);
    let patch = MapOptionsPatch {
        layer_files: Some(vec![BorderLayerDescriptor::new("states", "states.json", "States")]),
        ..Default::default()
    };
    engine.mount("m", Dataset::from_json(FIXTURE).unwrap(), &patch).settle().await;

    let first = engine.on_filter("m", &FilterEvent::new(["7"])).unwrap();
    let second = engine.on_filter("m", &FilterEvent::new(["8"])).unwrap();
    let live = second.handle.clone().unwrap();
    assert_ne!(first.handle.as_ref().unwrap().generation, live.generation);

    let (_, overtaken) = first.settle().await;
    let (_, current) = second.settle().await;

    assert!(overtaken.attached.is_empty());
    assert_eq!(overtaken.stale, vec!["states"]);
    assert_eq!(current.attached, vec!["states"]);
    assert_eq!(engine.with_map("m", |m| m.generation), Some(live.generation));
    assert_eq!(engine.with_map("m", |m| m.border_layers.len()), Some(1));
    assert_eq!(factory.latest().unwrap().checkboxes.len(), 1);
    // One from the mount, one from the surviving rebuild
    assert_eq!(attached.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_border_failure_is_isolated() {
    let factory = HeadlessFactory::new();
    let fetcher = StaticFetcher::new()
        .with_geometry("https://example.org/states.geojson", StaticFetcher::empty_collection())
        .with_failure("https://example.org/rivers.geojson", "network unreachable");
    let mut engine = engine_with(&factory, fetcher);
    let patch = MapOptionsPatch {
        layer_files: Some(vec![
            BorderLayerDescriptor::new("states", "https://example.org/states.geojson", "States"),
            BorderLayerDescriptor::new("rivers", "https://example.org/rivers.geojson", "Rivers"),
        ]),
        ..Default::default()
    };

    let (handle, report) = engine
        .mount("m", Dataset::from_json(FIXTURE).unwrap(), &patch)
        .settle()
        .await;

    assert!(handle.is_some());
    assert_eq!(report.attached, vec!["states"]);
    assert!(matches!(&report.failed[0], (id, MapError::FetchFailure { .. }) if id == "rivers"));

    let surface = factory.latest().unwrap();
    let checkbox_ids: Vec<&str> = surface.checkboxes.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(checkbox_ids, vec!["oes-map-layer-m_states"]);
    assert_eq!(engine.with_map("m", |m| m.marker_count()), Some(3));
}

#[tokio::test]
async fn test_borders_skipped_when_disabled() {
    let factory = HeadlessFactory::new();
    let fetcher =
        StaticFetcher::new().with_geometry("states.json", StaticFetcher::empty_collection());
    let mut engine = engine_with(&factory, fetcher);
    let patch = MapOptionsPatch {
        show_borders: Some(false),
        layer_files: Some(vec![BorderLayerDescriptor::new("states", "states.json", "States")]),
        ..Default::default()
    };

    let (_, report) = engine
        .mount("m", Dataset::from_json(FIXTURE).unwrap(), &patch)
        .settle()
        .await;

    assert!(report.attached.is_empty());
    assert!(factory.latest().unwrap().border_header.is_none());
}

/// Border results for a replaced map never land on its successor
#[tokio::test]
async fn test_stale_border_result_is_discarded() {
    let factory = HeadlessFactory::new();
    let fetcher =
        StaticFetcher::new().with_geometry("states.json", StaticFetcher::empty_collection());
    let mut engine = engine_with(&factory, fetcher);
    let with_borders = MapOptionsPatch {
        layer_files: Some(vec![BorderLayerDescriptor::new("states", "states.json", "States")]),
        ..Default::default()
    };

    let stale = engine.mount("m", Dataset::from_json(FIXTURE).unwrap(), &with_borders);
    let _ = engine.mount("m", Dataset::new(), &MapOptionsPatch::default());

    let (_, report) = stale.settle().await;
    assert_eq!(report.stale, vec!["states"]);
    assert_eq!(engine.with_map("m", |m| m.border_layers.len()), Some(0));
    assert!(factory.latest().unwrap().checkboxes.is_empty());
}

#[tokio::test]
async fn test_empty_dataset_is_valid_state() {
    let factory = HeadlessFactory::new();
    let mut engine = engine_with(&factory, StaticFetcher::new());

    let rebuild = engine.mount(
        "m",
        Dataset::new().with_category("cat1", CategoryData::new("Nothing", vec![])),
        &fit_bounds(),
    );

    assert!(rebuild.is_built());
    let summary = engine.summary("m").unwrap();
    assert!(summary.groups.is_empty());
    assert!(summary.fitted_region.is_none());
    assert!(factory.latest().unwrap().fits.is_empty());
}

#[test]
fn test_legend_symmetry_through_engine() {
    let factory = HeadlessFactory::new();
    let mut engine = engine_with(&factory, StaticFetcher::new());
    let dataset = Dataset::new()
        .with_category("a", CategoryData::new("A", vec![EntryRecord::new("1", 1.0, 1.0)]))
        .with_category("b", CategoryData::new("B", vec![EntryRecord::new("2", 2.0, 2.0)]));
    let _ = engine.mount("m", dataset, &MapOptionsPatch::default());

    let before = engine.summary("m").unwrap();
    engine.toggle_legend("m", "a").unwrap();
    let toggled = engine.summary("m").unwrap();
    engine.toggle_legend("m", "a").unwrap();
    let after = engine.summary("m").unwrap();

    assert!(!toggled.groups[0].on_surface);
    assert!(!toggled.legend[0].active);
    assert!(toggled.groups[1].on_surface);
    assert_eq!(before.groups[0].on_surface, after.groups[0].on_surface);
    assert_eq!(before.legend, after.legend);

    engine.toggle_legend("m", "a").unwrap();
    engine.toggle_legend("m", "b").unwrap();
    engine.toggle_legend("m", "all").unwrap();
    let all = engine.summary("m").unwrap();
    assert!(all.groups.iter().all(|g| g.on_surface));
    assert!(all.legend.iter().all(|e| e.active));
}

#[test]
fn test_unknown_map_reaches_caller() {
    let factory = HeadlessFactory::new();
    let mut engine = engine_with(&factory, StaticFetcher::new());

    assert_eq!(
        engine.toggle_legend("missing", "all"),
        Err(MapError::UnknownMap("missing".into()))
    );
    assert!(engine.on_filter("missing", &FilterEvent::new(["1"])).is_err());
    assert!(engine.set_border_visible("missing", "states", true).is_err());
}

#[test]
fn test_map_level_auto_show_switches_to_map() {
    let factory = HeadlessFactory::new();
    let mut engine = engine_with(&factory, StaticFetcher::new());
    let displayed = events(&engine, EventKind::MapDisplayed);
    assert_eq!(engine.view_state(), ViewState::ListVisible);

    let patch = MapOptionsPatch {
        auto_show_map: Some(true),
        ..Default::default()
    };
    let _ = engine.mount("m", Dataset::from_json(FIXTURE).unwrap(), &patch);

    assert_eq!(engine.view_state(), ViewState::MapVisible);
    assert_eq!(displayed.lock().unwrap().len(), 1);
}

#[test]
fn test_auto_show_does_not_override_list_choice() {
    let factory = HeadlessFactory::new();
    let mut engine = engine_with(&factory, StaticFetcher::new());
    engine.show_list();

    let patch = MapOptionsPatch {
        auto_show_map: Some(true),
        ..Default::default()
    };
    let _ = engine.mount("m", Dataset::from_json(FIXTURE).unwrap(), &patch);

    assert_eq!(engine.view_state(), ViewState::ListVisible);
}

#[test]
fn test_validator_survives_destroy_and_remount() {
    let factory = HeadlessFactory::new();
    let mut engine = engine_with(&factory, StaticFetcher::new());
    engine.register_validator("m", || vec!["102".to_string()]);
    let _ = engine.mount("m", Dataset::from_json(FIXTURE).unwrap(), &MapOptionsPatch::default());

    assert!(engine.destroy("m"));
    let _ = engine.mount("m", Dataset::from_json(FIXTURE).unwrap(), &MapOptionsPatch::default());
    engine.show_map("m", true);

    let visible = engine.with_map("m", |m| {
        m.visible_entry_ids().into_iter().map(str::to_string).collect::<Vec<_>>()
    });
    assert_eq!(visible, Some(vec!["102".to_string()]));
}

#[test]
fn test_custom_popup_cleanup_runs_on_filter() {
    let factory = HeadlessFactory::new();
    let reconciler = FilterReconciler::with_popup_cleaner(|popup, allowed| {
        let mut ids: Vec<&str> = allowed.iter().map(String::as_str).collect();
        ids.sort();
        format!("{} [{}]", popup, ids.join(","))
    });
    let mut engine = engine_with(&factory, StaticFetcher::new()).with_reconciler(reconciler);
    let dataset = Dataset::new().with_category(
        "cat1",
        CategoryData::new(
            "Places",
            vec![
                EntryRecord::new("1", 52.5, 13.4)
                    .with_popup("Berlin")
                    .with_sub_items(["p1", "p2"]),
            ],
        ),
    );
    let _ = engine.mount("m", dataset, &MapOptionsPatch::default());

    let _ = engine.on_filter("m", &FilterEvent::new(["p2"])).unwrap();

    let popup = engine.with_map("m", |m| m.groups[0].markers[0].popup_html.clone());
    assert_eq!(popup.as_deref(), Some("Berlin [p2]"));
}

use crate::cli::output;
use crate::config::Config;
use crate::engine::{BorderLoadReport, EventKind, MapEngine, MapEvent, MapSummary, ViewState};
use crate::model::{Dataset, FilterEvent};
use crate::options::MapOptionsPatch;
use crate::surface::HeadlessFactory;
use anyhow::Result;
use clap::Args;
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Args)]
pub struct RenderCommands {
    /// Dataset JSON: category key to {title, data}
    #[arg(short, long, value_name = "FILE")]
    pub data: PathBuf,

    /// Map options JSON (camelCase or snake_case keys)
    #[arg(short, long, value_name = "FILE")]
    pub options: Option<PathBuf>,

    /// Filter event JSON applied after the initial build
    #[arg(short, long, value_name = "FILE")]
    pub filter: Option<PathBuf>,

    /// Identifier of the map container
    #[arg(long, default_value = "oes_map_1")]
    pub map_id: String,

    /// Switch to the map view after building
    #[arg(long)]
    pub show_map: bool,
}

#[derive(Debug, Serialize)]
struct RenderReport {
    map: Option<MapSummary>,
    view_state: ViewState,
    result_count: Option<usize>,
    borders: BorderSummary,
}

#[derive(Debug, Default, Serialize)]
struct BorderSummary {
    attached: Vec<String>,
    failed: Vec<FailedBorder>,
    stale: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FailedBorder {
    id: String,
    reason: String,
}

impl BorderSummary {
    fn absorb(&mut self, report: BorderLoadReport) {
        self.attached.extend(report.attached);
        self.stale.extend(report.stale);
        self.failed.extend(report.failed.into_iter().map(|(id, error)| FailedBorder {
            id,
            reason: error.to_string(),
        }));
    }
}

pub async fn render_command(args: RenderCommands, config: &Config) -> Result<()> {
    let dataset: Dataset = output::read_json(&args.data, "dataset")?;
    let options: MapOptionsPatch = match &args.options {
        Some(path) => output::read_json(path, "options")?,
        None => MapOptionsPatch::default(),
    };
    let filter: Option<FilterEvent> = match &args.filter {
        Some(path) => Some(output::read_json(path, "filter")?),
        None => None,
    };

    let mut engine = MapEngine::from_config(config, Arc::new(HeadlessFactory::new()))?;

    let result_count = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&result_count);
    engine.bus().subscribe(EventKind::ResultCountChanged, move |event| {
        if let MapEvent::ResultCountChanged { count, .. } = event {
            *sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(*count);
        }
    });

    info!("Rendering map '{}' with {} categories", args.map_id, dataset.len());
    let mut borders = BorderSummary::default();

    let (handle, report) = engine.mount(&args.map_id, dataset, &options).settle().await;
    borders.absorb(report);
    if handle.is_none() {
        warn!("Map '{}' could not be built", args.map_id);
    }

    if let Some(event) = filter {
        let (_, report) = engine.on_filter(&args.map_id, &event)?.settle().await;
        borders.absorb(report);
    }

    if args.show_map {
        engine.show_map(&args.map_id, true);
    }

    let report = RenderReport {
        map: engine.summary(&args.map_id),
        view_state: engine.view_state(),
        result_count: *result_count.lock().unwrap_or_else(PoisonError::into_inner),
        borders,
    };

    output::heading(&format!("Map '{}'", args.map_id));
    if let Some(map) = &report.map {
        output::note(&format!(
            "{} group(s), {} border layer(s)",
            map.groups.len(),
            map.borders.len()
        ));
    }
    output::print_json(&report)?;

    engine.shutdown();
    Ok(())
}

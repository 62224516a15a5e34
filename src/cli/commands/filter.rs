use crate::cli::output;
use crate::engine::FilterReconciler;
use crate::model::{Dataset, FilterEvent};
use anyhow::Result;
use clap::Args;
use log::info;
use std::path::PathBuf;

#[derive(Args)]
pub struct FilterCommands {
    /// Dataset JSON: category key to {title, data}
    #[arg(short, long, value_name = "FILE")]
    pub data: PathBuf,

    /// Filter event JSON: {filteredIDs, currentFilterPostIDs}
    #[arg(short, long, value_name = "FILE")]
    pub filter: PathBuf,
}

pub async fn filter_command(args: FilterCommands) -> Result<()> {
    let dataset: Dataset = output::read_json(&args.data, "dataset")?;
    let event: FilterEvent = output::read_json(&args.filter, "filter")?;
    info!(
        "Filtering {} entries with {} allowed ids",
        dataset.entry_count(),
        event.filtered_ids.len()
    );

    let outcome = FilterReconciler::new().apply(&dataset, &event);

    if outcome.applied {
        output::heading(&format!(
            "{} of {} entries remain in {} categories",
            outcome.surviving_entries,
            dataset.entry_count(),
            outcome.dataset.len()
        ));
    } else {
        output::heading("No filter active; dataset unchanged");
    }

    output::print_json(&outcome.dataset)
}

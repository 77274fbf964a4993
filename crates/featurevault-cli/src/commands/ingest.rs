//! Stream a CSV file through the feature store

use anyhow::Result;
use comfy_table::Cell;
use featurevault_core::{FeatureStore, IngestReport, IngestSummary};
use serde::Serialize;
use std::time::Instant;

use crate::config::CliConfig;
use crate::loader::CsvEvents;
use crate::output::{
    create_table, format_count, format_duration_ms, format_status, print_output, print_success,
    print_warning, OutputFormat,
};
use crate::stores::create_feature_store;

use super::close_after;

#[derive(Debug, Serialize)]
pub struct IngestRun {
    pub file: String,
    #[serde(flatten)]
    pub summary: IngestSummary,
    pub elapsed_ms: u128,
}

pub async fn run(config: &CliConfig, file: Option<&str>, format: OutputFormat) -> Result<()> {
    let path = file.unwrap_or(&config.data_path);
    let store = create_feature_store(config).await?;

    let result = ingest_file(&store, path).await;
    let ingest_run = close_after(&store, result).await?;

    print_run(&ingest_run, format)
}

/// Ingest every row of `path` in file order
pub async fn ingest_file(store: &FeatureStore, path: &str) -> Result<IngestRun> {
    let started = Instant::now();
    let mut summary = IngestSummary::default();

    for (row, event) in CsvEvents::open(path)?.enumerate() {
        let report = match event {
            Ok(event) => store.ingest(&event).await,
            Err(e) => {
                tracing::error!(row = row + 1, error = %format!("{:#}", e), "Skipping unreadable CSV row");
                IngestReport::Dropped {
                    reason: format!("{:#}", e),
                }
            }
        };
        summary.add(&report);
    }

    let elapsed_ms = started.elapsed().as_millis();
    tracing::info!(
        file = path,
        events = summary.events,
        accepted = summary.accepted,
        stale = summary.stale,
        rejected = summary.rejected,
        failed = summary.failed,
        dropped = summary.dropped,
        elapsed_ms = elapsed_ms as u64,
        "Ingestion finished"
    );

    Ok(IngestRun {
        file: path.to_string(),
        summary,
        elapsed_ms,
    })
}

pub fn print_run(run: &IngestRun, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            let s = &run.summary;
            print_success(&format!(
                "Ingested {} events from {} in {}",
                format_count(s.events),
                run.file,
                format_duration_ms(run.elapsed_ms)
            ));

            let mut table = create_table();
            table.set_header(vec!["Outcome", "Count"]);
            for (status, count) in [
                ("accepted", s.accepted),
                ("stale", s.stale),
                ("rejected", s.rejected),
                ("failed", s.failed),
                ("dropped", s.dropped),
            ] {
                table.add_row(vec![format_status(status), Cell::new(count)]);
            }
            println!("{table}");

            if s.failed > 0 || s.dropped > 0 {
                print_warning("Some events were not fully stored; see the log for details");
            }
            Ok(())
        }
        other => print_output(run, other),
    }
}

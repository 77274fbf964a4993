//! Report liveness of both stores

use anyhow::{bail, Result};
use comfy_table::Cell;
use featurevault_core::{HealthReport, StoreHealth};

use crate::config::CliConfig;
use crate::output::{create_table, format_status, print_output, OutputFormat};
use crate::stores::create_feature_store;

use super::close_after;

pub async fn run(config: &CliConfig, format: OutputFormat) -> Result<()> {
    let store = create_feature_store(config).await?;
    let report = store.health().await;
    close_after(&store, Ok(())).await?;

    print_report(&report, format)?;
    if !report.alive {
        bail!("feature store is not alive");
    }
    Ok(())
}

fn status(health: &StoreHealth) -> &'static str {
    if health.alive {
        "alive"
    } else {
        "dead"
    }
}

fn print_report(report: &HealthReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            let mut table = create_table();
            table.set_header(vec!["Store", "Backend", "Status", "Latency"]);
            for (role, health) in [("latest", &report.latest), ("historical", &report.historical)] {
                table.add_row(vec![
                    Cell::new(role),
                    Cell::new(health.store_type),
                    format_status(status(health)),
                    Cell::new(format!("{}ms", health.latency_ms)),
                ]);
            }
            println!("{table}");
            Ok(())
        }
        other => print_output(report, other),
    }
}

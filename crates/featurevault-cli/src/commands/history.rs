//! Show historical records in a time window

use anyhow::Result;
use featurevault_core::RangeQuery;

use crate::config::CliConfig;
use crate::output::{print_info, print_output, records_table, OutputFormat};
use crate::stores::create_feature_store;

use super::{close_after, parse_timestamp};

pub async fn run(config: &CliConfig, start: &str, end: &str, format: OutputFormat) -> Result<()> {
    let query = RangeQuery::new(
        parse_timestamp(start, &config.schema)?,
        parse_timestamp(end, &config.schema)?,
    )?;
    let store = create_feature_store(config).await?;

    let result = store.get_historical(&query).await.map_err(Into::into);
    let records = close_after(&store, result).await?;

    match format {
        OutputFormat::Table if records.is_empty() => {
            print_info(&format!("No features between {} and {}", start, end));
        }
        OutputFormat::Table => {
            println!("{}", records_table(&records, &config.schema));
            print_info(&format!("{} records", records.len()));
        }
        other => print_output(&records, other)?,
    }
    Ok(())
}

//! End-to-end walk-through: ingest a file, query both stores, clean up

use anyhow::{bail, Result};
use featurevault_core::{FeatureStore, RangeQuery};

use crate::config::CliConfig;
use crate::output::{print_info, print_success, records_table, OutputFormat};
use crate::stores::create_feature_store;

use super::ingest::{ingest_file, print_run};
use super::{close_after, parse_timestamp};

pub struct DemoArgs<'a> {
    pub file: Option<&'a str>,
    pub entity: &'a str,
    pub start: &'a str,
    pub end: &'a str,
}

pub async fn run(config: &CliConfig, args: DemoArgs<'_>) -> Result<()> {
    let store = create_feature_store(config).await?;
    let result = walk_through(config, &store, &args).await;
    close_after(&store, result).await?;
    print_success("Demo finished; stores cleaned and closed");
    Ok(())
}

async fn walk_through(config: &CliConfig, store: &FeatureStore, args: &DemoArgs<'_>) -> Result<()> {
    let schema = &config.schema;
    if !store.is_alive().await {
        bail!("feature store is not alive; check the store URLs");
    }

    let path = args.file.unwrap_or(&config.data_path);
    let ingest_run = ingest_file(store, path).await?;
    print_run(&ingest_run, OutputFormat::Table)?;

    let entity_id = schema.entity_kind.parse_id(args.entity)?;
    match store.get_latest(&entity_id).await? {
        Some(record) => {
            print_info(&format!("Latest features for {} {}:", schema.entity_column, entity_id));
            println!("{}", records_table(std::slice::from_ref(&record), schema));
        }
        None => print_info(&format!("No features for {} {}", schema.entity_column, entity_id)),
    }

    let query = RangeQuery::new(
        parse_timestamp(args.start, schema)?,
        parse_timestamp(args.end, schema)?,
    )?;
    let records = store.get_historical(&query).await?;
    print_info(&format!(
        "Historical features between {} and {} ({} records):",
        args.start,
        args.end,
        records.len()
    ));
    println!("{}", records_table(&records, schema));

    store.clean().await?;
    Ok(())
}

//! Show the latest record of one entity

use anyhow::Result;

use crate::config::CliConfig;
use crate::output::{print_info, print_output, records_table, OutputFormat};
use crate::stores::create_feature_store;

use super::close_after;

pub async fn run(config: &CliConfig, entity_id: &str, format: OutputFormat) -> Result<()> {
    let id = config.schema.entity_kind.parse_id(entity_id)?;
    let store = create_feature_store(config).await?;

    let result = store.get_latest(&id).await.map_err(Into::into);
    let latest = close_after(&store, result).await?;

    match (format, latest) {
        (OutputFormat::Table, Some(record)) => {
            println!("{}", records_table(std::slice::from_ref(&record), &config.schema));
        }
        (OutputFormat::Table, None) => {
            print_info(&format!(
                "No features found for {} {}",
                config.schema.entity_column, id
            ));
        }
        (other, latest) => print_output(&latest, other)?,
    }
    Ok(())
}

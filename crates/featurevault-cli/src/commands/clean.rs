//! Remove all data from both stores

use anyhow::Result;

use crate::config::CliConfig;
use crate::output::print_success;
use crate::stores::create_feature_store;

use super::close_after;

pub async fn run(config: &CliConfig) -> Result<()> {
    let store = create_feature_store(config).await?;
    let result = store.clean().await.map_err(Into::into);
    close_after(&store, result).await?;

    print_success(&format!(
        "Cleaned {} and {} stores",
        store.latest_store().store_type(),
        store.historical_store().store_type()
    ));
    Ok(())
}

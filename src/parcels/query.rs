use anyhow::Context;
use std::{fs, path::PathBuf};

use crate::{arcgis::client::FeatureServiceClient, config::OutputConfig};

use super::paths::OutputPaths;

/// Query the feature service for `predicate` and save the raw response to
/// `<data_dir>/<owner><query_file_extension>`, overwriting any previous response. Nothing is
/// written when the query fails.
pub fn query_rest_server(
    owner: &str,
    predicate: &str,
    client: &FeatureServiceClient,
    config: &OutputConfig,
) -> anyhow::Result<PathBuf> {
    let output_filepath = OutputPaths::new(config).raw_query_file(owner)?;

    let result = client
        .query(predicate)
        .with_context(|| format!("Querying features for '{}'", owner))?;
    log::info!("Found {} features with {}", result.feature_count, predicate);

    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Creating data directory {:?}", config.data_dir))?;
    let contents = serde_json::to_string_pretty(&result.document)?;
    fs::write(&output_filepath, contents)
        .with_context(|| format!("Writing query response to {:?}", output_filepath))?;
    log::info!("Saved query response to {:?}", output_filepath);
    Ok(output_filepath)
}

use anyhow::anyhow;
use indicatif::ProgressBar;

use crate::{
    arcgis::client::FeatureServiceClient,
    config::{Config, FailurePolicy},
    geofile::feature::FeatureTable,
};

use super::{
    format::{format_and_save, save_table},
    paths::OutputPaths,
    query::query_rest_server,
};

pub struct OwnerFailure {
    pub owner: String,
    pub error: anyhow::Error,
}

/// Outcome of a batch run. `merged` is `None` only if every owner failed.
pub struct BatchReport {
    pub merged: Option<FeatureTable>,
    pub failures: Vec<OwnerFailure>,
}

impl BatchReport {
    pub fn failed_owners(&self) -> Vec<&str> {
        self.failures
            .iter()
            .map(|failure| failure.owner.as_str())
            .collect()
    }
}

/// Query one owner and format the saved response.
pub fn single_query_and_save(
    owner: &str,
    predicate: &str,
    client: &FeatureServiceClient,
    config: &Config,
) -> anyhow::Result<FeatureTable> {
    query_rest_server(owner, predicate, client, &config.output)?;
    format_and_save(owner, config)
}

/// Query and format every owner in registry order, then save all features as one merged table.
pub fn query_and_save_all(
    client: &FeatureServiceClient,
    config: &Config,
) -> anyhow::Result<BatchReport> {
    if config.owners.is_empty() {
        return Err(anyhow!("No owners configured"));
    }

    let mut tables = Vec::with_capacity(config.owners.len());
    let mut failures = Vec::new();
    let bar = ProgressBar::new(config.owners.len() as u64);
    for entry in &config.owners {
        log::info!("Processing owner '{}'", entry.owner);
        match single_query_and_save(&entry.owner, &entry.predicate, client, config) {
            Ok(table) => tables.push(table),
            Err(error) => match config.batch.failure_policy {
                FailurePolicy::Abort => {
                    bar.abandon();
                    return Err(error.context(format!("Processing owner '{}'", entry.owner)));
                }
                FailurePolicy::Continue => {
                    failures.push(OwnerFailure {
                        owner: entry.owner.clone(),
                        error,
                    });
                }
            },
        }
        bar.inc(1);
    }
    bar.finish();

    if tables.is_empty() {
        log::warn!("Every owner failed, no merged output written");
        return Ok(BatchReport {
            merged: None,
            failures,
        });
    }

    let merged_name = OutputPaths::new(&config.output).merged_name().to_string();
    let merged = FeatureTable::concat(&merged_name, tables)?;
    log::info!(
        "Merged {} features from {} owners",
        merged.len(),
        config.owners.len() - failures.len()
    );
    save_table(&merged, &merged_name, &config.output)?;
    Ok(BatchReport {
        merged: Some(merged),
        failures,
    })
}

extern crate log;
pub mod arcgis;
pub mod config;
pub mod crs;
pub mod geofile;
pub mod parcels;
use crate::arcgis::client::{FeatureServiceClient, USE_NATIVE_TLS_ENV};
use crate::config::Config;
use crate::parcels::batch::{query_and_save_all, single_query_and_save, BatchReport};
use crate::parcels::format::format_and_save;
use crate::parcels::query::query_rest_server;
use anyhow::anyhow;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Query parcels by owner from an ArcGIS feature service and save them as GeoJSON and CSV.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML config file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config_filepath: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query the feature service with an attribute filter and save the raw response.
    QueryRestServer {
        owner_name: String,
        /// Defaults to the configured filter for the owner.
        attribute_filter: Option<String>,
    },
    /// Add computed acres to a saved response and save it as GeoJSON and CSV.
    FormatAndSave { owner_name: String },
    /// Query and format a single owner.
    SingleQueryAndSave {
        owner_name: String,
        /// Defaults to the configured filter for the owner.
        attribute_filter: Option<String>,
    },
    /// Query and format every configured owner, then merge all parcels into one output.
    QueryAndSaveAll,
}

fn resolve_attribute_filter(
    config: &Config,
    owner_name: &str,
    attribute_filter: Option<String>,
) -> anyhow::Result<String> {
    match attribute_filter {
        Some(attribute_filter) => Ok(attribute_filter),
        None => config
            .owners
            .get(owner_name)
            .map(|entry| entry.predicate.clone())
            .ok_or_else(|| {
                anyhow!(
                    "No attribute filter given and no filter configured for owner '{}'",
                    owner_name
                )
            }),
    }
}

/// Log each owner the batch skipped, once, and fail if there were any.
fn check_batch_report(report: &BatchReport) -> anyhow::Result<()> {
    if let Some(merged) = &report.merged {
        log::info!("Saved {} parcels in total", merged.len());
    }
    if report.failures.is_empty() {
        return Ok(());
    }
    for failure in &report.failures {
        log::error!("Skipped owner '{}': {:#}", failure.owner, failure.error);
    }
    Err(anyhow!(
        "Failed to process owners: {}",
        report.failed_owners().join(", ")
    ))
}

fn try_main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    if std::env::var(USE_NATIVE_TLS_ENV).is_err() {
        std::env::set_var(USE_NATIVE_TLS_ENV, "FALSE")
    }
    env_logger::init();

    let args = Args::parse();
    let config = match &args.config_filepath {
        Some(config_filepath) => Config::from_yaml_file(config_filepath)?,
        None => Config::default(),
    };

    match args.command {
        Command::QueryRestServer {
            owner_name,
            attribute_filter,
        } => {
            let attribute_filter = resolve_attribute_filter(&config, &owner_name, attribute_filter)?;
            let client = FeatureServiceClient::new(&config.service)?;
            query_rest_server(&owner_name, &attribute_filter, &client, &config.output)?;
        }
        Command::FormatAndSave { owner_name } => {
            format_and_save(&owner_name, &config)?;
        }
        Command::SingleQueryAndSave {
            owner_name,
            attribute_filter,
        } => {
            let attribute_filter = resolve_attribute_filter(&config, &owner_name, attribute_filter)?;
            let client = FeatureServiceClient::new(&config.service)?;
            single_query_and_save(&owner_name, &attribute_filter, &client, &config)?;
        }
        Command::QueryAndSaveAll => {
            let client = FeatureServiceClient::new(&config.service)?;
            let report = query_and_save_all(&client, &config)?;
            check_batch_report(&report)?;
        }
    }
    Ok(())
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::{
        config::Config,
        geofile::feature::FeatureTable,
        parcels::batch::{BatchReport, OwnerFailure},
    };

    use super::{check_batch_report, resolve_attribute_filter, Args, Command};

    #[test]
    fn test_parse_positional_arguments() {
        let args = Args::try_parse_from([
            "owner_parcels",
            "query-rest-server",
            "wpi",
            "OWNER_NAME LIKE '%WPI%'",
        ])
        .unwrap();
        assert!(args.config_filepath.is_none());
        match args.command {
            Command::QueryRestServer {
                owner_name,
                attribute_filter,
            } => {
                assert_eq!(owner_name, "wpi");
                assert_eq!(attribute_filter.as_deref(), Some("OWNER_NAME LIKE '%WPI%'"));
            }
            other => panic!("Unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_and_batch_command() {
        let args =
            Args::try_parse_from(["owner_parcels", "-c", "parcels.yaml", "query-and-save-all"])
                .unwrap();
        assert_eq!(
            args.config_filepath.unwrap().to_str(),
            Some("parcels.yaml")
        );
        assert!(matches!(args.command, Command::QueryAndSaveAll));
    }

    #[test]
    fn test_missing_owner_is_rejected() {
        assert!(Args::try_parse_from(["owner_parcels", "format-and-save"]).is_err());
    }

    #[test]
    fn test_resolve_attribute_filter() {
        let config = Config::default();
        assert_eq!(
            resolve_attribute_filter(&config, "vidler", None).unwrap(),
            "OWNER_NAME LIKE '%VIDLER%'"
        );
        assert_eq!(
            resolve_attribute_filter(&config, "vidler", Some("APN = '1'".to_string())).unwrap(),
            "APN = '1'"
        );
        assert!(resolve_attribute_filter(&config, "nobody", None).is_err());
    }

    #[test]
    fn test_check_batch_report() {
        let report = BatchReport {
            merged: Some(FeatureTable::new("all-parcels", 4326, Vec::new())),
            failures: Vec::new(),
        };
        assert!(check_batch_report(&report).is_ok());

        let report = BatchReport {
            merged: None,
            failures: vec![
                OwnerFailure {
                    owner: "alpha".to_string(),
                    error: anyhow::anyhow!("Invalid query"),
                },
                OwnerFailure {
                    owner: "beta".to_string(),
                    error: anyhow::anyhow!("Service unavailable"),
                },
            ],
        };
        let error = check_batch_report(&report).unwrap_err();
        assert_eq!(error.to_string(), "Failed to process owners: alpha, beta");
    }
}

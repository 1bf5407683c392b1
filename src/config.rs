use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};

use crate::{crs::crs_utils::EpsgCode, parcels::registry::FilterRegistry};

/// Maricopa County Assessor parcel layer.
pub const DEFAULT_DATA_SOURCE: &str =
    "https://gis.mcassessor.maricopa.gov/arcgis/rest/services/MaricopaDynamicQueryService/MapServer/3";

/// Square meters in one international acre.
pub const SQUARE_METERS_PER_ACRE: f64 = 4046.8564224;

/// NAD83 / Conus Albers, an equal-area projection.
pub const ALBERS_EQUAL_AREA: EpsgCode = 5070;

pub const WGS84: EpsgCode = 4326;

/// Response encoding requested from the feature service with the `f` parameter.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Esri JSON feature set.
    Json,
    GeoJson,
}

impl ResponseFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ResponseFormat::Json => "json",
            ResponseFormat::GeoJson => "geojson",
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    /// URL of the feature-service layer, without the trailing `/query`.
    pub data_source: String,
    /// Spatial reference of returned geometries. `None` leaves it to the service.
    pub out_sr: Option<EpsgCode>,
    pub response_format: ResponseFormat,
    /// Page through the object ids of all matches instead of accepting the service's per-request
    /// record limit.
    pub exceed_limit: bool,
    /// Records per page. Read from the layer's `maxRecordCount` when not set.
    pub page_size: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_source: DEFAULT_DATA_SOURCE.to_string(),
            out_sr: Some(WGS84),
            response_format: ResponseFormat::Json,
            exceed_limit: true,
            page_size: None,
            timeout_secs: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub data_dir: PathBuf,
    pub merged_filename: String,
    pub query_file_extension: String,
    pub geojson_file_extension: String,
    pub csv_file_extension: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            merged_filename: "all-parcels".to_string(),
            query_file_extension: ".json".to_string(),
            geojson_file_extension: ".geojson".to_string(),
            csv_file_extension: ".csv".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AreaConfig {
    pub equal_area_crs: EpsgCode,
    pub square_meters_per_acre: f64,
    pub column: String,
    pub decimals: u32,
}

impl Default for AreaConfig {
    fn default() -> Self {
        Self {
            equal_area_crs: ALBERS_EQUAL_AREA,
            square_meters_per_acre: SQUARE_METERS_PER_ACRE,
            column: "gis_acres".to_string(),
            decimals: 2,
        }
    }
}

/// What the batch driver does when one owner fails.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failing owner, nothing is merged.
    #[default]
    Abort,
    /// Skip failing owners, merge the rest and report the failures afterwards.
    Continue,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct BatchConfig {
    pub failure_policy: FailurePolicy,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub output: OutputConfig,
    pub area: AreaConfig,
    pub batch: BatchConfig,
    pub owners: FilterRegistry,
}

impl Config {
    pub fn from_yaml_file(filepath: &Path) -> anyhow::Result<Self> {
        if !filepath.exists() {
            return Err(anyhow!("Config file {:?} not found", filepath));
        }
        let config_contents = read_to_string(filepath)?;
        serde_yaml::from_str(&config_contents)
            .with_context(|| format!("Parsing config file {:?}", filepath))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use testdir::testdir;

    use super::{Config, FailurePolicy, ResponseFormat, ALBERS_EQUAL_AREA, DEFAULT_DATA_SOURCE};

    #[test]
    fn test_defaults_match_original_constants() {
        let config = Config::default();
        assert_eq!(config.service.data_source, DEFAULT_DATA_SOURCE);
        assert_eq!(config.service.out_sr, Some(4326));
        assert_eq!(config.service.response_format, ResponseFormat::Json);
        assert!(config.service.exceed_limit);
        assert_eq!(config.output.data_dir, PathBuf::from("data"));
        assert_eq!(config.output.merged_filename, "all-parcels");
        assert_eq!(config.area.equal_area_crs, ALBERS_EQUAL_AREA);
        assert_eq!(config.area.square_meters_per_acre, 4046.8564224);
        assert_eq!(config.area.column, "gis_acres");
        assert_eq!(config.batch.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.owners.len(), 5);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
service:
  response_format: geojson
  page_size: 250
output:
  data_dir: /tmp/parcels
batch:
  failure_policy: continue
owners:
  - owner: wpi
    predicate: "OWNER_NAME LIKE '%WPI%'"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.service.response_format, ResponseFormat::GeoJson);
        assert_eq!(config.service.page_size, Some(250));
        assert_eq!(config.service.data_source, DEFAULT_DATA_SOURCE);
        assert_eq!(config.output.data_dir, PathBuf::from("/tmp/parcels"));
        assert_eq!(config.output.csv_file_extension, ".csv");
        assert_eq!(config.batch.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.owners.len(), 1);
        assert_eq!(config.area.decimals, 2);
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let config: Config = serde_yaml::from_str(include_str!("../config.example.yaml")).unwrap();
        let defaults = Config::default();
        assert_eq!(config.owners, defaults.owners);
        assert_eq!(config.service.data_source, defaults.service.data_source);
        assert_eq!(config.service.timeout_secs, Some(120));
        assert_eq!(
            config.area.square_meters_per_acre,
            defaults.area.square_meters_per_acre
        );
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = testdir!();
        let filepath = dir.join("config.yaml");
        std::fs::write(&filepath, "service:\n  exceed_limit: false\n").unwrap();
        let config = Config::from_yaml_file(&filepath).unwrap();
        assert!(!config.service.exceed_limit);

        assert!(Config::from_yaml_file(&dir.join("missing.yaml")).is_err());
    }
}

use anyhow::Context;
use std::fs;

use crate::{
    config::{Config, OutputConfig},
    crs::area::AreaCalculator,
    geofile::{
        csv::write_feature_table_to_csv,
        feature::FeatureTable,
        geojson::{read_feature_table, write_feature_table_to_geojson},
    },
};

use super::paths::OutputPaths;

/// Load the saved query response for `owner`, add the area column and save the result as GeoJSON
/// and CSV.
pub fn format_and_save(owner: &str, config: &Config) -> anyhow::Result<FeatureTable> {
    let raw_filepath = OutputPaths::new(&config.output).raw_query_file(owner)?;
    let mut table = read_feature_table(&raw_filepath, owner)?;
    if table.is_empty() {
        log::warn!("No features found in {:?}", raw_filepath);
    }

    let calculator = AreaCalculator::new(table.crs, &config.area)?;
    calculator
        .add_area_column(&mut table, &config.area.column)
        .with_context(|| format!("Computing areas for '{}'", owner))?;

    save_table(&table, owner, &config.output)?;
    Ok(table)
}

/// Write `<data_dir>/<name>.geojson` and `<data_dir>/<name>.csv`, overwriting existing files.
pub fn save_table(table: &FeatureTable, name: &str, config: &OutputConfig) -> anyhow::Result<()> {
    let paths = OutputPaths::new(config);
    let geojson_filepath = paths.geojson_file(name)?;
    let csv_filepath = paths.csv_file(name)?;
    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Creating data directory {:?}", config.data_dir))?;
    write_feature_table_to_geojson(table, &geojson_filepath)?;
    write_feature_table_to_csv(table, &csv_filepath)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use std::{collections::BTreeSet, fs, path::Path};
    use testdir::testdir;

    use crate::config::{Config, OutputConfig};

    use super::format_and_save;

    fn config(data_dir: &Path) -> Config {
        Config {
            output: OutputConfig {
                data_dir: data_dir.to_path_buf(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Esri JSON response with one 2000 m square in EPSG:5070 and one feature without geometry.
    fn write_raw_response(data_dir: &Path) {
        let (x, y) = (-1_600_000.0, 1_300_000.0);
        let response = json!({
            "geometryType": "esriGeometryPolygon",
            "spatialReference": {"wkid": 5070},
            "features": [
                {
                    "attributes": {"APN": "500-01-001", "OWNER_NAME": "WPI LLC"},
                    "geometry": {"rings": [[[x, y], [x, y + 2000.0], [x + 2000.0, y + 2000.0], [x + 2000.0, y], [x, y]]]}
                },
                {
                    "attributes": {"APN": "500-01-002", "OWNER_NAME": "WPI LLC"},
                    "geometry": null
                }
            ]
        });
        fs::write(data_dir.join("wpi.json"), response.to_string()).unwrap();
    }

    #[test]
    fn test_format_adds_acres_and_writes_outputs() {
        let data_dir = testdir!();
        write_raw_response(&data_dir);

        let table = format_and_save("wpi", &config(&data_dir)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(&table.features[0], "gis_acres"), &json!(988.42));
        assert_eq!(table.value(&table.features[1], "gis_acres"), &Value::Null);

        let geojson: Value =
            serde_json::from_str(&fs::read_to_string(data_dir.join("wpi.geojson")).unwrap())
                .unwrap();
        assert_eq!(geojson["name"], json!("wpi"));
        assert_eq!(
            geojson["crs"]["properties"]["name"],
            json!("urn:ogc:def:crs:EPSG::5070")
        );
        assert_eq!(
            geojson["features"][0]["properties"]["gis_acres"],
            json!(988.42)
        );

        let csv = fs::read_to_string(data_dir.join("wpi.csv")).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(",APN,OWNER_NAME,geometry,gis_acres"));
        let first_row = lines.next().unwrap();
        assert!(first_row.starts_with("0,500-01-001,WPI LLC,\"POLYGON(("));
        assert!(first_row.ends_with(",988.42"));
        assert_eq!(lines.next(), Some("1,500-01-002,WPI LLC,,"));
    }

    #[test]
    fn test_format_touches_only_owner_files() {
        let data_dir = testdir!();
        write_raw_response(&data_dir);

        format_and_save("wpi", &config(&data_dir)).unwrap();
        let names: BTreeSet<String> = fs::read_dir(&data_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            BTreeSet::from([
                "wpi.csv".to_string(),
                "wpi.geojson".to_string(),
                "wpi.json".to_string()
            ])
        );
    }

    #[test]
    fn test_format_twice_is_byte_identical() {
        let data_dir = testdir!();
        write_raw_response(&data_dir);
        let config = config(&data_dir);

        format_and_save("wpi", &config).unwrap();
        let first_geojson = fs::read(data_dir.join("wpi.geojson")).unwrap();
        let first_csv = fs::read(data_dir.join("wpi.csv")).unwrap();

        format_and_save("wpi", &config).unwrap();
        assert_eq!(fs::read(data_dir.join("wpi.geojson")).unwrap(), first_geojson);
        assert_eq!(fs::read(data_dir.join("wpi.csv")).unwrap(), first_csv);
    }

    #[test]
    fn test_format_without_raw_file_fails() {
        let data_dir = testdir!();
        assert!(format_and_save("wpi", &config(&data_dir)).is_err());
        assert!(!data_dir.join("wpi.geojson").exists());
    }
}

use anyhow::Context;
use serde_json::Value;
use std::path::Path;
use wkt::ToWkt;

use super::feature::{FeatureTable, GEOMETRY_COLUMN};

/// Write the table as CSV. The first, unnamed column is the row index; geometries are written as
/// WKT.
pub fn write_feature_table_to_csv(
    table: &FeatureTable,
    output_filepath: &Path,
) -> anyhow::Result<()> {
    log::info!(
        "Writing {} rows to {:?}",
        table.len(),
        output_filepath
    );
    let mut writer = csv::Writer::from_path(output_filepath)
        .with_context(|| format!("Creating {:?}", output_filepath))?;

    let mut header = vec![String::new()];
    header.extend(table.columns().iter().cloned());
    writer.write_record(&header)?;

    for (index, feature) in table.features.iter().enumerate() {
        let mut record = vec![index.to_string()];
        for column in table.columns() {
            if column == GEOMETRY_COLUMN {
                record.push(match &feature.geometry {
                    Some(geometry) => geometry.wkt_string(),
                    None => String::new(),
                });
            } else {
                record.push(value_to_field(table.value(feature, column)));
            }
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn value_to_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::fs;
    use testdir::testdir;

    use crate::geofile::feature::{Feature, FeatureTable};

    use super::write_feature_table_to_csv;

    #[test]
    fn test_geometry_written_as_wkt() {
        let dir = testdir!();
        let filepath = dir.join("points.csv");
        let table = FeatureTable::new(
            "points",
            4326,
            vec![Feature::from(geo::Geometry::Point(geo::Point::new(-112.5, 33.0)))],
        );
        write_feature_table_to_csv(&table, &filepath).unwrap();

        let contents = fs::read_to_string(&filepath).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec![",geometry", "0,POINT(-112.5 33)"]);
    }

    #[test]
    fn test_write_csv() {
        let dir = testdir!();
        let filepath = dir.join("out.csv");
        let mut table = FeatureTable::new(
            "out",
            4326,
            vec![
                Feature {
                    geometry: None,
                    attributes: serde_json::from_value(
                        json!({"APN": "500-01-001", "OWNER_NAME": "WPI, LLC", "ZIP": 85001}),
                    )
                    .unwrap(),
                },
                Feature {
                    geometry: None,
                    attributes: serde_json::from_value(json!({"APN": "500-01-002"})).unwrap(),
                },
            ],
        );
        table
            .set_column("gis_acres", vec![json!(1.5), json!(null)])
            .unwrap();
        write_feature_table_to_csv(&table, &filepath).unwrap();

        let contents = fs::read_to_string(&filepath).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines,
            vec![
                ",APN,OWNER_NAME,ZIP,geometry,gis_acres",
                "0,500-01-001,\"WPI, LLC\",85001,,1.5",
                "1,500-01-002,,,,",
            ]
        );
    }
}

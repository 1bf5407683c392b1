use anyhow::{anyhow, Context};
use serde_json::Value;
use std::{fs, path::Path};

use crate::{
    config::WGS84,
    crs::crs_utils::{epsg_code_from_crs_name, EpsgCode},
};

use super::{
    esri_json::EsriFeatureSet,
    feature::{Attributes, Feature, FeatureTable},
};

/// Read a saved query response, either a GeoJSON FeatureCollection or an Esri JSON feature set.
pub fn read_feature_table(filepath: &Path, name: &str) -> anyhow::Result<FeatureTable> {
    let contents =
        fs::read_to_string(filepath).with_context(|| format!("Reading {:?}", filepath))?;
    let document: Value = serde_json::from_str(&contents)
        .with_context(|| format!("Parsing JSON from {:?}", filepath))?;

    let is_geojson = document.get("type").and_then(Value::as_str) == Some("FeatureCollection");
    let table = if is_geojson {
        read_geojson_document(document, name)
    } else {
        read_esri_document(document, name)
    };
    let table = table.with_context(|| format!("Reading features from {:?}", filepath))?;
    log::info!(
        "Read {} features in EPSG:{} from {:?}",
        table.len(),
        table.crs,
        filepath
    );
    Ok(table)
}

fn read_esri_document(document: Value, name: &str) -> anyhow::Result<FeatureTable> {
    let feature_set: EsriFeatureSet = serde_json::from_value(document)?;
    let crs = feature_set.crs()?;
    Ok(FeatureTable::new(name, crs, feature_set.into_features()?))
}

fn read_geojson_document(document: Value, name: &str) -> anyhow::Result<FeatureTable> {
    let crs = match document
        .pointer("/crs/properties/name")
        .and_then(Value::as_str)
    {
        Some(crs_name) => epsg_code_from_crs_name(crs_name)?,
        None => WGS84,
    };
    let feature_collection = match geojson::GeoJson::from_json_value(document)? {
        geojson::GeoJson::FeatureCollection(feature_collection) => feature_collection,
        _ => return Err(anyhow!("Expected a GeoJSON FeatureCollection")),
    };
    let features = feature_collection
        .features
        .into_iter()
        .map(|feature| -> anyhow::Result<Feature> {
            let geometry = match feature.geometry {
                Some(geometry) => Some(geo::Geometry::try_from(geometry)?),
                None => None,
            };
            Ok(Feature {
                geometry,
                attributes: feature.properties.unwrap_or_default(),
            })
        })
        .collect::<anyhow::Result<_>>()?;
    Ok(FeatureTable::new(name, crs, features))
}

/// Write the table as a GeoJSON FeatureCollection named after the table. Every feature carries all
/// attribute columns, null where it has no value.
pub fn write_feature_table_to_geojson(
    table: &FeatureTable,
    output_filepath: &Path,
) -> anyhow::Result<()> {
    let features: Vec<geojson::Feature> = table
        .features
        .iter()
        .map(|feature| {
            let properties: Attributes = table
                .attribute_columns()
                .map(|column| (column.clone(), table.value(feature, column).clone()))
                .collect();
            geojson::Feature {
                bbox: None,
                geometry: feature
                    .geometry
                    .as_ref()
                    .map(|geometry| geojson::Geometry::new(geojson::Value::from(geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let mut foreign_members = geojson::JsonObject::new();
    foreign_members.insert("name".to_string(), Value::from(table.name.as_str()));
    if table.crs != WGS84 {
        foreign_members.insert("crs".to_string(), crs_member(table.crs));
    }
    let feature_collection = geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign_members),
    };

    log::info!(
        "Writing {} features to {:?}",
        table.len(),
        output_filepath
    );
    let geojson_contents = geojson::GeoJson::from(feature_collection);
    fs::write(output_filepath, geojson_contents.to_string())
        .with_context(|| format!("Writing {:?}", output_filepath))
}

fn crs_member(crs: EpsgCode) -> Value {
    serde_json::json!({
        "type": "name",
        "properties": {"name": format!("urn:ogc:def:crs:EPSG::{}", crs)}
    })
}

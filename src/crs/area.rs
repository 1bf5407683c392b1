use anyhow::anyhow;
use geo::Area;
use proj::Transform;
use serde_json::Value;

use crate::{config::AreaConfig, geofile::feature::FeatureTable};

use super::crs_utils::{projection_between, EpsgCode};

/// Computes feature areas in acres by projecting geometries into an equal-area CRS.
pub struct AreaCalculator {
    // None when the source CRS already is the equal-area CRS.
    projection: Option<proj::Proj>,
    square_units_per_acre: f64,
    decimals: u32,
}

impl AreaCalculator {
    pub fn new(source_crs: EpsgCode, config: &AreaConfig) -> anyhow::Result<Self> {
        let projection = if source_crs == config.equal_area_crs {
            None
        } else {
            log::debug!(
                "Projecting EPSG:{} to EPSG:{} for area calculation",
                source_crs,
                config.equal_area_crs
            );
            Some(projection_between(source_crs, config.equal_area_crs)?)
        };
        Ok(Self {
            projection,
            square_units_per_acre: config.square_meters_per_acre,
            decimals: config.decimals,
        })
    }

    /// Area of the geometry in acres, rounded to the configured number of decimals.
    pub fn acres(&self, geometry: &geo::Geometry) -> anyhow::Result<f64> {
        let planar_area = match &self.projection {
            Some(projection) => geometry
                .transformed(projection)
                .map_err(|err| anyhow!("Could not project geometry, {}", err))?
                .unsigned_area(),
            None => geometry.unsigned_area(),
        };
        Ok(round_half_even(
            planar_area / self.square_units_per_acre,
            self.decimals,
        ))
    }

    /// Add `column` to the table with the area of each feature, null for features without geometry.
    pub fn add_area_column(&self, table: &mut FeatureTable, column: &str) -> anyhow::Result<()> {
        let values = table
            .features
            .iter()
            .map(|feature| match &feature.geometry {
                Some(geometry) => self.acres(geometry).map(Value::from),
                None => Ok(Value::Null),
            })
            .collect::<anyhow::Result<Vec<Value>>>()?;
        table.set_column(column, values)
    }
}

/// Round to `decimals` places, sending ties to the even neighbour the way numpy does.
pub fn round_half_even(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round_ties_even() / scale
}

use anyhow::anyhow;
use geo::{Area, Contains, Winding};
use serde::{Deserialize, Deserializer};

use crate::crs::crs_utils::EpsgCode;

use super::feature::{Attributes, Feature};

/// Position as serialized by ArcGIS, `[x, y]` optionally followed by z and m.
type Position = Vec<f64>;

/// Esri JSON feature set, as returned by a layer query with `f=json`.
#[derive(Deserialize, Debug)]
pub struct EsriFeatureSet {
    #[serde(default, rename = "spatialReference")]
    pub spatial_reference: Option<EsriSpatialReference>,
    #[serde(default)]
    pub features: Vec<EsriFeature>,
}

#[derive(Deserialize, Debug)]
pub struct EsriSpatialReference {
    pub wkid: Option<EpsgCode>,
    #[serde(rename = "latestWkid")]
    pub latest_wkid: Option<EpsgCode>,
    pub wkt: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct EsriFeature {
    #[serde(default)]
    pub attributes: Attributes,
    pub geometry: Option<EsriGeometry>,
}

/// The geometry kinds ArcGIS serializes; the kind is implied by which keys are present.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum EsriGeometry {
    Polygon { rings: Vec<Vec<Position>> },
    Polyline { paths: Vec<Vec<Position>> },
    MultiPoint { points: Vec<Position> },
    Point {
        #[serde(default, deserialize_with = "deserialize_ordinate")]
        x: Option<f64>,
        #[serde(default, deserialize_with = "deserialize_ordinate")]
        y: Option<f64>,
    },
}

/// ArcGIS writes the ordinates of an empty point either as `null` or as the string `"NaN"`.
fn deserialize_ordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Ordinate {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Ordinate>::deserialize(deserializer)? {
        Some(Ordinate::Number(value)) => Some(value),
        Some(Ordinate::Text(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite()),
        None => None,
    })
}

impl EsriFeatureSet {
    /// EPSG code of the feature set. Fails if the response states no code, since areas would
    /// otherwise be computed in a guessed CRS.
    pub fn crs(&self) -> anyhow::Result<EpsgCode> {
        match &self.spatial_reference {
            Some(EsriSpatialReference {
                latest_wkid: Some(code),
                ..
            })
            | Some(EsriSpatialReference {
                wkid: Some(code), ..
            }) => Ok(*code),
            Some(EsriSpatialReference { wkt: Some(wkt), .. }) => Err(anyhow!(
                "Spatial reference has no EPSG code, only WKT: {}",
                wkt
            )),
            _ => Err(anyhow!("Feature set has no spatial reference code")),
        }
    }

    pub fn into_features(self) -> anyhow::Result<Vec<Feature>> {
        self.features
            .into_iter()
            .map(|feature| -> anyhow::Result<Feature> {
                Ok(Feature {
                    geometry: match feature.geometry {
                        Some(geometry) => geometry.to_geo()?,
                        None => None,
                    },
                    attributes: feature.attributes,
                })
            })
            .collect()
    }
}

impl EsriGeometry {
    /// Convert to a geo geometry. Empty geometries convert to `None`.
    pub fn to_geo(&self) -> anyhow::Result<Option<geo::Geometry>> {
        let geometry = match self {
            EsriGeometry::Point { x, y } => match (x, y) {
                (Some(x), Some(y)) => Some(geo::Geometry::Point(geo::Point::new(*x, *y))),
                _ => None,
            },
            EsriGeometry::MultiPoint { points } => {
                if points.is_empty() {
                    return Ok(None);
                }
                let points = points
                    .iter()
                    .map(|position| to_coord(position).map(geo::Point::from))
                    .collect::<anyhow::Result<Vec<geo::Point>>>()?;
                Some(geo::Geometry::MultiPoint(geo::MultiPoint::new(points)))
            }
            EsriGeometry::Polyline { paths } => {
                let mut lines = paths
                    .iter()
                    .map(|path| to_line_string(path))
                    .collect::<anyhow::Result<Vec<geo::LineString>>>()?;
                match lines.len() {
                    0 => None,
                    1 => lines.pop().map(geo::Geometry::LineString),
                    _ => Some(geo::Geometry::MultiLineString(geo::MultiLineString::new(
                        lines,
                    ))),
                }
            }
            EsriGeometry::Polygon { rings } => {
                let mut polygons = rings_to_polygons(rings)?;
                match polygons.len() {
                    0 => None,
                    1 => polygons.pop().map(geo::Geometry::Polygon),
                    _ => Some(geo::Geometry::MultiPolygon(geo::MultiPolygon::new(polygons))),
                }
            }
        };
        Ok(geometry)
    }
}

fn to_coord(position: &[f64]) -> anyhow::Result<geo::Coord> {
    match position {
        [x, y, ..] => Ok(geo::Coord { x: *x, y: *y }),
        _ => Err(anyhow!(
            "Expected a position with at least two ordinates, got {:?}",
            position
        )),
    }
}

fn to_line_string(path: &[Position]) -> anyhow::Result<geo::LineString> {
    path.iter()
        .map(|position| to_coord(position))
        .collect::<anyhow::Result<Vec<geo::Coord>>>()
        .map(geo::LineString::new)
}

/// Group Esri rings into polygons. Clockwise rings are exteriors, counter-clockwise rings are
/// holes. A hole belongs to the smallest exterior containing it, or to the exterior listed before
/// it when none does. A counter-clockwise ring ahead of every exterior is taken as an exterior.
fn rings_to_polygons(rings: &[Vec<Position>]) -> anyhow::Result<Vec<geo::Polygon>> {
    let mut exteriors: Vec<geo::Polygon> = Vec::new();
    let mut holes: Vec<(geo::LineString, usize)> = Vec::new();
    for ring in rings {
        let ring = to_line_string(ring)?;
        if ring.0.len() < 3 {
            log::warn!("Skipping degenerate ring with {} positions", ring.0.len());
            continue;
        }
        if ring.is_ccw() && !exteriors.is_empty() {
            holes.push((ring, exteriors.len() - 1));
        } else {
            exteriors.push(geo::Polygon::new(ring, Vec::new()));
        }
    }

    let mut interiors: Vec<Vec<geo::LineString>> = vec![Vec::new(); exteriors.len()];
    for (hole, preceding) in holes {
        let index = exteriors
            .iter()
            .enumerate()
            .filter(|(_, exterior)| exterior.contains(&hole))
            .min_by(|(_, a), (_, b)| a.unsigned_area().total_cmp(&b.unsigned_area()))
            .map(|(index, _)| index)
            .unwrap_or(preceding);
        interiors[index].push(hole);
    }
    Ok(exteriors
        .into_iter()
        .zip(interiors)
        .map(|(exterior, holes)| geo::Polygon::new(exterior.into_inner().0, holes))
        .collect())
}

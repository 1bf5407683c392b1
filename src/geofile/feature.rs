use anyhow::anyhow;
use serde_json::Value;

use crate::crs::crs_utils::EpsgCode;

/// Attribute values of a feature, in the order the source listed them.
pub type Attributes = serde_json::Map<String, Value>;

/// Name of the pseudo column holding feature geometries.
pub const GEOMETRY_COLUMN: &str = "geometry";

static NULL: Value = Value::Null;

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<geo::Geometry>,
    pub attributes: Attributes,
}

impl From<geo::Geometry> for Feature {
    fn from(value: geo::Geometry) -> Self {
        Self {
            geometry: Some(value),
            attributes: Attributes::new(),
        }
    }
}

/// Features sharing one CRS, with an ordered column list like a data frame. The row index of a
/// feature is its position in `features`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub name: String,
    pub crs: EpsgCode,
    columns: Vec<String>,
    pub features: Vec<Feature>,
}

impl FeatureTable {
    /// Build a table whose columns are the attribute keys in first-seen order, followed by the
    /// geometry column.
    pub fn new(name: &str, crs: EpsgCode, features: Vec<Feature>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for feature in &features {
            for key in feature.attributes.keys() {
                if key != GEOMETRY_COLUMN && !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        columns.push(GEOMETRY_COLUMN.to_string());
        Self {
            name: name.to_string(),
            crs,
            columns,
            features,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Columns backed by attribute values, i.e. everything except the geometry column.
    pub fn attribute_columns(&self) -> impl Iterator<Item = &String> {
        self.columns
            .iter()
            .filter(|column| column.as_str() != GEOMETRY_COLUMN)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Set one value per feature for `column`, appending the column if it is new.
    pub fn set_column(&mut self, column: &str, values: Vec<Value>) -> anyhow::Result<()> {
        if column == GEOMETRY_COLUMN {
            return Err(anyhow!("Cannot overwrite the geometry column"));
        }
        if values.len() != self.features.len() {
            return Err(anyhow!(
                "Column '{}' has {} values for {} features",
                column,
                values.len(),
                self.features.len()
            ));
        }
        if !self.columns.iter().any(|existing| existing == column) {
            self.columns.push(column.to_string());
        }
        for (feature, value) in self.features.iter_mut().zip(values) {
            feature.attributes.insert(column.to_string(), value);
        }
        Ok(())
    }

    /// The value of `column` for a feature, `Null` if the feature does not have it.
    pub fn value<'a>(&self, feature: &'a Feature, column: &str) -> &'a Value {
        feature.attributes.get(column).unwrap_or(&NULL)
    }

    /// Concatenate tables in order. Columns are unioned in first-seen order and row indices run
    /// sequentially over the result.
    pub fn concat(name: &str, tables: Vec<FeatureTable>) -> anyhow::Result<Self> {
        let crs = match tables.first() {
            Some(table) => table.crs,
            None => return Err(anyhow!("No tables to concatenate")),
        };
        let mut columns: Vec<String> = Vec::new();
        let mut features = Vec::new();
        for table in tables {
            if table.crs != crs {
                return Err(anyhow!(
                    "Cannot concatenate table '{}' in EPSG:{} with tables in EPSG:{}",
                    table.name,
                    table.crs,
                    crs
                ));
            }
            for column in table.columns {
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
            features.extend(table.features);
        }
        Ok(Self {
            name: name.to_string(),
            crs,
            columns,
            features,
        })
    }
}

pub mod csv;
pub mod esri_json;
pub mod feature;
pub mod geojson;

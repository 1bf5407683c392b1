pub mod area;
pub mod crs_utils;

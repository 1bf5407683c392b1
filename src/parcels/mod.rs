pub mod batch;
pub mod format;
pub mod paths;
pub mod query;
pub mod registry;

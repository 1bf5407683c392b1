use std::path::PathBuf;

use crate::config::OutputConfig;

use super::registry::validate_owner_key;

/// Output file locations, `<data_dir>/<name><extension>`.
pub struct OutputPaths<'a> {
    config: &'a OutputConfig,
}

impl<'a> OutputPaths<'a> {
    pub fn new(config: &'a OutputConfig) -> Self {
        Self { config }
    }

    pub fn raw_query_file(&self, owner: &str) -> anyhow::Result<PathBuf> {
        self.owner_file(owner, &self.config.query_file_extension)
    }

    pub fn geojson_file(&self, owner: &str) -> anyhow::Result<PathBuf> {
        self.owner_file(owner, &self.config.geojson_file_extension)
    }

    pub fn csv_file(&self, owner: &str) -> anyhow::Result<PathBuf> {
        self.owner_file(owner, &self.config.csv_file_extension)
    }

    pub fn merged_name(&self) -> &str {
        &self.config.merged_filename
    }

    fn owner_file(&self, owner: &str, extension: &str) -> anyhow::Result<PathBuf> {
        validate_owner_key(owner)?;
        Ok(self.config.data_dir.join(format!("{}{}", owner, extension)))
    }
}

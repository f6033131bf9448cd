//! `config.toml` loader for the command-line uploader.

use std::fs;
use std::path::{Path, PathBuf};
use anyhow::Context;
use serde::Deserialize;
use crate::core::{ThumbnailConfig, UploadConfig};
use crate::validation::ValidationPolicy;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub endpoint: String,
    #[serde(default)]
    pub token: Option<String>,
    pub file_path: PathBuf,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub thumbnail: ThumbnailConfig,
    #[serde(default)]
    pub validation: ValidationPolicy,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Config> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&config_str).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn parse(config_str: &str) -> anyhow::Result<Config> {
        let config: Config = toml::from_str(config_str)?;
        config.upload.validate()?;
        config.thumbnail.validate()?;
        Ok(config)
    }
}

use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;
use crate::{datasets, iedb, vdjdb};

pub const DEFAULT_CONFIG_FILE: &str = "kira-airr.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub data_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub vdjdb: Option<VdjdbSection>,
    #[serde(default)]
    pub iedb: Option<IedbSection>,
    #[serde(default)]
    pub datasets: Option<DatasetsSection>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VdjdbSection {
    #[serde(default)]
    pub latest_version_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IedbSection {
    #[serde(default)]
    pub export_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatasetsSection {
    #[serde(default)]
    pub article_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub data_dir: Option<Utf8PathBuf>,
    pub vdjdb_latest_version_url: String,
    pub iedb_export_url: String,
    pub datasets_article_url: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(KiraError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        Ok(ResolvedConfig {
            schema_version,
            data_dir: config.data_dir,
            vdjdb_latest_version_url: config
                .vdjdb
                .and_then(|section| section.latest_version_url)
                .unwrap_or_else(|| vdjdb::DEFAULT_LATEST_VERSION_URL.to_string()),
            iedb_export_url: config
                .iedb
                .and_then(|section| section.export_url)
                .unwrap_or_else(|| iedb::DEFAULT_EXPORT_URL.to_string()),
            datasets_article_url: config
                .datasets
                .and_then(|section| section.article_url)
                .unwrap_or_else(|| datasets::FIGSHARE_ARTICLE_URL.to_string()),
        })
    }
}

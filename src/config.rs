//! Layered configuration.
//!
//! Precedence, lowest first: built-in defaults, a TOML file, `AIP_PACKAGER_*`
//! environment variables, command-line overrides.

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::{AccountId, PackagerOptions};

pub const DEFAULT_CONFIG_FILE: &str = "aip-packager.toml";
pub const ENV_PREFIX: &str = "AIP_PACKAGER_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub charset: String,
    pub move_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_template: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_list_template: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_log: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rdf_source: Option<PathBuf>,
    pub json_logs: bool,
    pub verbose: bool,
    pub silent: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            charset: "utf-8".to_string(),
            move_data: true,
            manifest_template: None,
            manifest_list_template: None,
            events_log: None,
            rdf_source: None,
            json_logs: false,
            verbose: false,
            silent: false,
        }
    }
}

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub move_data: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_template: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_list_template: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_log: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rdf_source: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_logs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silent: Option<bool>,
}

impl AppConfig {
    /// Load the configuration. An explicit `config_file` must exist; the
    /// default file is used only if present.
    pub fn new(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let figment = Self::figment(config_file)?
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides));

        figment.extract().context("Failed to load configuration")
    }

    /// Defaults plus the TOML layer, without environment or overrides.
    pub fn figment(config_file: Option<&Path>) -> Result<Figment> {
        let figment = Figment::from(Serialized::defaults(AppConfig::default()));

        let figment = match config_file {
            Some(path) => {
                if !path.is_file() {
                    bail!("Config file not found: {}", path.display());
                }
                figment.merge(Toml::file(path))
            }
            None => figment.merge(Toml::file(DEFAULT_CONFIG_FILE)),
        };

        Ok(figment)
    }

    pub fn to_options(
        &self,
        account_id: AccountId,
        source_dir: impl Into<PathBuf>,
        destination_dir: impl Into<PathBuf>,
    ) -> PackagerOptions {
        PackagerOptions {
            manifest_template: self.manifest_template.clone(),
            manifest_list_template: self.manifest_list_template.clone(),
            events_log: self.events_log.clone(),
            rdf_source: self.rdf_source.clone(),
            charset: self.charset.clone(),
            ..PackagerOptions::new(account_id, source_dir, destination_dir)
        }
    }
}

// file: src/config.rs
// description: application configuration management with toml support
// reference: https://docs.rs/config

use crate::error::{Result, ToolkitError};
use crate::http::{AuthType, HttpClientOptions};
use crate::utils::Validator;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Config {
    pub http: HttpConfig,
    #[serde(default)]
    pub modal: ModalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HttpConfig {
    pub base_url: String,
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub include_download_progress: bool,
}

impl HttpConfig {
    pub fn client_options(&self) -> HttpClientOptions {
        HttpClientOptions {
            base_url: self.base_url.clone(),
            auth_type: self.auth_type,
            headers: self.headers.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ModalConfig {
    pub max_modals: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    pub colored: bool,
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            colored: true,
            verbose: false,
        }
    }
}

impl Config {
    /// Reads `path` (or `config/default.toml`), then applies `REACTIK__*`
    /// environment overrides such as `REACTIK__HTTP__BASE_URL`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            Validator::validate_config_file(path)?;
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder.add_source(
                config::File::from(Path::new("config/default.toml")).required(false),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix("REACTIK")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| ToolkitError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| ToolkitError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            http: HttpConfig {
                base_url: "http://localhost:8080".to_string(),
                auth_type: AuthType::Bearer,
                headers: BTreeMap::from([("accept".to_string(), "application/json".to_string())]),
                timeout_secs: Some(30),
                include_download_progress: false,
            },
            modal: ModalConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        Validator::validate_url(&self.http.base_url)?;

        for (name, value) in &self.http.headers {
            Validator::validate_header_name(name)?;
            Validator::validate_header_value(name, value)?;
        }

        if let Some(secs) = self.http.timeout_secs {
            Validator::validate_timeout(secs)?;
        }

        if self.modal.max_modals == Some(0) {
            return Err(ToolkitError::Config(
                "max_modals must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}

//! Configuration management for checknotify
//!
//! Settings are layered with `figment`: built-in defaults, then a TOML file,
//! then `CHECKNOTIFY_` environment variables (nested keys separated by `__`,
//! e.g. `CHECKNOTIFY_DISPATCH__DEADLINE_SECONDS`), then command-line flags.

use crate::cli::Cli;
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Read when no `--config` is given and the file exists.
pub const DEFAULT_CONFIG_FILE: &str = "checknotify.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Base URL of the web application, used for links in every channel.
    pub public_host: String,
    pub database: DatabaseConfig,
    pub chat: ChatConfig,
    pub email: EmailConfig,
    pub results: ResultsConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

/// Chat platform API settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChatConfig {
    pub api_url: String,
    /// OAuth application credentials, only needed to connect a customer.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Mail provider settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmailConfig {
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ResultsConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Upper bound for one whole dispatch cycle.
    pub deadline_seconds: u64,
    /// Timeout of each outbound HTTP request.
    pub request_timeout_seconds: u64,
}

impl DispatchConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Config {
    /// Loads the configuration from all sources, the command line last.
    pub fn load_from_cli(cli: Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        match &cli.config {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found at specified path: {}", path.display());
                }
                figment = figment.merge(Toml::file(path));
            }
            None => figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE)),
        }

        let config: Config = figment
            .merge(Env::prefixed("CHECKNOTIFY_").split("__"))
            .merge(cli)
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would only fail later, at send time.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("public_host", &self.public_host),
            ("chat.api_url", &self.chat.api_url),
            ("email.api_url", &self.email.api_url),
            ("results.url", &self.results.url),
        ] {
            let url = url::Url::parse(value)
                .map_err(|e| anyhow::anyhow!("{} is not a valid URL ({}): {}", name, value, e))?;
            if !matches!(url.scheme(), "http" | "https") {
                bail!("{} must be an http(s) URL, got {}", name, value);
            }
        }
        if self.dispatch.deadline_seconds == 0 {
            bail!("dispatch.deadline_seconds must be greater than zero");
        }
        if self.dispatch.request_timeout_seconds == 0 {
            bail!("dispatch.request_timeout_seconds must be greater than zero");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            public_host: "http://localhost:8080".to_string(),
            database: DatabaseConfig {
                path: PathBuf::from("checknotify.db"),
            },
            chat: ChatConfig {
                api_url: "https://slack.com".to_string(),
                client_id: None,
                client_secret: None,
            },
            email: EmailConfig {
                api_url: "https://mandrillapp.com/api/1.0".to_string(),
                api_key: String::new(),
            },
            results: ResultsConfig {
                url: "http://localhost:9101".to_string(),
            },
            dispatch: DispatchConfig {
                deadline_seconds: 300,
                request_timeout_seconds: 30,
            },
        }
    }
}

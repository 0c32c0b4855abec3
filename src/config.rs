//! Environment configuration

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} is invalid: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Bot settings, read once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub token: String,
    pub host: IpAddr,
    pub port: u16,
    /// Public base URL the chat service posts updates to
    pub webhook_host: String,
    pub work_dir: PathBuf,
    pub style_dir: PathBuf,
    /// Command lines of the external transforms
    pub stylization_cmd: String,
    pub painting_cmd: String,
    pub max_jobs: usize,
    pub api_url: String,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let required = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));

        let max_jobs = parsed(get("NEURAL_PAINTER_MAX_JOBS"), "NEURAL_PAINTER_MAX_JOBS", 2)?;
        if max_jobs == 0 {
            return Err(ConfigError::Invalid {
                var: "NEURAL_PAINTER_MAX_JOBS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            token: required("BOT_TOKEN")?,
            host: parsed(get("WEBAPP_HOST"), "WEBAPP_HOST", IpAddr::from([0, 0, 0, 0]))?,
            port: parsed(get("PORT"), "PORT", 8000)?,
            webhook_host: required("WEBHOOK_HOST")?
                .trim_end_matches('/')
                .to_string(),
            work_dir: get("NEURAL_PAINTER_WORK_DIR").map_or_else(|| PathBuf::from("."), PathBuf::from),
            style_dir: get("NEURAL_PAINTER_STYLE_DIR")
                .map_or_else(|| PathBuf::from("stylization_mode/style_images"), PathBuf::from),
            stylization_cmd: get("NEURAL_PAINTER_FNST_CMD").unwrap_or_else(|| "fnst".to_string()),
            painting_cmd: get("NEURAL_PAINTER_GNST_CMD").unwrap_or_else(|| "gnst".to_string()),
            max_jobs,
            api_url: get("TELEGRAM_API_URL")
                .unwrap_or_else(|| "https://api.telegram.org".to_string()),
        })
    }

    /// Route the webhook is served on; the token keeps it unguessable
    pub fn webhook_path(&self) -> String {
        format!("/webhook/{}", self.token)
    }

    pub fn webhook_url(&self) -> String {
        format!("{}{}", self.webhook_host, self.webhook_path())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parsed<T: std::str::FromStr>(
    value: Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(ConfigError::Invalid { var, value }),
        },
    }
}

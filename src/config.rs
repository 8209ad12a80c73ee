use crate::error::ConfigError;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

const DEFAULT_ENDPOINT: &str = "https://file.googleapis.com/v1";
const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub filestore: FilestoreSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilestoreSettings {
    pub endpoint: String,
    pub request_timeout_secs: u64,
    pub access_token: Option<String>,
    pub metadata_token_url: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let env = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Self::defaults()?
            .add_source(File::new("config/default", FileFormat::Toml).required(false))
            .add_source(File::new(&format!("config/{}", env), FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("SCHEDULER").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("filestore.endpoint", DEFAULT_ENDPOINT)?
            .set_default("filestore.request_timeout_secs", 60)?
            .set_default("filestore.metadata_token_url", DEFAULT_METADATA_TOKEN_URL)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.filestore.endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "filestore.endpoint must not be empty".to_string(),
            ));
        }
        if self.filestore.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "filestore.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

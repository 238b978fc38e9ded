use crate::error::{ConfigError, Result as AppResult};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    pub open_trivia_url: String,
    pub quiz_api_url: String,
    /// Secret key for the commercial quiz API. When absent, that provider is
    /// skipped and the relay refuses to forward.
    pub quiz_api_key: Option<String>,
    /// Opaque category id the quick-start flow passes to the primary
    /// provider. No category mapping table is maintained here.
    pub quickstart_category: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PoolSourceType {
    Bundled,
    File,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub source_type: PoolSourceType,
    pub file_path: Option<String>,
    pub http_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Countdown budget per question, in seconds.
    pub question_seconds: u64,
    /// Delay between answer reveal and advancing to the next question.
    pub advance_delay_ms: u64,
    /// Upper bound applied to remote batch requests.
    pub max_remote_amount: u8,
    /// Grace period after which finished sessions are collected if the
    /// player never claims the result.
    pub finished_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    pub server: ServerConfig,
    pub providers: ProvidersConfig,
    pub pool: PoolConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
}

pub fn load_settings() -> AppResult<AppSettings> {
    let builder = Config::builder()
        .set_default("server.port", 8080_i64)
        .and_then(|b| b.set_default("server.cors_origins", Vec::<String>::new()))
        .and_then(|b| b.set_default("providers.open_trivia_url", "https://opentdb.com"))
        .and_then(|b| b.set_default("providers.quiz_api_url", "https://quizapi.io"))
        .and_then(|b| b.set_default("providers.quickstart_category", "18"))
        .and_then(|b| b.set_default("providers.request_timeout_secs", 10_i64))
        .and_then(|b| b.set_default("pool.source_type", "bundled"))
        .and_then(|b| b.set_default("session.question_seconds", 20_i64))
        .and_then(|b| b.set_default("session.advance_delay_ms", 1400_i64))
        .and_then(|b| b.set_default("session.max_remote_amount", 30_i64))
        .and_then(|b| b.set_default("session.finished_ttl_secs", 300_i64))
        .and_then(|b| b.set_default("storage.data_dir", "data"))
        .map_err(|e| ConfigError::Load(e.to_string()))?
        .add_source(
            Environment::with_prefix("QUIZDECK")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.cors_origins")
                .try_parsing(true),
        )
        .add_source(File::with_name("config").required(false));

    let settings = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let settings: AppSettings = settings
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_settings(&settings)?;
    Ok(settings)
}

fn validate_settings(settings: &AppSettings) -> Result<(), ConfigError> {
    match settings.pool.source_type {
        PoolSourceType::File if settings.pool.file_path.is_none() => Err(
            ConfigError::InvalidValue("pool.file_path required for file source".to_string()),
        ),
        PoolSourceType::Http if settings.pool.http_url.is_none() => Err(
            ConfigError::InvalidValue("pool.http_url required for http source".to_string()),
        ),
        _ if settings.session.question_seconds == 0 => Err(ConfigError::InvalidValue(
            "session.question_seconds must be at least 1".to_string(),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_valid_settings() {
        let settings = load_settings().expect("default settings should load");
        assert_eq!(settings.session.question_seconds, 20);
        assert_eq!(settings.session.advance_delay_ms, 1400);
        assert_eq!(settings.session.finished_ttl_secs, 300);
        assert_eq!(settings.pool.source_type, PoolSourceType::Bundled);
        assert!(settings.providers.quiz_api_key.is_none());
    }
}

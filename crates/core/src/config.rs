use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use crate::booking::BusinessHours;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub vector: VectorConfig,
    pub orchestrator: OrchestratorConfig,
    pub booking: BookingConfig,
    pub chunker: ChunkerConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub api_key: Option<SecretString>,
    pub endpoint: Option<String>,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct VectorConfig {
    pub qdrant_url: String,
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub history_limit: i64,
    pub max_rounds: u32,
    pub turn_budget_secs: u64,
    pub segment_limit: usize,
}

#[derive(Clone, Debug)]
pub struct BookingConfig {
    pub open_minute: u16,
    pub close_minute: u16,
    pub slot_step_minutes: u16,
    pub suggestion_horizon_days: u16,
    pub max_suggestions: usize,
}

impl BookingConfig {
    pub fn business_hours(&self) -> BusinessHours {
        BusinessHours {
            open_minute: self.open_minute,
            close_minute: self.close_minute,
            slot_step_minutes: self.slot_step_minutes,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChunkerConfig {
    pub chunk_size_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub sentence_search_radius_tokens: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Groq,
    Azure,
    OpenAi,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::Azure => "azure",
            Self::OpenAi => "openai",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub embedding_api_key: Option<String>,
    pub embedding_endpoint: Option<String>,
    pub qdrant_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://concierge.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Groq,
                api_key: None,
                base_url: None,
                model: "llama-3.3-70b-versatile".to_string(),
                timeout_secs: 20,
                max_retries: 2,
            },
            embedding: EmbeddingConfig {
                api_key: None,
                endpoint: None,
                model: "text-embedding-3-small".to_string(),
                dimension: 768,
                batch_size: 16,
                timeout_secs: 10,
                max_retries: 2,
            },
            vector: VectorConfig { qdrant_url: "http://localhost:6334".to_string() },
            orchestrator: OrchestratorConfig {
                history_limit: 10,
                max_rounds: 5,
                turn_budget_secs: 60,
                segment_limit: 1000,
            },
            booking: BookingConfig {
                open_minute: 540,
                close_minute: 1080,
                slot_step_minutes: 30,
                suggestion_horizon_days: 7,
                max_suggestions: 5,
            },
            chunker: ChunkerConfig {
                chunk_size_tokens: 400,
                chunk_overlap_tokens: 50,
                sentence_search_radius_tokens: 100,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "azure" => Ok(Self::Azure),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected groq|azure|openai)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("concierge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            apply(&mut self.database.url, database.url);
            apply(&mut self.database.max_connections, database.max_connections);
            apply(&mut self.database.timeout_secs, database.timeout_secs);
        }

        if let Some(llm) = patch.llm {
            apply(&mut self.llm.provider, llm.provider);
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(api_key.into());
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            apply(&mut self.llm.model, llm.model);
            apply(&mut self.llm.timeout_secs, llm.timeout_secs);
            apply(&mut self.llm.max_retries, llm.max_retries);
        }

        if let Some(embedding) = patch.embedding {
            if let Some(api_key) = embedding.api_key {
                self.embedding.api_key = Some(api_key.into());
            }
            if let Some(endpoint) = embedding.endpoint {
                self.embedding.endpoint = Some(endpoint);
            }
            apply(&mut self.embedding.model, embedding.model);
            apply(&mut self.embedding.dimension, embedding.dimension);
            apply(&mut self.embedding.batch_size, embedding.batch_size);
            apply(&mut self.embedding.timeout_secs, embedding.timeout_secs);
            apply(&mut self.embedding.max_retries, embedding.max_retries);
        }

        if let Some(vector) = patch.vector {
            apply(&mut self.vector.qdrant_url, vector.qdrant_url);
        }

        if let Some(orchestrator) = patch.orchestrator {
            apply(&mut self.orchestrator.history_limit, orchestrator.history_limit);
            apply(&mut self.orchestrator.max_rounds, orchestrator.max_rounds);
            apply(&mut self.orchestrator.turn_budget_secs, orchestrator.turn_budget_secs);
            apply(&mut self.orchestrator.segment_limit, orchestrator.segment_limit);
        }

        if let Some(booking) = patch.booking {
            apply(&mut self.booking.open_minute, booking.open_minute);
            apply(&mut self.booking.close_minute, booking.close_minute);
            apply(&mut self.booking.slot_step_minutes, booking.slot_step_minutes);
            apply(&mut self.booking.suggestion_horizon_days, booking.suggestion_horizon_days);
            apply(&mut self.booking.max_suggestions, booking.max_suggestions);
        }

        if let Some(chunker) = patch.chunker {
            apply(&mut self.chunker.chunk_size_tokens, chunker.chunk_size_tokens);
            apply(&mut self.chunker.chunk_overlap_tokens, chunker.chunk_overlap_tokens);
            apply(
                &mut self.chunker.sentence_search_radius_tokens,
                chunker.sentence_search_radius_tokens,
            );
        }

        if let Some(server) = patch.server {
            apply(&mut self.server.bind_address, server.bind_address);
            apply(&mut self.server.port, server.port);
            apply(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }

        if let Some(logging) = patch.logging {
            apply(&mut self.logging.level, logging.level);
            apply(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CONCIERGE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CONCIERGE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("CONCIERGE_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = read_env("CONCIERGE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("CONCIERGE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CONCIERGE_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(value.into());
        }
        if let Some(value) = read_env("CONCIERGE_EMBEDDING_ENDPOINT") {
            self.embedding.endpoint = Some(value);
        }
        if let Some(value) = read_env("CONCIERGE_EMBEDDING_DIMENSION") {
            self.embedding.dimension = parse_number("CONCIERGE_EMBEDDING_DIMENSION", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_QDRANT_URL") {
            self.vector.qdrant_url = value;
        }
        if let Some(value) = read_env("CONCIERGE_SERVER_PORT") {
            self.server.port = parse_number("CONCIERGE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("CONCIERGE_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.database_url {
            self.database.url = url;
        }
        if let Some(provider) = overrides.llm_provider {
            self.llm.provider = provider;
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(api_key.into());
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(api_key) = overrides.embedding_api_key {
            self.embedding.api_key = Some(api_key.into());
        }
        if let Some(endpoint) = overrides.embedding_endpoint {
            self.embedding.endpoint = Some(endpoint);
        }
        if let Some(url) = overrides.qdrant_url {
            self.vector.qdrant_url = url;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.orchestrator.max_rounds == 0 {
            return Err(ConfigError::Validation(
                "orchestrator.max_rounds must be at least 1".to_string(),
            ));
        }
        if self.orchestrator.segment_limit == 0 {
            return Err(ConfigError::Validation(
                "orchestrator.segment_limit must be at least 1".to_string(),
            ));
        }
        if self.booking.open_minute >= self.booking.close_minute {
            return Err(ConfigError::Validation(
                "booking.open_minute must be before booking.close_minute".to_string(),
            ));
        }
        if self.booking.slot_step_minutes == 0 {
            return Err(ConfigError::Validation(
                "booking.slot_step_minutes must be at least 1".to_string(),
            ));
        }
        if self.chunker.chunk_overlap_tokens >= self.chunker.chunk_size_tokens {
            return Err(ConfigError::Validation(
                "chunker.chunk_overlap_tokens must be smaller than chunk_size_tokens".to_string(),
            ));
        }
        if self.embedding.dimension == 0 || self.embedding.batch_size == 0 {
            return Err(ConfigError::Validation(
                "embedding.dimension and embedding.batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn apply<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    let default = PathBuf::from("concierge.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    embedding: Option<EmbeddingPatch>,
    vector: Option<VectorPatch>,
    orchestrator: Option<OrchestratorPatch>,
    booking: Option<BookingPatch>,
    chunker: Option<ChunkerPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingPatch {
    api_key: Option<String>,
    endpoint: Option<String>,
    model: Option<String>,
    dimension: Option<usize>,
    batch_size: Option<usize>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct VectorPatch {
    qdrant_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrchestratorPatch {
    history_limit: Option<i64>,
    max_rounds: Option<u32>,
    turn_budget_secs: Option<u64>,
    segment_limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct BookingPatch {
    open_minute: Option<u16>,
    close_minute: Option<u16>,
    slot_step_minutes: Option<u16>,
    suggestion_horizon_days: Option<u16>,
    max_suggestions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ChunkerPatch {
    chunk_size_tokens: Option<usize>,
    chunk_overlap_tokens: Option<usize>,
    sentence_search_radius_tokens: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::app::submission_use_case::FinalizeVerification;
use crate::constants::{
    DEFAULT_BUCKET, DEFAULT_CONFIG_PATH, DEFAULT_CORS_ORIGIN, DEFAULT_DATABASE_PATH,
    DEFAULT_LOCAL_STORAGE_ROOT, DEFAULT_PORT, DEFAULT_QUEUE_FILE, DEFAULT_SESSION_URL,
    DEFAULT_UPLOAD_TTL_SECS, DEFAULT_WEBHOOK_TOLERANCE_SECS, MAX_UPLOAD_TTL_SECS,
};
use crate::error::{QuickpitchError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app_env: AppEnv,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub aws: AwsConfig,
    pub webhook: WebhookConfig,
    pub auth: AuthConfig,
    pub finalize: FinalizeConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    #[default]
    Development,
    Production,
    Test,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// Base URL clients use to reach this service; local upload URLs point here.
    pub public_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            cors_origins: vec![DEFAULT_CORS_ORIGIN.to_string()],
            public_base_url: None,
        }
    }
}

impl ServerConfig {
    pub fn public_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// fatal | error | warn | info | debug | trace
    pub level: String,
    /// Directory for daily-rotated JSON logs. Console only when unset.
    pub file_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_dir: None,
        }
    }
}

impl LoggingConfig {
    /// The `tracing` level name for the configured level.
    pub fn tracing_level(&self) -> Result<&'static str> {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "fatal" | "error" => Ok("error"),
            "warn" => Ok("warn"),
            "info" => Ok("info"),
            "debug" => Ok("debug"),
            "trace" => Ok("trace"),
            other => Err(QuickpitchError::Config(format!("unknown log level '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// A SQLite path, `sqlite://path`, `file:path`, or `:memory:`.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_PATH.to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn location(&self) -> DatabaseLocation {
        let url = self.url.trim();
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .or_else(|| url.strip_prefix("file:"))
            .unwrap_or(url);
        if path == ":memory:" || path == "memory" {
            DatabaseLocation::Memory
        } else {
            DatabaseLocation::File(path.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    #[default]
    Local,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: String,
    pub upload_ttl_secs: u64,
    /// Custom S3-compatible endpoint; path-style addressing when set.
    pub endpoint: Option<String>,
    pub local_root: String,
    /// HMAC key for local upload URLs. Falls back to the webhook secret.
    pub local_signing_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            bucket: DEFAULT_BUCKET.to_string(),
            upload_ttl_secs: DEFAULT_UPLOAD_TTL_SECS,
            endpoint: None,
            local_root: DEFAULT_LOCAL_STORAGE_ROOT.to_string(),
            local_signing_key: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    Sqs,
    #[default]
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    /// SQS queue URL, or the queue name recorded in file-queue lines.
    pub url: String,
    pub file_path: String,
    pub timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            url: "resumeQ".to_string(),
            file_path: DEFAULT_QUEUE_FILE.to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsConfig")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub secret: Option<String>,
    pub tolerance_secs: i64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
        }
    }
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_url: String,
    pub timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_url: DEFAULT_SESSION_URL.to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct FinalizeConfig {
    pub verification: FinalizeVerification,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// e.g. `127.0.0.1:9898`. No exporter when unset.
    pub listen: Option<String>,
}

impl Config {
    /// Loads `.env`, the TOML file and environment overrides, then validates.
    ///
    /// An explicitly given `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        load_dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            QuickpitchError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        debug!("Loaded config file {}", path.display());
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Applies environment-style overrides. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("APP_ENV") {
            match v.to_ascii_lowercase().as_str() {
                "production" => self.app_env = AppEnv::Production,
                "test" => self.app_env = AppEnv::Test,
                _ => self.app_env = AppEnv::Development,
            }
        }
        if let Some(port) = get("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(v) = get("CORS_ORIGINS") {
            self.server.cors_origins = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Some(v) = get("PUBLIC_BASE_URL") {
            self.server.public_base_url = Some(v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = get("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = get("STORAGE_BACKEND") {
            self.storage.backend = match v.to_ascii_lowercase().as_str() {
                "s3" => StorageBackend::S3,
                _ => StorageBackend::Local,
            };
        }
        if let Some(v) = get("STORAGE_BUCKET") {
            self.storage.bucket = v;
        }
        if let Some(v) = get("S3_ENDPOINT") {
            self.storage.endpoint = Some(v);
        }
        if let Some(v) = get("AWS_REGION") {
            self.aws.region = v;
        }
        if let Some(v) = get("AWS_ACCESS_KEY_ID") {
            self.aws.access_key_id = Some(v);
        }
        if let Some(v) = get("AWS_SECRET_ACCESS_KEY") {
            self.aws.secret_access_key = Some(v);
        }
        if let Some(v) = get("AWS_SESSION_TOKEN") {
            self.aws.session_token = Some(v);
        }
        if let Some(v) = get("QUEUE_BACKEND") {
            self.queue.backend = match v.to_ascii_lowercase().as_str() {
                "sqs" => QueueBackend::Sqs,
                _ => QueueBackend::File,
            };
        }
        if let Some(v) = get("QUEUE_URL") {
            self.queue.url = v;
        }
        if let Some(v) = get("WEBHOOK_SECRET") {
            self.webhook.secret = Some(v);
        }
        if let Some(v) = get("AUTH_SESSION_URL") {
            self.auth.session_url = v;
        }
        if let Some(v) = get("METRICS_LISTEN") {
            self.metrics.listen = Some(v);
        }
    }

    /// Required by `serve` and `sign-webhook`; schema migration runs without it.
    pub fn webhook_secret(&self) -> Result<&str> {
        self.webhook
            .secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| QuickpitchError::Config("WEBHOOK_SECRET is required".to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.logging.tracing_level()?;

        if self.storage.bucket.trim().is_empty() {
            return Err(QuickpitchError::Config("storage.bucket must not be empty".to_string()));
        }
        if self.storage.upload_ttl_secs == 0 || self.storage.upload_ttl_secs > MAX_UPLOAD_TTL_SECS {
            return Err(QuickpitchError::Config(format!(
                "storage.upload_ttl_secs must be between 1 and {MAX_UPLOAD_TTL_SECS}"
            )));
        }
        if self.webhook.tolerance_secs <= 0 {
            return Err(QuickpitchError::Config("webhook.tolerance_secs must be positive".to_string()));
        }
        if self.queue.url.trim().is_empty() {
            return Err(QuickpitchError::Config("QUEUE_URL must not be empty".to_string()));
        }

        let needs_aws = self.storage.backend == StorageBackend::S3 || self.queue.backend == QueueBackend::Sqs;
        if needs_aws {
            if self.aws.region.trim().is_empty() {
                return Err(QuickpitchError::Config("AWS_REGION is required for S3/SQS backends".to_string()));
            }
            if self.aws.access_key_id.is_none() || self.aws.secret_access_key.is_none() {
                return Err(QuickpitchError::Config(
                    "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY are required for S3/SQS backends".to_string(),
                ));
            }
        }
        if self.queue.backend == QueueBackend::Sqs && !self.queue.url.starts_with("http") {
            return Err(QuickpitchError::Config(format!(
                "QUEUE_URL must be an SQS queue URL, got '{}'",
                self.queue.url
            )));
        }
        Ok(())
    }
}

fn load_dotenv() {
    let is_test = std::env::var("APP_ENV").map_or(false, |v| v.eq_ignore_ascii_case("test"));
    let loaded = if is_test {
        dotenv::from_filename(".env.test")
    } else {
        dotenv::dotenv()
    };
    if let Ok(path) = loaded {
        debug!("Loaded environment from {}", path.display());
    }
}

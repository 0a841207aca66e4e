//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables
//! 2. `vox.toml` (or the file given by `--config` / `VOX_CONFIG`)
//! 3. Defaults
//!
//! `${VAR_NAME}` inside the config file is replaced with the environment value.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pipeline::ValidationLimits;
use crate::provider::ProviderKind;
use crate::quota::{Dimension, PlanTable, PlanTier};
use crate::{Error, Result};

const DEFAULT_CONFIG_FILE: &str = "vox.toml";

/// Main configuration for vox-server
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub providers: ProvidersConfig,
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
    /// Plan limit table, defaults overlaid with `[plans.<tier>]`
    pub plans: PlanTable,
    pub validation: ValidationLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Shared secret expected from the upstream proxy
    pub api_key: Option<String>,
    /// Allowed CORS origins; localhost only when unset
    pub allowed_origins: Option<Vec<String>>,
    /// Generation requests per user per minute
    pub rate_limit_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            api_key: None,
            allowed_origins: None,
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Credentials and endpoint for one provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Minimax account group
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Used when a request does not name a provider
    pub primary: ProviderKind,
    pub timeout_secs: u64,
    pub elevenlabs: Option<ProviderCredentials>,
    pub minimax: Option<ProviderCredentials>,
    pub noiz: Option<ProviderCredentials>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            primary: ProviderKind::ElevenLabs,
            timeout_secs: default_timeout_secs(),
            elevenlabs: None,
            minimax: None,
            noiz: None,
        }
    }
}

impl ProvidersConfig {
    pub fn credentials(&self, kind: ProviderKind) -> Option<&ProviderCredentials> {
        let creds = match kind {
            ProviderKind::ElevenLabs => self.elevenlabs.as_ref(),
            ProviderKind::Minimax => self.minimax.as_ref(),
            ProviderKind::Noiz => self.noiz.as_ref(),
        };
        creds.filter(|c| !c.api_key.is_empty())
    }

    fn credentials_mut(&mut self, kind: ProviderKind) -> &mut ProviderCredentials {
        let slot = match kind {
            ProviderKind::ElevenLabs => &mut self.elevenlabs,
            ProviderKind::Minimax => &mut self.minimax,
            ProviderKind::Noiz => &mut self.noiz,
        };
        slot.get_or_insert_with(ProviderCredentials::default)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    B2,
    Memory,
}

/// Backblaze B2 credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct B2Config {
    pub key_id: String,
    pub application_key: String,
    pub bucket_id: String,
    pub bucket_name: String,
    /// Authorization endpoint override
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub b2: Option<B2Config>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub enabled: bool,
    /// Capture endpoint host, e.g. `https://us.i.posthog.com`
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// JSON-lines event log
    pub log_file: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            api_key: None,
            log_file: None,
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_rate_limit() -> u32 {
    30
}

fn default_db_path() -> String {
    "data/vox.db".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Config {
    /// Replace `${VAR_NAME}` with values from `lookup`. Unknown variables become empty.
    fn expand_vars(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                while let Some(c) = chars.next() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Some(env_value) = lookup(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&toml_content, |name| std::env::var(name).ok())?;
        cfg.apply_env_overrides();
        cfg.validate()?;

        debug!("Loaded configuration from {}", path.display());
        Ok(cfg)
    }

    /// Load from `path`, `VOX_CONFIG`, or `./vox.toml`, falling back to the environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_toml_file(path);
        }
        if let Ok(path) = std::env::var("VOX_CONFIG") {
            if !path.is_empty() {
                return Self::from_toml_file(path);
            }
        }
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_toml_str(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let expanded = Self::expand_vars(content, lookup);
        let toml: TomlConfig = toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        Self::from_toml_config(toml)
    }

    fn from_toml_config(toml: TomlConfig) -> Result<Self> {
        let server = toml.server.unwrap_or_default();
        let server = ServerConfig {
            port: server.port.unwrap_or_else(default_port),
            api_key: server.api_key.filter(|k| !k.is_empty()),
            allowed_origins: server.allowed_origins,
            rate_limit_per_minute: server.rate_limit_per_minute.unwrap_or_else(default_rate_limit),
        };

        let database = DatabaseConfig {
            path: toml
                .database
                .unwrap_or_default()
                .path
                .unwrap_or_else(default_db_path),
        };

        let providers = toml.providers.unwrap_or_default();
        let providers = ProvidersConfig {
            primary: match providers.primary {
                Some(p) => p.parse()?,
                None => ProviderKind::ElevenLabs,
            },
            timeout_secs: providers.timeout_secs.unwrap_or_else(default_timeout_secs),
            elevenlabs: providers.elevenlabs.map(TomlProviderConfig::into_credentials),
            minimax: providers.minimax.map(TomlProviderConfig::into_credentials),
            noiz: providers.noiz.map(TomlProviderConfig::into_credentials),
        };

        let storage = toml.storage.unwrap_or_default();
        let storage = StorageConfig {
            backend: match storage.backend.as_deref() {
                Some(b) => parse_backend(b)?,
                None => StorageBackend::default(),
            },
            b2: storage.b2,
        };

        let telemetry = toml.telemetry.unwrap_or_default();
        let telemetry = TelemetryConfig {
            enabled: telemetry.enabled.unwrap_or(true),
            endpoint: telemetry.endpoint.filter(|e| !e.is_empty()),
            api_key: telemetry.api_key.filter(|k| !k.is_empty()),
            log_file: telemetry.log_file,
        };

        let mut plans = PlanTable::default();
        for (tier, limits) in toml.plans.unwrap_or_default() {
            let tier: PlanTier = tier.parse()?;
            for (dimension, limit) in limits {
                let dimension: Dimension = dimension.parse()?;
                if !limit.is_finite() || limit < 0.0 {
                    return Err(Error::Config(format!(
                        "plans.{}.{} must be a non-negative number",
                        tier, dimension
                    )));
                }
                plans.set(tier, dimension, limit);
            }
        }

        Ok(Config {
            server,
            database,
            providers,
            storage,
            telemetry,
            plans,
            validation: toml.validation.unwrap_or_default(),
        })
    }

    /// Environment variables take precedence over the file
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));
    }

    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // Server
        if let Some(port) = env("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(key) = env("API_KEY") {
            self.server.api_key = Some(key);
        }
        if let Some(origins) = env("API_ALLOWED_ORIGINS") {
            self.server.allowed_origins =
                Some(origins.split(',').map(|s| s.trim().to_string()).collect());
        }
        if let Some(limit) = env("RATE_LIMIT_PER_MINUTE").and_then(|v| v.parse().ok()) {
            self.server.rate_limit_per_minute = limit;
        }

        // Database
        if let Some(path) = env("DB_PATH") {
            self.database.path = path;
        }

        // Providers
        if let Some(primary) = env("PRIMARY_PROVIDER").and_then(|p| p.parse().ok()) {
            self.providers.primary = primary;
        }
        if let Some(secs) = env("PROVIDER_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.providers.timeout_secs = secs;
        }
        for (kind, key_var) in [
            (ProviderKind::ElevenLabs, "ELEVENLABS_API_KEY"),
            (ProviderKind::Minimax, "MINIMAX_API_KEY"),
            (ProviderKind::Noiz, "NOIZ_API_KEY"),
        ] {
            if let Some(key) = env(key_var) {
                self.providers.credentials_mut(kind).api_key = key;
            }
        }
        if let Some(group) = env("MINIMAX_GROUP_ID") {
            self.providers.credentials_mut(ProviderKind::Minimax).group_id = Some(group);
        }

        // Storage
        if let Some(backend) = env("STORAGE_BACKEND").and_then(|b| parse_backend(&b).ok()) {
            self.storage.backend = backend;
        }
        let b2_vars = [
            env("B2_KEY_ID"),
            env("B2_APPLICATION_KEY"),
            env("B2_BUCKET_ID"),
            env("B2_BUCKET_NAME"),
        ];
        if b2_vars.iter().any(Option::is_some) {
            let [key_id, application_key, bucket_id, bucket_name] = b2_vars;
            let b2 = self.storage.b2.get_or_insert_with(B2Config::default);
            if let Some(v) = key_id {
                b2.key_id = v;
            }
            if let Some(v) = application_key {
                b2.application_key = v;
            }
            if let Some(v) = bucket_id {
                b2.bucket_id = v;
            }
            if let Some(v) = bucket_name {
                b2.bucket_name = v;
            }
        }

        // Telemetry
        if let Some(enabled) = env("TELEMETRY_ENABLED") {
            self.telemetry.enabled = enabled.to_lowercase() != "false";
        }
        if let Some(key) = env("POSTHOG_API_KEY") {
            self.telemetry.api_key = Some(key);
        }
        if let Some(host) = env("POSTHOG_HOST") {
            self.telemetry.endpoint = Some(host);
        }
        if let Some(path) = env("TELEMETRY_LOG_FILE") {
            self.telemetry.log_file = Some(path);
        }
    }

    /// Reject settings the server cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.storage.backend == StorageBackend::B2 {
            let complete = self.storage.b2.as_ref().is_some_and(|b2| {
                !b2.key_id.is_empty()
                    && !b2.application_key.is_empty()
                    && !b2.bucket_id.is_empty()
                    && !b2.bucket_name.is_empty()
            });
            if !complete {
                return Err(Error::Config(
                    "storage.backend = \"b2\" requires key_id, application_key, bucket_id and bucket_name"
                        .to_string(),
                ));
            }
        }
        if self.providers.timeout_secs == 0 {
            return Err(Error::Config("providers.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_backend(value: &str) -> Result<StorageBackend> {
    match value.trim().to_lowercase().as_str() {
        "b2" | "backblaze" => Ok(StorageBackend::B2),
        "memory" => Ok(StorageBackend::Memory),
        other => Err(Error::Config(format!("unknown storage backend: {}", other))),
    }
}

// ============================================================================
// TOML file structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    server: Option<TomlServerConfig>,
    database: Option<TomlDatabaseConfig>,
    providers: Option<TomlProvidersConfig>,
    storage: Option<TomlStorageConfig>,
    telemetry: Option<TomlTelemetryConfig>,
    /// tier -> dimension -> limit
    plans: Option<HashMap<String, HashMap<String, f64>>>,
    validation: Option<ValidationLimits>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlServerConfig {
    port: Option<u16>,
    api_key: Option<String>,
    allowed_origins: Option<Vec<String>>,
    rate_limit_per_minute: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlDatabaseConfig {
    path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlProvidersConfig {
    primary: Option<String>,
    timeout_secs: Option<u64>,
    elevenlabs: Option<TomlProviderConfig>,
    minimax: Option<TomlProviderConfig>,
    noiz: Option<TomlProviderConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlProviderConfig {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    group_id: Option<String>,
}

impl TomlProviderConfig {
    fn into_credentials(self) -> ProviderCredentials {
        ProviderCredentials {
            api_key: self.api_key.unwrap_or_default(),
            base_url: self.base_url.filter(|u| !u.is_empty()),
            model: self.model.filter(|m| !m.is_empty()),
            group_id: self.group_id.filter(|g| !g.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct TomlStorageConfig {
    backend: Option<String>,
    b2: Option<B2Config>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlTelemetryConfig {
    enabled: Option<bool>,
    endpoint: Option<String>,
    api_key: Option<String>,
    log_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.rate_limit_per_minute, 30);
        assert_eq!(config.database.path, "data/vox.db");
        assert_eq!(config.providers.primary, ProviderKind::ElevenLabs);
        assert_eq!(config.providers.timeout_secs, 120);
        assert_eq!(config.storage.backend, StorageBackend::B2);
        assert!(config.telemetry.enabled);
        assert_eq!(config.plans.limit(PlanTier::Free, Dimension::Characters), 10000.0);
    }

    #[test]
    fn test_expand_vars() {
        let lookup = vars(&[("VOX_TEST_VAR", "test_value")]);
        assert_eq!(
            Config::expand_vars("prefix_${VOX_TEST_VAR}_suffix", &lookup),
            "prefix_test_value_suffix"
        );
        assert_eq!(Config::expand_vars("prefix_${MISSING}_suffix", &lookup), "prefix__suffix");
        assert_eq!(Config::expand_vars("no_vars_here", &lookup), "no_vars_here");
        assert_eq!(Config::expand_vars("${}_content", &lookup), "_content");
        assert_eq!(Config::expand_vars("cost: $5", &lookup), "cost: $5");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_content = r#"
[server]
port = 8080
api_key = "${PROXY_SECRET}"
allowed_origins = ["https://app.example.com"]

[database]
path = "/var/lib/vox/vox.db"

[providers]
primary = "minimax"
timeout_secs = 60

[providers.elevenlabs]
api_key = "${ELEVEN_KEY}"

[providers.minimax]
api_key = "mm-key"
group_id = "grp-1"
model = "speech-02-hd"

[storage]
backend = "b2"

[storage.b2]
key_id = "kid"
application_key = "appkey"
bucket_id = "bid"
bucket_name = "vox-audio"

[telemetry]
enabled = true
endpoint = "https://us.i.posthog.com"
api_key = "phc_abc"

[plans.free]
characters = 12000

[plans.pro]
cloned_voices = 20

[validation]
max_text_chars = 4000
"#;
        let lookup = vars(&[("PROXY_SECRET", "s3cret"), ("ELEVEN_KEY", "xi-123")]);
        let config = Config::from_toml_str(toml_content, lookup).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.api_key.as_deref(), Some("s3cret"));
        assert_eq!(config.database.path, "/var/lib/vox/vox.db");
        assert_eq!(config.providers.primary, ProviderKind::Minimax);
        assert_eq!(config.providers.timeout_secs, 60);
        assert_eq!(
            config.providers.credentials(ProviderKind::ElevenLabs).unwrap().api_key,
            "xi-123"
        );
        let minimax = config.providers.credentials(ProviderKind::Minimax).unwrap();
        assert_eq!(minimax.group_id.as_deref(), Some("grp-1"));
        assert!(config.providers.credentials(ProviderKind::Noiz).is_none());
        assert_eq!(config.storage.b2.as_ref().unwrap().bucket_name, "vox-audio");
        assert_eq!(config.telemetry.api_key.as_deref(), Some("phc_abc"));
        assert_eq!(config.plans.limit(PlanTier::Free, Dimension::Characters), 12000.0);
        assert_eq!(config.plans.limit(PlanTier::Free, Dimension::Generations), 10.0);
        assert_eq!(config.plans.limit(PlanTier::Pro, Dimension::ClonedVoices), 20.0);
        assert_eq!(config.validation.max_text_chars, 4000);
        assert_eq!(config.validation.max_dialogue_lines, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_plan_dimension_is_rejected() {
        let err = Config::from_toml_str("[plans.free]\ntokens = 5\n", vars(&[])).unwrap_err();
        assert!(err.to_string().contains("tokens"));

        let err = Config::from_toml_str("[plans.enterprise]\ncharacters = 5\n", vars(&[]));
        assert!(err.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(vars(&[
            ("PORT", "9090"),
            ("API_KEY", "proxy-key"),
            ("DB_PATH", "/tmp/vox.db"),
            ("PRIMARY_PROVIDER", "noiz"),
            ("NOIZ_API_KEY", "noiz-key"),
            ("STORAGE_BACKEND", "memory"),
            ("B2_BUCKET_NAME", "override-bucket"),
            ("TELEMETRY_ENABLED", "false"),
        ]));

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.api_key.as_deref(), Some("proxy-key"));
        assert_eq!(config.database.path, "/tmp/vox.db");
        assert_eq!(config.providers.primary, ProviderKind::Noiz);
        assert_eq!(
            config.providers.credentials(ProviderKind::Noiz).unwrap().api_key,
            "noiz-key"
        );
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.b2.unwrap().bucket_name, "override-bucket");
        assert!(!config.telemetry.enabled);
    }

    #[test]
    fn test_b2_backend_requires_credentials() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vox.toml");
        std::fs::write(&path, "[storage]\nbackend = \"memory\"\n\n[server]\nport = 4000\n").unwrap();

        let config = Config::from_toml_file(&path).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(Config::from_toml_file(dir.path().join("missing.toml")).is_err());
    }
}

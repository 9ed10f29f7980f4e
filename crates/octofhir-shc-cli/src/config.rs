use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use octofhir_shc::inflate::DEFAULT_MAX_PAYLOAD_SIZE;
use octofhir_shc::{BatchPolicy, KeySetCacheConfig, ScannerConfig};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "octofhir-shc.toml";
pub const ENV_PREFIX: &str = "OCTOFHIR_SHC";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Issuer key-set fetching
    #[serde(default)]
    pub trust: TrustConfig,
    #[serde(default)]
    pub scan: ScanSettings,
    /// External lookup tables
    #[serde(default)]
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Allow plain HTTP key-set URLs (testing only)
    #[serde(default)]
    pub allow_http: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub default_cache_ttl_secs: u64,
    #[serde(default = "default_min_cache_ttl_secs")]
    pub min_cache_ttl_secs: u64,
    #[serde(default = "default_max_cache_ttl_secs")]
    pub max_cache_ttl_secs: u64,
    #[serde(default = "default_max_key_set_bytes")]
    pub max_key_set_bytes: usize,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_fetch_timeout_ms(),
            allow_http: false,
            default_cache_ttl_secs: default_cache_ttl_secs(),
            min_cache_ttl_secs: default_min_cache_ttl_secs(),
            max_cache_ttl_secs: default_max_cache_ttl_secs(),
            max_key_set_bytes: default_max_key_set_bytes(),
        }
    }
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_min_cache_ttl_secs() -> u64 {
    300
}

fn default_max_cache_ttl_secs() -> u64 {
    86_400
}

/// Upper bound accepted for any cache TTL setting (30 days).
const MAX_CACHE_TTL_SECS: u64 = 30 * 86_400;

fn default_max_key_set_bytes() -> usize {
    1024 * 1024
}

impl TrustConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn cache_config(&self) -> KeySetCacheConfig {
        KeySetCacheConfig::new()
            .with_default_ttl(Duration::from_secs(self.default_cache_ttl_secs))
            .with_min_ttl(Duration::from_secs(self.min_cache_ttl_secs))
            .with_max_ttl(Duration::from_secs(self.max_cache_ttl_secs))
            .with_request_timeout(self.fetch_timeout())
            .with_max_response_size(self.max_key_set_bytes)
            .with_allow_http(self.allow_http)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    #[serde(default)]
    pub batch_policy: BatchPolicy,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            batch_policy: BatchPolicy::default(),
        }
    }
}

fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    /// VCI trusted-issuer directory JSON; no issuer is trusted when unset
    pub issuers_file: Option<PathBuf>,
    /// CVX/MVX label JSON; built-in COVID-19 labels when unset
    pub labels_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        if self.trust.fetch_timeout_ms == 0 {
            return Err("trust.fetch_timeout_ms must be > 0".into());
        }
        let ttls = [
            ("default_cache_ttl_secs", self.trust.default_cache_ttl_secs),
            ("min_cache_ttl_secs", self.trust.min_cache_ttl_secs),
            ("max_cache_ttl_secs", self.trust.max_cache_ttl_secs),
        ];
        if let Some((name, _)) = ttls.iter().find(|(_, secs)| *secs > MAX_CACHE_TTL_SECS) {
            return Err(format!("trust.{name} must be <= {MAX_CACHE_TTL_SECS}"));
        }
        if self.trust.min_cache_ttl_secs > self.trust.max_cache_ttl_secs {
            return Err("trust.min_cache_ttl_secs must be <= trust.max_cache_ttl_secs".into());
        }
        if self.trust.max_key_set_bytes == 0 {
            return Err("trust.max_key_set_bytes must be > 0".into());
        }
        if self.scan.max_payload_bytes == 0 {
            return Err("scan.max_payload_bytes must be > 0".into());
        }
        Ok(())
    }

    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig::new()
            .with_max_payload_size(self.scan.max_payload_bytes)
            .with_fetch_timeout(self.trust.fetch_timeout())
            .with_batch_policy(self.scan.batch_policy)
    }
}

fn default_path() -> Option<PathBuf> {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    dirs::home_dir()
        .map(|home| home.join(".octofhir").join("shc.toml"))
        .filter(|p| p.exists())
}

/// Loads the config file (if any) with `OCTOFHIR_SHC__*` environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, String> {
    let mut builder = Config::builder();
    match path {
        Some(p) => {
            if !p.exists() {
                return Err(format!("config file not found: {}", p.display()));
            }
            builder = builder.add_source(File::from(p));
        }
        None => {
            if let Some(p) = default_path() {
                builder = builder.add_source(File::from(p));
            }
        }
    }
    // e.g. OCTOFHIR_SHC__TRUST__ALLOW_HTTP=true
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .separator("__"),
    );
    let cfg = builder
        .build()
        .map_err(|e| format!("config build error: {e}"))?;
    let merged: AppConfig = cfg
        .try_deserialize()
        .map_err(|e| format!("config deserialize error: {e}"))?;
    merged.validate()?;
    Ok(merged)
}

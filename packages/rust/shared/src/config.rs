//! Application configuration for tourledger.
//!
//! User config lives at `~/.tourledger/tourledger.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TourLedgerError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tourledger.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tourledger";

// ---------------------------------------------------------------------------
// Config structs (matching tourledger.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Message source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Extraction oracle settings.
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Ledger and watermark locations.
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the libSQL mirror of the client message store.
    #[serde(default = "default_source_path")]
    pub database_path: String,

    /// Minimum pipeline stage a client must reach to be analyzed.
    #[serde(default = "default_min_stage")]
    pub min_stage: i64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            database_path: default_source_path(),
            min_stage: default_min_stage(),
        }
    }
}

fn default_source_path() -> String {
    "~/.tourledger/source.db".into()
}
fn default_min_stage() -> i64 {
    4
}

/// `[oracle]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for extraction.
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Transcripts above this many characters are truncated.
    #[serde(default = "default_max_transcript_chars")]
    pub max_transcript_chars: usize,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_transcript_chars: default_max_transcript_chars(),
            temperature: 0.0,
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_transcript_chars() -> usize {
    60_000
}

/// `[ledger]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Directory holding `ledger.db`, `subjects/`, and `last_sync.txt`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "~/.tourledger/data".into()
}

// ---------------------------------------------------------------------------
// Sync config (runtime, resolved from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime configuration for one orchestrator run, with paths expanded.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// libSQL mirror of the message store.
    pub source_path: PathBuf,
    /// Qualifying stage threshold.
    pub min_stage: i64,
    /// Master ledger database.
    pub ledger_path: PathBuf,
    /// Per-subject artifact directory.
    pub artifacts_dir: PathBuf,
    /// Watermark file.
    pub watermark_path: PathBuf,
    /// Oracle model identifier.
    pub model: String,
    /// Oracle API base URL.
    pub oracle_base_url: String,
    /// Oracle request timeout in seconds.
    pub oracle_timeout_secs: u64,
    /// Transcript truncation threshold in characters.
    pub max_transcript_chars: usize,
    /// Sampling temperature.
    pub temperature: f32,
}

impl From<&AppConfig> for SyncConfig {
    fn from(config: &AppConfig) -> Self {
        let data_dir = expand_home(&config.ledger.data_dir);
        Self {
            source_path: expand_home(&config.source.database_path),
            min_stage: config.source.min_stage,
            ledger_path: data_dir.join("ledger.db"),
            artifacts_dir: data_dir.join("subjects"),
            watermark_path: data_dir.join("last_sync.txt"),
            model: config.oracle.model.clone(),
            oracle_base_url: config.oracle.base_url.clone(),
            oracle_timeout_secs: config.oracle.timeout_secs,
            max_transcript_chars: config.oracle.max_transcript_chars,
            temperature: config.oracle.temperature,
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tourledger/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TourLedgerError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tourledger/tourledger.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TourLedgerError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| TourLedgerError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    init_config_at(&config_file_path()?)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<PathBuf> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| TourLedgerError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TourLedgerError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| TourLedgerError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path.to_path_buf())
}

/// Check that the oracle API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    resolve_api_key(config).map(|_| ())
}

/// Read the oracle API key from the configured env var.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.oracle.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(TourLedgerError::config(format!(
            "oracle API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.source.min_stage, 4);
        assert_eq!(parsed.oracle.model, "gemini-2.0-flash");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[source]
database_path = "/srv/crm/mirror.db"

[ledger]
data_dir = "/var/lib/tourledger"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.source.database_path, "/srv/crm/mirror.db");
        assert_eq!(config.source.min_stage, 4);
        assert_eq!(config.oracle.timeout_secs, 120);

        let sync = SyncConfig::from(&config);
        assert_eq!(sync.ledger_path, PathBuf::from("/var/lib/tourledger/ledger.db"));
        assert_eq!(sync.artifacts_dir, PathBuf::from("/var/lib/tourledger/subjects"));
        assert_eq!(
            sync.watermark_path,
            PathBuf::from("/var/lib/tourledger/last_sync.txt")
        );
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/tmp/x.db"), PathBuf::from("/tmp/x.db"));
        assert_eq!(expand_home("relative/x.db"), PathBuf::from("relative/x.db"));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.oracle.api_key_env = "TL_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn init_at_path_writes_loadable_defaults() {
        let path = std::env::temp_dir()
            .join(format!("tl_config_{}", std::process::id()))
            .join("tourledger.toml");
        let written = init_config_at(&path).expect("init");
        let loaded = load_config_from(&written).expect("load");
        assert_eq!(loaded.ledger.data_dir, "~/.tourledger/data");
        let _ = std::fs::remove_file(&written);
    }
}

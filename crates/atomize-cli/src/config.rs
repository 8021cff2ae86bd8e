//! Configuration file management for atomize.
//!
//! Provides a TOML-based config file at `~/.config/atomize/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use atomize_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub security: SecuritySection,
    #[serde(default)]
    pub generator: GeneratorSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SecuritySection {
    /// Hex-encoded field-encryption secret (64 hex chars = 32 bytes).
    pub encryption_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeneratorSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Bearer token for the generation API. Usually supplied through the
    /// `OPENAI_API_KEY` env var instead; `atomize init` never writes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_max_stream_secs")]
    pub max_stream_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_owned()
}

fn default_model() -> String {
    "gpt-4o-mini".to_owned()
}

fn default_max_stream_secs() -> u64 {
    300
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            max_stream_secs: default_max_stream_secs(),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the atomize config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/atomize` or `~/.config/atomize`.
/// We intentionally ignore the platform-specific `dirs::config_dir()`
/// (which returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("atomize");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("atomize")
}

/// Return the path to the atomize config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    // Set permissions to 0600 (owner read/write only) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Encryption key generation
// -----------------------------------------------------------------------

/// Generate a random encryption key: 32 random bytes, hex-encoded (64 chars).
pub fn generate_encryption_key() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Generation transport settings, with the API key resolved.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_stream_secs: u64,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct AtomizeConfig {
    pub db_config: DbConfig,
    pub encryption_key: String,
    pub generator: GeneratorSettings,
}

impl AtomizeConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `ATOMIZE_DATABASE_URL` env > `config_file.database.url` > `DbConfig::DEFAULT_URL`
    /// - Encryption key: `ATOMIZE_ENCRYPTION_KEY` env > `config_file.security.encryption_key` > error
    /// - API key: `OPENAI_API_KEY` env > `config_file.generator.api_key` > absent
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        // DB URL resolution.
        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("ATOMIZE_DATABASE_URL") {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };
        let db_config = DbConfig::new(db_url);

        // Encryption key resolution. The key seals data at rest, so there
        // is no usable default.
        let encryption_key = if let Ok(key) = std::env::var("ATOMIZE_ENCRYPTION_KEY") {
            key
        } else if let Some(ref cfg) = file_config {
            cfg.security.encryption_key.clone()
        } else {
            bail!(
                "encryption key not found; set ATOMIZE_ENCRYPTION_KEY or run `atomize init` to create a config file"
            );
        };
        if encryption_key.is_empty() {
            bail!("encryption key is empty; run `atomize init` to generate one");
        }

        // Generator settings. The API key is env-or-file; commands that
        // never talk to the generation API work without one.
        let section = file_config
            .map(|cfg| cfg.generator)
            .unwrap_or_default();
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .or(section.api_key);

        Ok(Self {
            db_config,
            encryption_key,
            generator: GeneratorSettings {
                base_url: section.base_url,
                model: section.model,
                api_key,
                max_stream_secs: section.max_stream_secs,
            },
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from an optional TOML file. A missing or
//! unreadable file is never fatal: a warning is logged and compiled
//! defaults are used.
//!
//! Root folder priority:
//! 1. Command-line argument
//! 2. `RLP_ROOT_FOLDER` (or legacy `RLP_ROOT`) environment variable
//! 3. `root_folder` in the TOML file
//! 4. OS-dependent compiled default

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

pub const ROOT_FOLDER_ENV: &str = "RLP_ROOT_FOLDER";
pub const ROOT_FOLDER_ENV_LEGACY: &str = "RLP_ROOT";
pub const DATABASE_FILE: &str = "rlp.db";

/// Bootstrap configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Address the HTTP server binds to
    #[serde(default)]
    pub bind_address: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub integrations: IntegrationsConfig,

    #[serde(default)]
    pub digest: DigestConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Third-party service credentials; every integration is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationsConfig {
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
    #[serde(default)]
    pub resend_api_key: Option<String>,
    #[serde(default)]
    pub email_from: Option<String>,
    #[serde(default)]
    pub resend_base_url: Option<String>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub openai_model: Option<String>,
    #[serde(default)]
    pub openai_base_url: Option<String>,
    #[serde(default)]
    pub playht_user_id: Option<String>,
    #[serde(default)]
    pub playht_api_key: Option<String>,
    #[serde(default)]
    pub playht_voice: Option<String>,
    #[serde(default)]
    pub playht_base_url: Option<String>,
}

/// Weekly digest schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Day of week, e.g. "mon"
    #[serde(default = "default_digest_weekday")]
    pub weekday: String,
    /// UTC hour
    #[serde(default = "default_digest_hour")]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
    /// Request text-to-speech narration after generation
    #[serde(default)]
    pub narrate: bool,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weekday: default_digest_weekday(),
            hour: default_digest_hour(),
            minute: 0,
            narrate: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_digest_weekday() -> String {
    "mon".to_string()
}

fn default_digest_hour() -> u32 {
    9
}

/// Compiled fallback values
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub bind_address: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: default_log_level(),
            bind_address: "127.0.0.1:5780".to_string(),
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/rlp (or /var/lib/rlp for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("rlp"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/rlp"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("rlp"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/rlp"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("rlp"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\rlp"))
    } else {
        PathBuf::from("./rlp_data")
    }
}

/// Resolves the root folder and bootstrap config for one module
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    config_override: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            config_override: None,
        }
    }

    /// Highest-priority root folder from the command line
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Use this TOML file instead of the platform location
    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_override = path;
        self
    }

    /// Platform location of this module's TOML file
    ///
    /// `~/.config/rlp/<module>.toml`, falling back to `/etc/rlp/<module>.toml`
    /// on Linux when the user file does not exist.
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_override {
            return Some(path.clone());
        }
        let file_name = format!("{}.toml", self.module_name);
        let user = dirs::config_dir().map(|d| d.join("rlp").join(&file_name));
        if cfg!(target_os = "linux") {
            if let Some(path) = &user {
                if path.exists() {
                    return user;
                }
            }
            let system = PathBuf::from("/etc/rlp").join(&file_name);
            if system.exists() {
                return Some(system);
            }
        }
        user
    }

    /// Load the TOML file, degrading to defaults on any problem
    pub fn load_config(&self) -> TomlConfig {
        let Some(path) = self.config_path() else {
            warn!("Could not determine config directory; using defaults");
            return TomlConfig::default();
        };
        if !path.exists() {
            info!("No config file at {}; using defaults", path.display());
            return TomlConfig::default();
        }
        match load_toml_config(&path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring unreadable config {}: {}", path.display(), e);
                TomlConfig::default()
            }
        }
    }

    /// Root folder using the documented priority order
    pub fn resolve(&self) -> PathBuf {
        self.resolve_with(&self.load_config())
    }

    /// Root folder using an already-loaded config
    pub fn resolve_with(&self, config: &TomlConfig) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }
        for var in [ROOT_FOLDER_ENV, ROOT_FOLDER_ENV_LEGACY] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    return PathBuf::from(path);
                }
            }
        }
        if let Some(path) = &config.root_folder {
            return path.clone();
        }
        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates files inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            info!("Created root folder: {}", self.root.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}

pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Secret lookup: environment first, then TOML; blank values count as unset
pub fn resolve_secret(env_var: &str, toml_value: Option<&String>) -> Option<String> {
    std::env::var(env_var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| toml_value.filter(|v| !v.trim().is_empty()).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config: TomlConfig = toml::from_str("root_folder = \"/srv/rlp\"").unwrap();
        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/rlp")));
        assert_eq!(config.logging.level, "info");
        assert!(config.digest.enabled);
        assert_eq!(config.digest.weekday, "mon");
        assert_eq!(config.digest.hour, 9);
        assert!(config.integrations.openai_api_key.is_none());
    }

    #[test]
    fn test_cli_arg_wins() {
        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };
        let resolver = RootFolderResolver::new("test").with_cli_arg(Some(PathBuf::from("/from/cli")));
        assert_eq!(resolver.resolve_with(&config), PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_config_override_path() {
        let resolver =
            RootFolderResolver::new("test").with_config_file(Some(PathBuf::from("/tmp/x.toml")));
        assert_eq!(resolver.config_path(), Some(PathBuf::from("/tmp/x.toml")));
    }
}

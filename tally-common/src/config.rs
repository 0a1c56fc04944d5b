//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Resolution order for every
//! setting that can come from more than one place:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is never fatal: it logs a warning and uses defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "TALLY_ROOT_FOLDER";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "TALLY_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the fact store database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP bind address, e.g. "127.0.0.1:5730"
    #[serde(default)]
    pub bind: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub reconciliation: ReconciliationConfig,

    #[serde(default)]
    pub ensemble: EnsembleConfig,

    #[serde(default)]
    pub providers: ProvidersToml,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full EnvFilter directive
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

/// Quantitative reconciliation tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Distinct sources needed before a pending value is promoted
    #[serde(default = "default_min_sources_required")]
    pub min_sources_required: usize,

    /// How many times a merge is re-run after losing a compare-and-swap race
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            min_sources_required: default_min_sources_required(),
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

/// Classifier ensemble tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Provider A confidence above which a disagreement skips arbitration
    #[serde(default = "default_confidence_shortcut")]
    pub confidence_shortcut: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            confidence_shortcut: default_confidence_shortcut(),
        }
    }
}

/// Per-role provider sections (`[providers.fast]`, `[providers.thorough]`, `[providers.arbiter]`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersToml {
    #[serde(default)]
    pub fast: ProviderToml,
    #[serde(default)]
    pub thorough: ProviderToml,
    #[serde(default)]
    pub arbiter: ProviderToml,
}

/// Provider overrides; every unset field falls back to the role default
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToml {
    pub endpoint: Option<String>,
    /// Backend chain, highest priority first
    pub models: Option<Vec<String>>,
    pub api_key: Option<String>,
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    /// HTTP statuses treated as "backend retired"
    pub permanent_statuses: Option<Vec<u16>>,
    pub timeout_ms: Option<u64>,
    pub requests_per_second: Option<u32>,
    pub max_input_chars: Option<usize>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub abandon_on_transient: Option<bool>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_min_sources_required() -> usize {
    2
}

fn default_max_conflict_retries() -> u32 {
    8
}

fn default_confidence_shortcut() -> f64 {
    0.95
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config file if it exists, otherwise warn and use defaults
    ///
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => {
                let config = Self::load(path)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Some(path) => {
                warn!(
                    "Config file not found at {}, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                warn!("No config file location available, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.reconciliation.min_sources_required == 0 {
            return Err(Error::Config(
                "reconciliation.min_sources_required must be at least 1".to_string(),
            ));
        }
        let threshold = self.ensemble.confidence_shortcut;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "ensemble.confidence_shortcut must be within [0, 1], got {}",
                threshold
            )));
        }
        Ok(())
    }
}

/// Resolve the config file path
///
/// **Priority:** CLI → `TALLY_CONFIG` → `<config dir>/tally/<module>.toml`
pub fn resolve_config_path(cli_arg: Option<&Path>, module_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir().map(|d| d.join("tally").join(format!("{}.toml", module_name)))
}

/// Root folder resolution
pub struct RootFolderResolver {
    module_name: String,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
        }
    }

    /// Resolve the root folder
    ///
    /// **Priority:** CLI → `TALLY_ROOT_FOLDER` → TOML `root_folder` → OS default
    pub fn resolve(&self, cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &toml.root_folder {
            return path.clone();
        }

        let default = default_root_folder();
        info!(
            module = %self.module_name,
            "Using default root folder {}",
            default.display()
        );
        default
    }
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tally"))
        .unwrap_or_else(|| PathBuf::from("./tally_data"))
}

/// Creates the root folder and locates files inside it
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the root folder if missing (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Path of the fact store database
    pub fn database_path(&self) -> PathBuf {
        self.root.join("tally.db")
    }
}

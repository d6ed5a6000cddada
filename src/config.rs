//! Binding Configuration
//!
//! Where to find libconcord and whether calls are traced. Values come from an
//! optional `concord.toml` file, then from the environment.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::concord::ABI_VERSION;

/// Set to `1` to trace every bound call.
pub const TRACE_ENV: &str = "LIBCONCORD_TRACE";

/// Explicit path of the libconcord artifact.
pub const PATH_ENV: &str = "LIBCONCORD_PATH";

/// Path of a toml file loaded before environment overrides.
pub const CONFIG_ENV: &str = "LIBCONCORD_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching concord.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BindingConfig {
    /// Library resolution
    #[serde(default)]
    pub library: LibraryConfig,

    /// Call tracing
    #[serde(default)]
    pub trace: TraceConfig,
}

impl BindingConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        log::debug!("loaded binding config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from toml text.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults, or the file named by `LIBCONCORD_CONFIG`, with environment
    /// overrides applied.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `LIBCONCORD_TRACE` and `LIBCONCORD_PATH`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(TRACE_ENV) {
            self.trace.enabled = trace_flag(&value);
        }
        if let Some(path) = lookup(PATH_ENV).filter(|p| !p.is_empty()) {
            self.library.path = Some(PathBuf::from(path));
        }
    }
}

/// Only the literal `1` turns tracing on.
pub fn trace_flag(value: &str) -> bool {
    value.trim() == "1"
}

/// Library resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryConfig {
    /// Explicit artifact path, tried before anything else
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// ABI version embedded in the platform file name
    #[serde(default = "default_abi_version")]
    pub abi_version: u32,

    /// Extra directories searched for the platform file name
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

fn default_abi_version() -> u32 {
    ABI_VERSION
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            path: None,
            abi_version: ABI_VERSION,
            search_paths: Vec::new(),
        }
    }
}

/// Call tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceConfig {
    /// Wrap every bound function in the trace interceptor
    #[serde(default)]
    pub enabled: bool,

    /// Name printed before each traced function
    #[serde(default = "default_trace_prefix")]
    pub prefix: String,
}

fn default_trace_prefix() -> String {
    "libconcord".to_string()
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: default_trace_prefix(),
        }
    }
}

static GLOBAL: Lazy<Result<BindingConfig, String>> =
    Lazy::new(|| BindingConfig::from_env().map_err(|e| e.to_string()));

/// Process-wide configuration, read from the environment exactly once.
///
/// Later changes to the environment have no effect.
pub fn global() -> Result<&'static BindingConfig, crate::ffi::BindError> {
    GLOBAL
        .as_ref()
        .map_err(|e| crate::ffi::BindError::Config(e.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = BindingConfig::default();
        assert!(!config.trace.enabled);
        assert_eq!(config.trace.prefix, "libconcord");
        assert_eq!(config.library.abi_version, ABI_VERSION);
        assert!(config.library.path.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[library]
path = "/opt/concord/libconcord.so.6"
abi_version = 1
search_paths = ["/opt/concord/lib"]

[trace]
enabled = true
"#;
        let config = BindingConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(
            config.library.path.as_deref(),
            Some(Path::new("/opt/concord/libconcord.so.6"))
        );
        assert_eq!(config.library.abi_version, 1);
        assert_eq!(config.library.search_paths.len(), 1);
        assert!(config.trace.enabled);
        assert_eq!(config.trace.prefix, "libconcord");
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [(TRACE_ENV, "1"), (PATH_ENV, "/tmp/libconcord.so.6")]
            .into_iter()
            .collect();
        let mut config = BindingConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert!(config.trace.enabled);
        assert_eq!(
            config.library.path.as_deref(),
            Some(Path::new("/tmp/libconcord.so.6"))
        );
    }

    #[test]
    fn test_trace_flag_values() {
        assert!(trace_flag("1"));
        assert!(!trace_flag("0"));
        assert!(!trace_flag("true"));
        assert!(!trace_flag(""));

        let mut config = BindingConfig::default();
        config.trace.enabled = true;
        config.apply_overrides(|k| (k == TRACE_ENV).then(|| "0".to_string()));
        assert!(!config.trace.enabled);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concord.toml");

        let mut config = BindingConfig::default();
        config.library.search_paths.push(PathBuf::from("/usr/local/lib"));
        config.trace.prefix = "concord".to_string();
        config.save(&path).unwrap();

        let loaded = BindingConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = BindingConfig::load(Path::new("/nonexistent/concord.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}

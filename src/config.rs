//! Configuration for the subprime GLX shim
//!
//! Loads configuration from the TOML file named by `SUBPRIME_CONFIG`, or
//! `~/.config/subprime/config.toml`. Falls back to defaults when the file is
//! missing or unreadable; the shim runs inside client processes and never
//! writes the file itself.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "SUBPRIME_CONFIG";

/// How the EGL display is acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayPlatform {
    /// `eglGetDisplay(EGL_DEFAULT_DISPLAY)`
    Default,
    /// First device from `eglQueryDevicesEXT` on `EGL_PLATFORM_DEVICE_EXT`
    Device,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    /// EGL library to bind against
    pub egl_library: String,
    /// Library searched for GL symbols `eglGetProcAddress` does not return
    pub gl_library: String,
    pub platform: DisplayPlatform,
    /// Upper bound on configs returned by one enumeration
    pub max_configs: usize,
    /// Answers for GLX_MAX_PBUFFER_WIDTH / GLX_MAX_PBUFFER_HEIGHT
    pub max_pbuffer_width: i32,
    pub max_pbuffer_height: i32,
    /// GLX_VENDOR string
    pub vendor: String,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            egl_library: "libEGL.so.1".into(),
            gl_library: "libOpenGL.so.0".into(),
            platform: DisplayPlatform::Device,
            max_configs: 256,
            max_pbuffer_width: 4096,
            max_pbuffer_height: 4096,
            vendor: "subprime".into(),
        }
    }
}

impl ShimConfig {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Self {
        let path = match Self::config_path() {
            Ok(path) => path,
            Err(e) => {
                warn!("No config location available ({:#}), using defaults", e);
                return Self::default();
            }
        };

        match Self::load_from(&path) {
            Ok(Some(config)) => config,
            Ok(None) => {
                info!("Config file not found at {:?}, using defaults", path);
                Self::default()
            }
            Err(e) => {
                warn!("Ignoring config file {:?}: {:#}", path, e);
                Self::default()
            }
        }
    }

    /// Parse the given file; `Ok(None)` when it does not exist
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .context("Failed to read config file")?;

        let config: ShimConfig = toml::from_str(&content)
            .context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(Some(config))
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("subprime");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = ShimConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "platform = \"default\"").unwrap();
        writeln!(file, "max_pbuffer_width = 8192").unwrap();

        let config = ShimConfig::load_from(file.path()).unwrap().unwrap();
        assert_eq!(config.platform, DisplayPlatform::Default);
        assert_eq!(config.max_pbuffer_width, 8192);
        assert_eq!(config.max_pbuffer_height, 4096);
        assert_eq!(config.egl_library, "libEGL.so.1");
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_configs = \"many\"").unwrap();
        assert!(ShimConfig::load_from(file.path()).is_err());
    }
}

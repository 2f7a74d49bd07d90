// crates/dataroute-config/src/load.rs
// ============================================================================
// Module: Configuration Loading
// Description: Guarded file loading for routing configuration.
// Purpose: Read and parse config files with strict fail-closed input checks.
// Dependencies: serde_json, serde_yaml, crate::model
// ============================================================================

//! ## Overview
//! Loading is strict: the path length, file size, and encoding are checked
//! before parsing, and the parsed configuration is validated before it is
//! returned. A config that loads successfully is safe to hand to the engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::model::RouterConfig;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum accepted config path length in bytes.
const MAX_PATH_BYTES: usize = 4_096;
/// Maximum accepted path component length in bytes.
const MAX_PATH_COMPONENT_BYTES: usize = 255;
/// Maximum accepted config file size in bytes.
const MAX_FILE_BYTES: usize = 1_048_576;

// ============================================================================
// SECTION: Config Errors
// ============================================================================

/// Errors raised while loading or validating configuration.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config path exceeds the maximum length.
    #[error("config path exceeds max length ({0} bytes)")]
    PathTooLong(usize),
    /// A config path component exceeds the maximum length.
    #[error("config path component too long ({0} bytes)")]
    PathComponentTooLong(usize),
    /// Config file exceeds the size limit.
    #[error("config file exceeds size limit ({0} bytes)")]
    FileTooLarge(usize),
    /// Config file is not valid UTF-8.
    #[error("config file must be utf-8")]
    NotUtf8,
    /// Config file extension is not recognized.
    #[error("unsupported config extension: {0}")]
    UnsupportedExtension(String),
    /// Config file could not be read.
    #[error("config read failed: {0}")]
    Read(String),
    /// Config file could not be parsed.
    #[error("config parse failed: {0}")]
    Parse(String),
    /// Config content failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl RouterConfig {
    /// Loads and validates configuration from a YAML or JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the path fails input guards, the file
    /// cannot be read or parsed, or the content fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        check_path(path)?;

        let bytes = fs::read(path).map_err(|err| ConfigError::Read(err.to_string()))?;
        if bytes.len() > MAX_FILE_BYTES {
            return Err(ConfigError::FileTooLarge(bytes.len()));
        }
        let text = String::from_utf8(bytes).map_err(|_| ConfigError::NotUtf8)?;

        let config = parse(path, &text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Checks path-level input guards.
fn check_path(path: &Path) -> Result<(), ConfigError> {
    let rendered = path.as_os_str().len();
    if rendered > MAX_PATH_BYTES {
        return Err(ConfigError::PathTooLong(rendered));
    }
    for component in path.components() {
        let len = component.as_os_str().len();
        if len > MAX_PATH_COMPONENT_BYTES {
            return Err(ConfigError::PathComponentTooLong(len));
        }
    }
    Ok(())
}

/// Parses config text based on the file extension.
fn parse(path: &Path, text: &str) -> Result<RouterConfig, ConfigError> {
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "yaml" | "yml" => {
            serde_yaml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
        }
        "json" => serde_json::from_str(text).map_err(|err| ConfigError::Parse(err.to_string())),
        other => Err(ConfigError::UnsupportedExtension(other.to_string())),
    }
}

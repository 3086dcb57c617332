//! Engine configuration.
//!
//! [`EngineConfig`] is loaded from a JSON file and/or environment variables.
//!
//! ## Environment Variables
//!
//! - `MINIBACKUP_MANIFEST_ALGORITHM`: digest used for plain-mode manifests
//! - `MINIBACKUP_PRESERVE_MTIME`: `true`/`false`, reapply modification times

use std::env;
use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use crate::checksums::ChecksumAlgorithm;
use crate::error::EngineError;

pub const ENV_MANIFEST_ALGORITHM: &str = "MINIBACKUP_MANIFEST_ALGORITHM";
pub const ENV_PRESERVE_MTIME: &str = "MINIBACKUP_PRESERVE_MTIME";

/// Default name of the manifest written into a plain-mode backup root.
pub const DEFAULT_MANIFEST_NAME: &str = ".minibackup.manifest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// File name of the plain-mode manifest inside the backup root
    pub manifest_name: String,

    /// Digest used for plain-mode manifests (archives always use CRC-32)
    pub manifest_algorithm: ChecksumAlgorithm,

    /// Reapply recorded modification times on restore and unpack
    pub preserve_mtime: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
            manifest_algorithm: ChecksumAlgorithm::Crc32,
            preserve_mtime: true,
        }
    }
}

impl EngineConfig {
    /// Load config from a JSON file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        info!(path = %path.display(), "loading engine config");
        let text = fs::read_to_string(path).map_err(|e| EngineError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config: EngineConfig =
            serde_json::from_str(&text).map_err(|e| EngineError::Config {
                message: format!("{}: {}", path.display(), e),
            })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, EngineError> {
        let mut config = EngineConfig::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var(ENV_MANIFEST_ALGORITHM) {
            match ChecksumAlgorithm::from_str(&value) {
                Some(algorithm) => {
                    debug!(%algorithm, "overriding manifest algorithm from environment");
                    self.manifest_algorithm = algorithm;
                }
                None => warn!(value = %value, "ignoring unknown manifest algorithm"),
            }
        }

        if let Ok(value) = env::var(ENV_PRESERVE_MTIME) {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.preserve_mtime = true,
                "0" | "false" | "no" => self.preserve_mtime = false,
                _ => warn!(value = %value, "ignoring invalid preserve_mtime value"),
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), EngineError> {
        let name = self.manifest_name.trim();
        if name.is_empty() {
            return Err(EngineError::Config {
                message: "manifest_name cannot be empty".to_string(),
            });
        }
        if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            return Err(EngineError::Config {
                message: format!("manifest_name must be a plain file name, got '{}'", name),
            });
        }
        Ok(())
    }
}

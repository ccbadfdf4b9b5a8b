//! Configuration types and loading.
//!
//! The configuration is an optional TOML file. Every field has a default, so a missing file or
//! a file containing only a few keys is valid:
//!
//! ```toml
//! [layout]
//! volume_name = "rootfs_data"
//!
//! [switch]
//! strict_copy = false
//!
//! [boot]
//! extroot = true
//! extroot_prefix = "/tmp/overlay"
//! ```

mod defaults;
mod layout;

use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{FlashrootError, FlashrootResult};

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use layout::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The flashroot configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashrootConfig {
    /// Paths, names and filesystem types.
    pub layout: Layout,

    /// Behaviour of the RAM-to-flash switch.
    pub switch: SwitchConfig,

    /// Behaviour of the boot-time mount.
    pub boot: BootConfig,
}

/// Behaviour of the RAM-to-flash switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Abort the switch when copying the RAM overlay onto flash fails.
    ///
    /// When false a failed copy is logged and the pivot goes ahead anyway.
    pub strict_copy: bool,
}

/// Behaviour of the boot-time mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    /// Try `block extroot` before adopting the persistent volume.
    pub extroot: bool,

    /// Directory handed to `block extroot` as the internal overlay. Defaults to the layout's
    /// staging mount.
    pub extroot_prefix: Option<PathBuf>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FlashrootConfig {
    /// Loads the configuration.
    ///
    /// The file is taken from `path`, then `FLASHROOT_CONFIG`, then the default location. A
    /// missing file yields the defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> FlashrootResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => env::var_os(CONFIG_PATH_ENV_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => Self::from_toml(&contents).map_err(|e| match e {
                FlashrootError::Config(msg) => {
                    FlashrootError::Config(format!("{}: {msg}", path.display()))
                }
                other => other,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("no configuration at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                return Err(FlashrootError::Config(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parses a configuration from TOML.
    pub fn from_toml(contents: &str) -> FlashrootResult<Self> {
        toml::from_str(contents).map_err(|e| FlashrootError::Config(e.to_string()))
    }

    /// Applies `FLASHROOT_VOLUME` and `FLASHROOT_EXTROOT_PREFIX` when they are set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(volume) = env::var(VOLUME_ENV_VAR) {
            let volume = volume.trim();
            if !volume.is_empty() {
                self.layout.volume_name = volume.to_string();
            }
        }

        if let Ok(prefix) = env::var(EXTROOT_PREFIX_ENV_VAR) {
            let prefix = prefix.trim();
            if !prefix.is_empty() {
                self.boot.extroot_prefix = Some(PathBuf::from(prefix));
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for SwitchConfig {
    fn default() -> Self {
        Self { strict_copy: true }
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            extroot: true,
            extroot_prefix: None,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

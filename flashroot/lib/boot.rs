//! Choosing the root overlay at boot.

use std::fmt::{self, Display};

use crate::{
    config::{BootConfig, Layout},
    mounts::MountOps,
    switch::{install_staged, stage},
    volume::{require, VolumeManager},
    FlashrootError, FlashrootResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The overlay the system ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// An external overlay set up by `block extroot`.
    Extroot,

    /// The persistent flash volume.
    Persistent,

    /// A tmpfs overlay, to be switched to flash later.
    RamOverlay,
}

/// Mounts the best available overlay at boot, falling back to RAM.
pub struct BootPolicy<'a> {
    volumes: &'a dyn VolumeManager,
    mounts: &'a dyn MountOps,
    layout: &'a Layout,
    config: &'a BootConfig,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<'a> BootPolicy<'a> {
    /// Creates a boot policy.
    pub fn new(
        volumes: &'a dyn VolumeManager,
        mounts: &'a dyn MountOps,
        layout: &'a Layout,
        config: &'a BootConfig,
    ) -> Self {
        Self {
            volumes,
            mounts,
            layout,
            config,
        }
    }

    /// Installs an overlay root.
    ///
    /// Tries extroot unless disabled, then the persistent volume, then a tmpfs overlay. Only a
    /// failure of the tmpfs fallback is returned as an error.
    pub fn mount(&self) -> FlashrootResult<BootOutcome> {
        let volume = require(self.volumes, &self.layout.volume_name)?;
        if let Some(mount_point) = self.mounts.find_mount_point(volume.get_block_path(), None) {
            return Err(FlashrootError::Precondition(format!(
                "{}:{} is already mounted as {}",
                volume.get_name(),
                volume.get_block_path().display(),
                mount_point.display()
            )));
        }

        match stage(self.volumes, self.mounts, self.layout, &volume) {
            Ok(()) => match self.adopt_staged() {
                Ok(outcome) => return Ok(outcome),
                Err(e) => tracing::error!("switching to {} failed: {e}", volume.get_name()),
            },
            Err(e) => tracing::error!("mounting {} failed: {e}", volume.get_name()),
        }

        tracing::warn!("falling back to ramoverlay");
        self.mounts.ramoverlay()?;
        Ok(BootOutcome::RamOverlay)
    }

    fn adopt_staged(&self) -> FlashrootResult<BootOutcome> {
        if self.config.extroot {
            let prefix = self
                .config
                .extroot_prefix
                .as_ref()
                .unwrap_or(&self.layout.staging);
            match self.mounts.extroot(prefix) {
                Ok(()) => {
                    tracing::info!("switched to extroot");
                    return Ok(BootOutcome::Extroot);
                }
                Err(e) => tracing::info!("extroot not used: {e}"),
            }
        }

        tracing::info!("switching to {}", self.layout.persistent_fstype);
        install_staged(self.mounts, self.layout)?;
        Ok(BootOutcome::Persistent)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for BootOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootOutcome::Extroot => write!(f, "extroot"),
            BootOutcome::Persistent => write!(f, "persistent overlay"),
            BootOutcome::RamOverlay => write!(f, "ramoverlay"),
        }
    }
}

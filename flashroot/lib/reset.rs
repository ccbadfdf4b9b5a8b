//! Wiping the persistent overlay.

use std::{fs, path::Path};

use flashutils::{foreach_dir, WalkFailure};
use nix::mount::MsFlags;

use crate::{
    config::Layout,
    mounts::MountOps,
    volume::{require, VolumeManager},
    FlashrootError, FlashrootResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The question asked before destroying persistent state.
pub const CONFIRMATION_PROMPT: &str =
    "This will erase all settings and remove any installed packages. Are you sure? [N/y]";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Asks the operator to approve a destructive operation.
pub trait ConfirmationGate {
    /// Shows `prompt` and returns whether the operator agreed.
    fn confirm(&self, prompt: &str) -> FlashrootResult<bool>;
}

/// Reads the answer from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirmation;

/// Erases everything stored on the persistent volume.
pub struct Eraser<'a> {
    volumes: &'a dyn VolumeManager,
    mounts: &'a dyn MountOps,
    layout: &'a Layout,
    gate: &'a dyn ConfirmationGate,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<'a> Eraser<'a> {
    /// Creates an eraser.
    pub fn new(
        volumes: &'a dyn VolumeManager,
        mounts: &'a dyn MountOps,
        layout: &'a Layout,
        gate: &'a dyn ConfirmationGate,
    ) -> Self {
        Self {
            volumes,
            mounts,
            layout,
            gate,
        }
    }

    /// Erases the persistent volume, asking first unless `force` is set.
    ///
    /// A mounted volume is emptied file by file and the root is remounted. An unmounted volume is
    /// erased block by block.
    pub fn reset(&self, force: bool) -> FlashrootResult<()> {
        confirm_destructive(force, self.gate)?;

        if !self.mounts.find_filesystem(&self.layout.overlay_fstype) {
            return Err(FlashrootError::Precondition(format!(
                "{} filesystem not found",
                self.layout.overlay_fstype
            )));
        }

        let volume = require(self.volumes, &self.layout.volume_name)?;
        let mount_point = self.mounts.find_mount_point(
            volume.get_block_path(),
            Some(self.layout.persistent_fstype.as_str()),
        );

        match mount_point {
            Some(mount_point) => {
                tracing::info!(
                    "{} is mounted as {}, only erasing files",
                    volume.get_block_path().display(),
                    mount_point.display()
                );

                let failures = empty_tree(&mount_point);
                self.mounts.remount(&self.layout.root, MsFlags::empty())?;

                if !failures.is_empty() {
                    return Err(FlashrootError::custom(anyhow::anyhow!(
                        "{} entries under {} could not be removed",
                        failures.len(),
                        mount_point.display()
                    )));
                }
                Ok(())
            }
            None => {
                tracing::info!(
                    "{} is not mounted, erasing it",
                    volume.get_block_path().display()
                );
                self.volumes.erase_all(&volume)
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Succeeds if `force` is set or the gate approves, otherwise fails with
/// [`FlashrootError::ConfirmationDeclined`].
pub fn confirm_destructive(force: bool, gate: &dyn ConfirmationGate) -> FlashrootResult<()> {
    if force || gate.confirm(CONFIRMATION_PROMPT)? {
        Ok(())
    } else {
        Err(FlashrootError::ConfirmationDeclined)
    }
}

/// Removes everything below `mount_point`, keeping `mount_point` itself.
fn empty_tree(mount_point: &Path) -> Vec<WalkFailure<FlashrootError>> {
    let failures = foreach_dir(mount_point, &mut |dir: &Path| -> FlashrootResult<()> {
        for entry in fs::read_dir(dir).map_err(FlashrootError::at("opendir", dir))? {
            let entry = entry.map_err(FlashrootError::at("readdir", dir))?;
            let path = entry.path();
            let is_dir = entry
                .file_type()
                .map_err(FlashrootError::at("lstat", &path))?
                .is_dir();

            if !is_dir {
                tracing::trace!("unlink {}", path.display());
                fs::remove_file(&path).map_err(FlashrootError::at("unlink", &path))?;
            }
        }

        if dir != mount_point {
            tracing::trace!("rmdir {}", dir.display());
            fs::remove_dir(dir).map_err(FlashrootError::at("rmdir", dir))?;
        }

        Ok(())
    });

    for failure in &failures {
        tracing::warn!("{failure}");
    }

    failures
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl ConfirmationGate for StdinConfirmation {
    fn confirm(&self, prompt: &str) -> FlashrootResult<bool> {
        Ok(flashutils::ask_stdin(prompt)?)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

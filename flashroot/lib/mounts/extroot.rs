use std::{
    path::{Path, PathBuf},
    process::Command,
};

use crate::{FlashrootError, FlashrootResult};

use super::{is_mounted_at, MountOps, SystemMounts};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The `block` utility found inside an overlay, with the libraries it links against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTool {
    /// Path to the `block` binary.
    pub binary: PathBuf,

    /// Directory to put on `LD_LIBRARY_PATH` when running it.
    pub lib_dir: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BlockTool {
    /// Looks for `block` in the upper layer of an overlay at `prefix`, then in `prefix` itself.
    pub fn locate(prefix: &Path) -> Option<Self> {
        [prefix.join("upper"), prefix.to_path_buf()]
            .into_iter()
            .map(|base| BlockTool {
                binary: base.join("sbin/block"),
                lib_dir: base.join("lib"),
            })
            .find(|tool| tool.binary.is_file())
    }

    /// Runs `block extroot` and returns whether it reported success.
    pub fn run_extroot(&self) -> FlashrootResult<bool> {
        tracing::info!("running {} extroot", self.binary.display());
        let status = Command::new(&self.binary)
            .arg("extroot")
            .env("LD_LIBRARY_PATH", &self.lib_dir)
            .status()
            .map_err(FlashrootError::at("exec", &self.binary))?;

        Ok(status.success())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Hands the overlay staged at `prefix` to `block extroot` and, if it mounted an external
/// overlay, installs that overlay as the root.
pub(crate) fn run_extroot(ops: &SystemMounts, prefix: &Path) -> FlashrootResult<()> {
    let tool = BlockTool::locate(prefix).ok_or_else(|| {
        FlashrootError::Lookup(format!("no block utility under {}", prefix.display()))
    })?;

    if !tool.run_extroot()? {
        return Err(FlashrootError::Precondition(format!(
            "{} extroot did not configure an external overlay",
            tool.binary.display()
        )));
    }

    let layout = ops.layout();
    let external = layout.extroot_dir.join("overlay");
    if !is_mounted_at(&ops.mount_table(), &external) {
        return Err(FlashrootError::Lookup(format!(
            "nothing mounted at {}",
            external.display()
        )));
    }

    ops.move_mount(&external, &layout.overlay)?;
    ops.fopivot(&layout.overlay, &layout.rom)?;
    tracing::info!("switched to extroot");

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

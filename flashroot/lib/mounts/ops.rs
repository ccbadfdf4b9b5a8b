use std::path::{Path, PathBuf};

use nix::mount::MsFlags;

use crate::FlashrootResult;

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Mount table queries and the mount operations used to swap the root overlay.
///
/// Query methods never change the system. Every other method is a mutating step that the caller
/// sequences; none of them is undone on a later failure.
pub trait MountOps {
    /// Returns true if the running kernel supports `fstype`.
    fn find_filesystem(&self, fstype: &str) -> bool;

    /// Returns where `device` is mounted, optionally only if mounted with type `fstype`.
    fn find_mount_point(&self, device: &Path, fstype: Option<&str>) -> Option<PathBuf>;

    /// Returns true if an overlay with mount source `tag` is mounted.
    fn find_overlay_mount(&self, tag: &str) -> bool;

    /// Mounts `source` on `target`.
    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> FlashrootResult<()>;

    /// Changes the flags of the mount at `target` in place. `MS_REMOUNT` is implied.
    fn remount(&self, target: &Path, flags: MsFlags) -> FlashrootResult<()>;

    /// Lazily detaches the mount at `target`.
    fn umount_detach(&self, target: &Path) -> FlashrootResult<()>;

    /// Makes `new_root` the root filesystem and puts the old root at `old_root` inside it.
    fn pivot(&self, new_root: &Path, old_root: &Path) -> FlashrootResult<()>;

    /// Moves the mount at `from` to `to`.
    fn move_mount(&self, from: &Path, to: &Path) -> FlashrootResult<()>;

    /// Stacks `rw_root` as the writable layer over the current root and pivots into the result,
    /// leaving the read-only root at `ro_root`.
    fn fopivot(&self, rw_root: &Path, ro_root: &Path) -> FlashrootResult<()>;

    /// Installs a tmpfs-backed overlay as the root.
    fn ramoverlay(&self) -> FlashrootResult<()>;

    /// Hands the internal overlay at `prefix` to `block extroot` and installs the external
    /// overlay it mounts.
    fn extroot(&self, prefix: &Path) -> FlashrootResult<()>;
}

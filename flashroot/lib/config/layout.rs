use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::defaults::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The well-known names, filesystem types and paths the overlay switch works with.
///
/// The defaults match the layout of an OpenWrt-style image. Every path is absolute; tests
/// relocate the whole layout under a scratch directory with [`Layout::rooted_at`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// The name of the persistent flash volume.
    pub volume_name: String,

    /// The filesystem type of the persistent volume.
    pub persistent_fstype: String,

    /// The overlay filesystem type.
    pub overlay_fstype: String,

    /// Where the RAM-backed writable layer lives.
    pub ram_root: PathBuf,

    /// Mount source identifying the RAM-backed overlay in the mount table.
    pub ram_overlay_tag: String,

    /// Mount source identifying the persistent overlay in the mount table.
    pub persistent_overlay_tag: String,

    /// Where the read-only root ends up after an overlay pivot.
    pub rom: PathBuf,

    /// Mount point for the persistent volume while it is being populated.
    pub rom_overlay: PathBuf,

    /// The live writable layer.
    pub overlay: PathBuf,

    /// Mount point for the persistent volume before it is moved into place.
    pub staging: PathBuf,

    /// Scratch mount point used while pivoting.
    pub pivot_scratch: PathBuf,

    /// The switch-in-progress marker.
    pub guard_file: PathBuf,

    /// The live root filesystem.
    pub root: PathBuf,

    /// Where `block extroot` leaves its mounts.
    pub extroot_dir: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Layout {
    /// Returns a copy of the default layout with every path moved under `base`.
    ///
    /// Mount tags are rewritten to match the relocated paths.
    pub fn rooted_at(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        let defaults = Layout::default();
        let relocate = |path: &Path| match path.strip_prefix("/") {
            Ok(rest) => base.join(rest),
            Err(_) => base.join(path),
        };

        let ram_root = relocate(&defaults.ram_root);
        let overlay = relocate(&defaults.overlay);

        Layout {
            ram_overlay_tag: overlay_tag(&ram_root),
            persistent_overlay_tag: overlay_tag(&overlay),
            rom: relocate(&defaults.rom),
            rom_overlay: relocate(&defaults.rom_overlay),
            staging: relocate(&defaults.staging),
            pivot_scratch: relocate(&defaults.pivot_scratch),
            guard_file: relocate(&defaults.guard_file),
            root: base.to_path_buf(),
            extroot_dir: relocate(&defaults.extroot_dir),
            ram_root,
            overlay,
            ..defaults
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the mount source used for an overlay whose writable layer lives at `rw_root`.
pub fn overlay_tag(rw_root: &Path) -> String {
    format!("overlayfs:{}", rw_root.display())
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for Layout {
    fn default() -> Self {
        Self {
            volume_name: DEFAULT_VOLUME_NAME.to_string(),
            persistent_fstype: DEFAULT_PERSISTENT_FSTYPE.to_string(),
            overlay_fstype: DEFAULT_OVERLAY_FSTYPE.to_string(),
            ram_root: PathBuf::from(DEFAULT_RAM_ROOT),
            ram_overlay_tag: DEFAULT_RAM_OVERLAY_TAG.to_string(),
            persistent_overlay_tag: DEFAULT_PERSISTENT_OVERLAY_TAG.to_string(),
            rom: PathBuf::from(DEFAULT_ROM),
            rom_overlay: PathBuf::from(DEFAULT_ROM_OVERLAY),
            overlay: PathBuf::from(DEFAULT_OVERLAY),
            staging: PathBuf::from(DEFAULT_STAGING),
            pivot_scratch: PathBuf::from(DEFAULT_PIVOT_SCRATCH),
            guard_file: PathBuf::from(DEFAULT_GUARD_FILE),
            root: PathBuf::from(DEFAULT_ROOT),
            extroot_dir: PathBuf::from(DEFAULT_EXTROOT_DIR),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

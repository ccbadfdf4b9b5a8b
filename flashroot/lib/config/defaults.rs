//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The name of the flash partition that holds persistent state.
pub const DEFAULT_VOLUME_NAME: &str = "rootfs_data";

/// The filesystem type of the persistent volume.
pub const DEFAULT_PERSISTENT_FSTYPE: &str = "jffs2";

/// The filesystem type used to stack the writable layer over the read-only root.
pub const DEFAULT_OVERLAY_FSTYPE: &str = "overlay";

/// Where the RAM-backed writable layer lives before the switch.
pub const DEFAULT_RAM_ROOT: &str = "/tmp/root";

/// The mount source of the overlay that uses the RAM-backed writable layer.
pub const DEFAULT_RAM_OVERLAY_TAG: &str = "overlayfs:/tmp/root";

/// The mount source of the overlay that uses the persistent volume.
pub const DEFAULT_PERSISTENT_OVERLAY_TAG: &str = "overlayfs:/overlay";

/// Where the read-only root ends up after an overlay pivot.
pub const DEFAULT_ROM: &str = "/rom";

/// Where the persistent volume is mounted while its contents are populated.
pub const DEFAULT_ROM_OVERLAY: &str = "/rom/overlay";

/// Where the live writable layer is mounted.
pub const DEFAULT_OVERLAY: &str = "/overlay";

/// Where the persistent volume is mounted before it is moved into place.
pub const DEFAULT_STAGING: &str = "/tmp/overlay";

/// Scratch mount point used while pivoting the root.
pub const DEFAULT_PIVOT_SCRATCH: &str = "/mnt";

/// Zero-length file that marks a switch in progress.
pub const DEFAULT_GUARD_FILE: &str = "/tmp/.switch_jffs2";

/// The live root filesystem.
pub const DEFAULT_ROOT: &str = "/";

/// Where `block extroot` mounts an external overlay.
pub const DEFAULT_EXTROOT_DIR: &str = "/tmp/extroot";

/// The configuration file read when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/flashroot.toml";

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV_VAR: &str = "FLASHROOT_CONFIG";

/// Environment variable overriding the volume name.
pub const VOLUME_ENV_VAR: &str = "FLASHROOT_VOLUME";

/// Environment variable setting the extroot prefix.
pub const EXTROOT_PREFIX_ENV_VAR: &str = "FLASHROOT_EXTROOT_PREFIX";

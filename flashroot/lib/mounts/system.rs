use std::{
    fs,
    path::{Path, PathBuf},
};

use nix::{
    mount::{mount, umount2, MntFlags, MsFlags},
    unistd::pivot_root,
};

use crate::{
    config::{overlay_tag, Layout},
    FlashrootError, FlashrootResult,
};

use super::{
    filesystem_listed, has_source, mount_point_of, parse_mounts, MountEntry, MountOps,
    PROC_FILESYSTEMS, PROC_MOUNTS,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Mounts that follow the root across a pivot.
const CARRIED_MOUNTS: [&str; 4] = ["/dev", "/tmp", "/sys", "/overlay"];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The [`MountOps`] of the running kernel.
#[derive(Debug, Clone)]
pub struct SystemMounts {
    layout: Layout,
    proc_mounts: PathBuf,
    proc_filesystems: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SystemMounts {
    /// Creates mount operations for `layout`, reading the kernel's tables from `/proc`.
    pub fn new(layout: Layout) -> Self {
        Self::with_tables(layout, PROC_MOUNTS, PROC_FILESYSTEMS)
    }

    /// Creates mount operations that read the mount table and filesystem list from other files.
    pub fn with_tables(
        layout: Layout,
        proc_mounts: impl Into<PathBuf>,
        proc_filesystems: impl Into<PathBuf>,
    ) -> Self {
        Self {
            layout,
            proc_mounts: proc_mounts.into(),
            proc_filesystems: proc_filesystems.into(),
        }
    }

    /// Returns the layout these operations were created for.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Reads the current mount table. An unreadable table is treated as empty.
    pub fn mount_table(&self) -> Vec<MountEntry> {
        match fs::read_to_string(&self.proc_mounts) {
            Ok(contents) => parse_mounts(&contents),
            Err(e) => {
                tracing::warn!("failed to read {}: {e}", self.proc_mounts.display());
                Vec::new()
            }
        }
    }

    /// Moves `old_root + dir` to `new_root + dir`.
    fn carry(&self, old_root: &Path, new_root: &Path, dir: &str) -> FlashrootResult<()> {
        self.move_mount(&join_abs(old_root, dir), &join_abs(new_root, dir))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Joins an absolute `path` under `base` the way a string concatenation would.
///
/// An empty `base` leaves `path` unchanged.
pub(crate) fn join_abs(base: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let relative = path.strip_prefix("/").unwrap_or(path);
    if base.as_os_str().is_empty() {
        Path::new("/").join(relative)
    } else if relative.as_os_str().is_empty() {
        base.to_path_buf()
    } else {
        base.join(relative)
    }
}

/// Builds the `mount(2)` data string for an overlay whose writable layer is `rw_root`.
pub fn overlay_options(rw_root: &Path) -> String {
    format!(
        "lowerdir=/,upperdir={},workdir={}",
        rw_root.join("upper").display(),
        rw_root.join("work").display()
    )
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl MountOps for SystemMounts {
    fn find_filesystem(&self, fstype: &str) -> bool {
        match fs::read_to_string(&self.proc_filesystems) {
            Ok(contents) => filesystem_listed(&contents, fstype),
            Err(e) => {
                tracing::warn!("failed to read {}: {e}", self.proc_filesystems.display());
                false
            }
        }
    }

    fn find_mount_point(&self, device: &Path, fstype: Option<&str>) -> Option<PathBuf> {
        mount_point_of(&self.mount_table(), device, fstype)
    }

    fn find_overlay_mount(&self, tag: &str) -> bool {
        has_source(&self.mount_table(), tag)
    }

    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> FlashrootResult<()> {
        tracing::debug!(
            "mount {} on {} type {} flags {:?}",
            source.display(),
            target.display(),
            fstype.unwrap_or("none"),
            flags
        );

        mount(Some(source), target, fstype, flags, data).map_err(FlashrootError::at("mount", target))
    }

    fn remount(&self, target: &Path, flags: MsFlags) -> FlashrootResult<()> {
        tracing::debug!("remount {} flags {:?}", target.display(), flags);
        mount(
            None::<&str>,
            target,
            None::<&str>,
            flags | MsFlags::MS_REMOUNT,
            None::<&str>,
        )
        .map_err(FlashrootError::at("remount", target))
    }

    fn umount_detach(&self, target: &Path) -> FlashrootResult<()> {
        tracing::debug!("detach {}", target.display());
        umount2(target, MntFlags::MNT_DETACH).map_err(FlashrootError::at("umount", target))
    }

    fn pivot(&self, new_root: &Path, old_root: &Path) -> FlashrootResult<()> {
        self.carry(Path::new(""), new_root, "/proc")?;

        let put_old = join_abs(new_root, old_root);
        tracing::info!("pivot {} {}", new_root.display(), put_old.display());
        pivot_root(new_root, &put_old).map_err(FlashrootError::at("pivot_root", new_root))?;

        for dir in CARRIED_MOUNTS {
            if let Err(e) = self.carry(old_root, Path::new(""), dir) {
                tracing::debug!("{dir} not carried over: {e}");
            }
        }

        Ok(())
    }

    fn move_mount(&self, from: &Path, to: &Path) -> FlashrootResult<()> {
        tracing::debug!("move {} to {}", from.display(), to.display());
        mount(
            Some(from),
            to,
            None::<&str>,
            MsFlags::MS_NOATIME | MsFlags::MS_MOVE,
            None::<&str>,
        )
        .map_err(FlashrootError::at("move", to))
    }

    fn fopivot(&self, rw_root: &Path, ro_root: &Path) -> FlashrootResult<()> {
        for layer in ["upper", "work"] {
            let dir = rw_root.join(layer);
            fs::create_dir_all(&dir).map_err(FlashrootError::at("mkdir", &dir))?;
        }

        let scratch = &self.layout.pivot_scratch;
        let source = overlay_tag(rw_root);
        let options = overlay_options(rw_root);

        tracing::info!("mounting {source} on {}", scratch.display());
        self.mount(
            Path::new(&source),
            scratch,
            Some(self.layout.overlay_fstype.as_str()),
            MsFlags::MS_NOATIME,
            Some(options.as_str()),
        )?;

        self.pivot(scratch, ro_root)
    }

    fn ramoverlay(&self) -> FlashrootResult<()> {
        let ram_root = &self.layout.ram_root;
        fs::create_dir_all(ram_root).map_err(FlashrootError::at("mkdir", ram_root))?;

        tracing::info!("mounting tmpfs overlay at {}", ram_root.display());
        self.mount(
            Path::new("tmpfs"),
            ram_root,
            Some("tmpfs"),
            MsFlags::MS_NOATIME,
            Some("mode=0755"),
        )?;

        self.fopivot(ram_root, &self.layout.rom)
    }

    fn extroot(&self, prefix: &Path) -> FlashrootResult<()> {
        super::extroot::run_extroot(self, prefix)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

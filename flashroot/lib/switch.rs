//! Moving the live root from the RAM-backed overlay onto the persistent volume.
//!
//! The switch runs once the system has booted on a tmpfs overlay. Depending on what the
//! persistent volume holds it either adopts the existing filesystem directly, or formats it by
//! mounting, copies the RAM layer onto it and pivots so the RAM layer can be released.
//!
//! Each step is a blocking syscall. A failing step aborts the remainder and nothing already done
//! is rolled back.

use std::{
    fs::{self, OpenOptions},
    io,
    os::unix::fs::OpenOptionsExt,
};

use nix::mount::MsFlags;

use crate::{
    config::{Layout, SwitchConfig},
    mounts::MountOps,
    rootfs::copy_tree,
    volume::{require, FsState, Volume, VolumeManager},
    whiteout::{Reconcile, ReconcileReport, WhiteoutReconciler},
    FlashrootError, FlashrootResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Drives the switch from the RAM-backed overlay to the persistent overlay.
pub struct SwitchOrchestrator<'a> {
    volumes: &'a dyn VolumeManager,
    mounts: &'a dyn MountOps,
    layout: &'a Layout,
    config: &'a SwitchConfig,
    reconciler: Box<dyn Reconcile + 'a>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<'a> SwitchOrchestrator<'a> {
    /// Creates an orchestrator that reconciles whiteouts against `layout.root`.
    pub fn new(
        volumes: &'a dyn VolumeManager,
        mounts: &'a dyn MountOps,
        layout: &'a Layout,
        config: &'a SwitchConfig,
    ) -> Self {
        Self {
            volumes,
            mounts,
            layout,
            config,
            reconciler: Box::new(WhiteoutReconciler::new(&layout.root)),
        }
    }

    /// Replaces the whiteout reconciler.
    pub fn with_reconciler(mut self, reconciler: impl Reconcile + 'a) -> Self {
        self.reconciler = Box::new(reconciler);
        self
    }

    /// Makes the persistent volume the writable layer of the root.
    ///
    /// Fails without touching anything if the persistent overlay is already mounted, if the
    /// RAM-backed overlay is not, if the kernel lacks overlay support, or if the volume is
    /// missing or already mounted.
    pub fn switch_to_persistent_overlay(&self) -> FlashrootResult<()> {
        self.check_preconditions()?;

        let volume = require(self.volumes, &self.layout.volume_name)?;
        if let Some(mount_point) = self.mounts.find_mount_point(volume.get_block_path(), None) {
            return Err(FlashrootError::Precondition(format!(
                "{}:{} is already mounted as {}",
                volume.get_name(),
                volume.get_block_path().display(),
                mount_point.display()
            )));
        }

        match self.volumes.identify(&volume)? {
            state @ (FsState::None | FsState::Deadcode) => {
                if state == FsState::None {
                    tracing::warn!("no {} marker found", self.layout.persistent_fstype);
                }
                self.reformat_and_adopt(&volume).map(|_| ())
            }
            FsState::Persistent => {
                stage(self.volumes, self.mounts, self.layout, &volume)?;
                install_staged(self.mounts, self.layout)
            }
        }
    }

    /// Formats the volume by mounting it, copies the RAM layer onto it and pivots onto it.
    ///
    /// The reconciler runs exactly once, after the new overlay is live.
    pub fn reformat_and_adopt(&self, volume: &Volume) -> FlashrootResult<ReconcileReport> {
        let layout = self.layout;

        self.mount_guarded(volume)?;

        tracing::info!("remounting {} read-only", layout.root.display());
        self.mounts
            .remount(&layout.root, MsFlags::MS_RDONLY | MsFlags::MS_NOATIME)?;

        match copy_tree(&layout.ram_root, &layout.rom_overlay) {
            Ok(stats) => tracing::info!(
                "copied {} files from {} to {}",
                stats.files,
                layout.ram_root.display(),
                layout.rom_overlay.display()
            ),
            Err(e) if self.config.strict_copy => {
                tracing::error!("copying the ram overlay failed: {e}");
                return Err(e);
            }
            Err(e) => tracing::warn!("copying the ram overlay failed, continuing: {e}"),
        }

        self.mounts.pivot(&layout.rom, &layout.pivot_scratch)?;
        self.mounts.move_mount(&layout.pivot_scratch, &layout.ram_root)?;
        self.mounts.fopivot(&layout.overlay, &layout.rom)?;

        tracing::info!("releasing {}", layout.ram_root.display());
        if let Err(e) = self.mounts.umount_detach(&layout.ram_root) {
            tracing::warn!("{e}");
        }

        Ok(self.reconciler.reconcile(&layout.overlay))
    }

    fn check_preconditions(&self) -> FlashrootResult<()> {
        let layout = self.layout;

        if self.mounts.find_overlay_mount(&layout.persistent_overlay_tag) {
            return Err(FlashrootError::Precondition(format!(
                "{} is already mounted",
                layout.persistent_overlay_tag
            )));
        }

        if !self.mounts.find_overlay_mount(&layout.ram_overlay_tag) {
            return Err(FlashrootError::Precondition(format!(
                "{} is not mounted",
                layout.ram_overlay_tag
            )));
        }

        if !self.mounts.find_filesystem(&layout.overlay_fstype) {
            return Err(FlashrootError::Precondition(format!(
                "{} filesystem not found",
                layout.overlay_fstype
            )));
        }

        Ok(())
    }

    /// Mounts the volume at `rom_overlay` while the guard file exists.
    fn mount_guarded(&self, volume: &Volume) -> FlashrootResult<()> {
        let guard_file = &self.layout.guard_file;
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(guard_file)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => FlashrootError::Precondition(format!(
                    "{} switch already running",
                    self.layout.persistent_fstype
                )),
                _ => FlashrootError::syscall("create", guard_file, e),
            })?;

        let guard = scopeguard::guard(guard_file, |path| {
            if let Err(e) = fs::remove_file(path) {
                tracing::warn!("failed to remove {}: {e}", path.display());
            }
        });

        tracing::info!(
            "mounting {} on {}",
            volume.get_block_path().display(),
            self.layout.rom_overlay.display()
        );
        let mounted = self.mounts.mount(
            volume.get_block_path(),
            &self.layout.rom_overlay,
            Some(self.layout.persistent_fstype.as_str()),
            MsFlags::MS_NOATIME,
            None,
        );
        drop(guard);

        mounted
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Mounts the persistent volume at `staging` and prepares it for use.
pub fn stage(
    volumes: &dyn VolumeManager,
    mounts: &dyn MountOps,
    layout: &Layout,
    volume: &Volume,
) -> FlashrootResult<()> {
    let staging = &layout.staging;
    fs::create_dir_all(staging).map_err(FlashrootError::at("mkdir", staging))?;

    tracing::info!(
        "mounting {} on {}",
        volume.get_block_path().display(),
        staging.display()
    );
    mounts.mount(
        volume.get_block_path(),
        staging,
        Some(layout.persistent_fstype.as_str()),
        MsFlags::MS_NOATIME,
        None,
    )?;

    volumes.init(volume)
}

/// Moves the staged volume to `overlay` and pivots onto an overlay backed by it.
pub fn install_staged(mounts: &dyn MountOps, layout: &Layout) -> FlashrootResult<()> {
    mounts.move_mount(&layout.staging, &layout.overlay)?;
    mounts.fopivot(&layout.overlay, &layout.rom)?;
    tracing::info!("switched to {}", layout.persistent_overlay_tag);
    Ok(())
}

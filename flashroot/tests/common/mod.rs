#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    rc::Rc,
};

use flashroot::{
    config::Layout,
    mounts::MountOps,
    reset::ConfirmationGate,
    volume::{FsState, Volume, VolumeManager},
    whiteout::{Reconcile, ReconcileReport},
    FlashrootError, FlashrootResult,
};
use nix::mount::MsFlags;
use tempfile::TempDir;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A mutating call seen by one of the fakes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Mount {
        source: PathBuf,
        target: PathBuf,
        fstype: Option<String>,
    },
    Remount {
        target: PathBuf,
        flags: MsFlags,
    },
    Detach(PathBuf),
    Pivot {
        new_root: PathBuf,
        old_root: PathBuf,
    },
    Move {
        from: PathBuf,
        to: PathBuf,
    },
    Fopivot {
        rw_root: PathBuf,
        ro_root: PathBuf,
    },
    RamOverlay,
    Extroot(PathBuf),
    Init,
    Erase,
    Reconcile(PathBuf),
}

/// An event together with whether the probe path existed when it happened.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub event: Event,
    pub probe_present: bool,
}

/// The shared call log.
#[derive(Debug, Clone, Default)]
pub struct Log {
    entries: Rc<RefCell<Vec<Recorded>>>,
    probe: Rc<RefCell<Option<PathBuf>>>,
}

/// A [`MountOps`] that records calls instead of performing them.
pub struct RecordingMounts {
    log: Log,
    filesystems: Vec<String>,
    overlays: Vec<String>,
    mount_points: HashMap<PathBuf, (PathBuf, String)>,
    failing: Vec<&'static str>,
}

/// A [`VolumeManager`] with a single volume in a fixed state.
pub struct FakeVolumes {
    log: Log,
    volume: Option<Volume>,
    state: FsState,
    pub init_calls: Cell<usize>,
    pub erase_calls: Cell<usize>,
}

/// A [`Reconcile`] that only records that it ran.
pub struct CountingReconciler {
    log: Log,
}

/// A [`ConfirmationGate`] with a fixed answer.
pub struct FixedAnswer(pub bool);

/// A scratch directory with a relocated layout.
pub struct Scratch {
    pub dir: TempDir,
    pub layout: Layout,
    pub log: Log,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Log {
    /// Records whether `probe` exists at every subsequent event.
    pub fn watch(&self, probe: impl Into<PathBuf>) {
        *self.probe.borrow_mut() = Some(probe.into());
    }

    pub fn push(&self, event: Event) {
        let probe_present = self
            .probe
            .borrow()
            .as_ref()
            .is_some_and(|probe| probe.exists());
        self.entries.borrow_mut().push(Recorded {
            event,
            probe_present,
        });
    }

    pub fn events(&self) -> Vec<Event> {
        self.entries
            .borrow()
            .iter()
            .map(|recorded| recorded.event.clone())
            .collect()
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.entries.borrow().clone()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|recorded| matches(&recorded.event))
            .count()
    }

    pub fn position(&self, matches: impl Fn(&Event) -> bool) -> Option<usize> {
        self.entries
            .borrow()
            .iter()
            .position(|recorded| matches(&recorded.event))
    }
}

impl RecordingMounts {
    /// A system booted on the RAM overlay with overlay support.
    pub fn booted_on_ram(log: &Log, layout: &Layout) -> Self {
        Self {
            log: log.clone(),
            filesystems: vec![layout.overlay_fstype.clone(), layout.persistent_fstype.clone()],
            overlays: vec![layout.ram_overlay_tag.clone()],
            mount_points: HashMap::new(),
            failing: Vec::new(),
        }
    }

    /// A system with nothing mounted yet.
    pub fn early_boot(log: &Log, layout: &Layout) -> Self {
        Self {
            overlays: Vec::new(),
            ..Self::booted_on_ram(log, layout)
        }
    }

    pub fn with_overlay(mut self, tag: impl Into<String>) -> Self {
        self.overlays.push(tag.into());
        self
    }

    pub fn without_filesystems(mut self) -> Self {
        self.filesystems.clear();
        self
    }

    pub fn with_mount_point(
        mut self,
        device: impl Into<PathBuf>,
        mount_point: impl Into<PathBuf>,
        fstype: impl Into<String>,
    ) -> Self {
        self.mount_points
            .insert(device.into(), (mount_point.into(), fstype.into()));
        self
    }

    /// Makes every call of the named operation fail after it is recorded.
    pub fn failing(mut self, op: &'static str) -> Self {
        self.failing.push(op);
        self
    }

    fn outcome(&self, op: &'static str, path: &Path) -> FlashrootResult<()> {
        if self.failing.contains(&op) {
            Err(FlashrootError::syscall(
                op,
                path,
                io::Error::from_raw_os_error(libc::EBUSY),
            ))
        } else {
            Ok(())
        }
    }
}

impl FakeVolumes {
    pub fn new(log: &Log, volume: Volume, state: FsState) -> Self {
        Self {
            log: log.clone(),
            volume: Some(volume),
            state,
            init_calls: Cell::new(0),
            erase_calls: Cell::new(0),
        }
    }

    pub fn empty(log: &Log) -> Self {
        Self {
            log: log.clone(),
            volume: None,
            state: FsState::None,
            init_calls: Cell::new(0),
            erase_calls: Cell::new(0),
        }
    }
}

impl CountingReconciler {
    pub fn new(log: &Log) -> Self {
        Self { log: log.clone() }
    }
}

impl Scratch {
    /// Creates a scratch layout with a populated RAM overlay.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::rooted_at(dir.path());

        fs::create_dir_all(layout.ram_root.join("upper/etc/config")).expect("ram upper");
        fs::create_dir_all(layout.ram_root.join("work")).expect("ram work");
        fs::write(
            layout.ram_root.join("upper/etc/config/system"),
            "config system\n",
        )
        .expect("ram file");
        fs::create_dir_all(&layout.rom_overlay).expect("rom overlay");
        fs::create_dir_all(&layout.overlay).expect("overlay");

        Self {
            dir,
            layout,
            log: Log::default(),
        }
    }

    pub fn volume(&self) -> Volume {
        Volume::builder()
            .name(self.layout.volume_name.clone())
            .block_path(self.dir.path().join("dev/mtdblock5"))
            .char_path(self.dir.path().join("dev/mtd5"))
            .index(5)
            .size(0x48_0000)
            .erase_size(0x1_0000)
            .build()
    }

    /// The file the switch must have copied onto flash.
    pub fn copied_file(&self) -> PathBuf {
        self.layout.rom_overlay.join("upper/etc/config/system")
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl MountOps for RecordingMounts {
    fn find_filesystem(&self, fstype: &str) -> bool {
        self.filesystems.iter().any(|name| name == fstype)
    }

    fn find_mount_point(&self, device: &Path, fstype: Option<&str>) -> Option<PathBuf> {
        self.mount_points
            .get(device)
            .filter(|(_, mounted_as)| fstype.map_or(true, |fstype| fstype == mounted_as))
            .map(|(mount_point, _)| mount_point.clone())
    }

    fn find_overlay_mount(&self, tag: &str) -> bool {
        self.overlays.iter().any(|overlay| overlay == tag)
    }

    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fstype: Option<&str>,
        _: MsFlags,
        _: Option<&str>,
    ) -> FlashrootResult<()> {
        self.log.push(Event::Mount {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            fstype: fstype.map(str::to_string),
        });
        self.outcome("mount", target)
    }

    fn remount(&self, target: &Path, flags: MsFlags) -> FlashrootResult<()> {
        self.log.push(Event::Remount {
            target: target.to_path_buf(),
            flags,
        });
        self.outcome("remount", target)
    }

    fn umount_detach(&self, target: &Path) -> FlashrootResult<()> {
        self.log.push(Event::Detach(target.to_path_buf()));
        self.outcome("detach", target)
    }

    fn pivot(&self, new_root: &Path, old_root: &Path) -> FlashrootResult<()> {
        self.log.push(Event::Pivot {
            new_root: new_root.to_path_buf(),
            old_root: old_root.to_path_buf(),
        });
        self.outcome("pivot", new_root)
    }

    fn move_mount(&self, from: &Path, to: &Path) -> FlashrootResult<()> {
        self.log.push(Event::Move {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        });
        self.outcome("move", to)
    }

    fn fopivot(&self, rw_root: &Path, ro_root: &Path) -> FlashrootResult<()> {
        self.log.push(Event::Fopivot {
            rw_root: rw_root.to_path_buf(),
            ro_root: ro_root.to_path_buf(),
        });
        self.outcome("fopivot", rw_root)
    }

    fn ramoverlay(&self) -> FlashrootResult<()> {
        self.log.push(Event::RamOverlay);
        self.outcome("ramoverlay", Path::new("/tmp/root"))
    }

    fn extroot(&self, prefix: &Path) -> FlashrootResult<()> {
        self.log.push(Event::Extroot(prefix.to_path_buf()));
        self.outcome("extroot", prefix)
    }
}

impl VolumeManager for FakeVolumes {
    fn find(&self, name: &str) -> Option<Volume> {
        self.volume
            .as_ref()
            .filter(|volume| volume.get_name() == name)
            .cloned()
    }

    fn identify(&self, _: &Volume) -> FlashrootResult<FsState> {
        Ok(self.state)
    }

    fn init(&self, _: &Volume) -> FlashrootResult<()> {
        self.init_calls.set(self.init_calls.get() + 1);
        self.log.push(Event::Init);
        Ok(())
    }

    fn erase_all(&self, _: &Volume) -> FlashrootResult<()> {
        self.erase_calls.set(self.erase_calls.get() + 1);
        self.log.push(Event::Erase);
        Ok(())
    }
}

impl Reconcile for CountingReconciler {
    fn reconcile(&self, root: &Path) -> ReconcileReport {
        self.log.push(Event::Reconcile(root.to_path_buf()));
        ReconcileReport::default()
    }
}

impl ConfirmationGate for FixedAnswer {
    fn confirm(&self, _: &str) -> FlashrootResult<bool> {
        Ok(self.0)
    }
}

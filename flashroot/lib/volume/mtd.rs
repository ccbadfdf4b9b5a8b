use std::{
    fs::{self, File, OpenOptions},
    os::fd::AsRawFd,
    path::PathBuf,
};

use crate::{FlashrootError, FlashrootResult};

use super::{inspect, FsState, Volume, VolumeManager};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Where the kernel lists MTD partitions.
pub const PROC_MTD: &str = "/proc/mtd";

/// Where MTD device nodes live.
pub const DEV_DIR: &str = "/dev";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One line of `/proc/mtd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtdPartition {
    /// The `N` in `mtdN`.
    pub index: u32,

    /// Partition size in bytes.
    pub size: u64,

    /// Erase block size in bytes.
    pub erase_size: u64,

    /// Partition name.
    pub name: String,
}

/// A [`VolumeManager`] over the MTD partitions the kernel exposes.
#[derive(Debug, Clone)]
pub struct MtdVolumes {
    proc_mtd: PathBuf,
    dev_dir: PathBuf,
}

/// `struct erase_info_user` from `<mtd/mtd-abi.h>`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct EraseInfoUser {
    start: u32,
    length: u32,
}

/// `struct mtd_info_user` from `<mtd/mtd-abi.h>`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct MtdInfoUser {
    kind: u8,
    flags: u32,
    size: u32,
    erase_size: u32,
    write_size: u32,
    oob_size: u32,
    #[allow(dead_code)]
    padding: u64,
}

mod ioctl {
    use super::{EraseInfoUser, MtdInfoUser};

    nix::ioctl_read!(mem_get_info, b'M', 1, MtdInfoUser);
    nix::ioctl_write_ptr!(mem_erase, b'M', 2, EraseInfoUser);
    nix::ioctl_write_ptr!(mem_unlock, b'M', 6, EraseInfoUser);
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MtdVolumes {
    /// Creates a manager reading `/proc/mtd` and `/dev`.
    pub fn new() -> Self {
        Self::with_paths(PROC_MTD, DEV_DIR)
    }

    /// Creates a manager reading the partition table and device nodes from other locations.
    pub fn with_paths(proc_mtd: impl Into<PathBuf>, dev_dir: impl Into<PathBuf>) -> Self {
        Self {
            proc_mtd: proc_mtd.into(),
            dev_dir: dev_dir.into(),
        }
    }

    fn volume(&self, partition: &MtdPartition) -> Volume {
        Volume::builder()
            .name(partition.name.clone())
            .block_path(self.dev_dir.join(format!("mtdblock{}", partition.index)))
            .char_path(self.dev_dir.join(format!("mtd{}", partition.index)))
            .index(partition.index)
            .size(partition.size)
            .erase_size(partition.erase_size)
            .build()
    }

    fn open_raw(&self, volume: &Volume) -> FlashrootResult<(PathBuf, File)> {
        let path = volume.get_char_path().clone().ok_or_else(|| {
            FlashrootError::Lookup(format!("{} has no raw device", volume.get_name()))
        })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(FlashrootError::at("open", &path))?;

        Ok((path, file))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Parses the contents of `/proc/mtd`.
///
/// ```text
/// dev:    size   erasesize  name
/// mtd5: 00480000 00010000 "rootfs_data"
/// ```
///
/// Lines that do not match the format are skipped.
pub fn parse_proc_mtd(contents: &str) -> Vec<MtdPartition> {
    contents.lines().filter_map(parse_mtd_line).collect()
}

fn parse_mtd_line(line: &str) -> Option<MtdPartition> {
    let (dev, rest) = line.split_once(':')?;
    let index = dev.trim().strip_prefix("mtd")?.parse().ok()?;

    let mut fields = rest.trim().splitn(3, char::is_whitespace);
    let size = u64::from_str_radix(fields.next()?, 16).ok()?;
    let erase_size = u64::from_str_radix(fields.next()?.trim(), 16).ok()?;
    let name = fields.next()?.trim().trim_matches('"').to_string();

    Some(MtdPartition {
        index,
        size,
        erase_size,
        name,
    })
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for MtdVolumes {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeManager for MtdVolumes {
    fn find(&self, name: &str) -> Option<Volume> {
        let contents = match fs::read_to_string(&self.proc_mtd) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!("failed to read {}: {e}", self.proc_mtd.display());
                return None;
            }
        };

        parse_proc_mtd(&contents)
            .iter()
            .find(|partition| partition.name == name)
            .map(|partition| self.volume(partition))
    }

    fn identify(&self, volume: &Volume) -> FlashrootResult<FsState> {
        inspect(volume.get_block_path())
    }

    fn init(&self, volume: &Volume) -> FlashrootResult<()> {
        let (path, file) = self.open_raw(volume)?;

        let mut info = MtdInfoUser::default();
        unsafe { ioctl::mem_get_info(file.as_raw_fd(), &mut info) }
            .map_err(FlashrootError::at("MEMGETINFO", &path))?;

        tracing::debug!(
            "{}: type {} flags {:#x} size {:#x} erasesize {:#x} writesize {:#x} oobsize {:#x}",
            path.display(),
            info.kind,
            info.flags,
            info.size,
            info.erase_size,
            info.write_size,
            info.oob_size
        );

        let unlock = EraseInfoUser {
            start: 0,
            length: info.size,
        };

        // Not every flash supports locking.
        if let Err(e) = unsafe { ioctl::mem_unlock(file.as_raw_fd(), &unlock) } {
            tracing::debug!("MEMUNLOCK {} not applied: {e}", path.display());
        }

        Ok(())
    }

    fn erase_all(&self, volume: &Volume) -> FlashrootResult<()> {
        let (path, file) = self.open_raw(volume)?;
        let erase_size = volume.get_erase_size();
        if erase_size == 0 {
            return Err(FlashrootError::Precondition(format!(
                "{} reports a zero erase size",
                path.display()
            )));
        }

        let mut failed = 0;
        let mut offset = 0;
        while offset < volume.get_size() {
            let block = EraseInfoUser {
                start: offset as u32,
                length: erase_size as u32,
            };

            if let Err(e) = unsafe { ioctl::mem_erase(file.as_raw_fd(), &block) } {
                tracing::error!("failed to erase block at {offset:#x}: {e}");
                failed += 1;
            }

            offset += erase_size;
        }

        if failed > 0 {
            return Err(FlashrootError::syscall(
                format!("MEMERASE ({failed} blocks)"),
                &path,
                std::io::Error::other("erase incomplete"),
            ));
        }

        tracing::info!("erased {} ({:#x} bytes)", path.display(), volume.get_size());
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

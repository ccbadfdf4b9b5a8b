use std::{
    collections::HashMap,
    fs::{self, Permissions},
    os::unix::fs::{lchown, symlink, FileTypeExt, MetadataExt, PermissionsExt},
    path::{Path, PathBuf},
};

use nix::{
    sys::stat::{mknod, Mode, SFlag},
    unistd::mkfifo,
};
use walkdir::WalkDir;

use crate::{FlashrootError, FlashrootResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What [`copy_tree`] created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyStats {
    /// Directories created or reused.
    pub directories: usize,

    /// Regular files copied.
    pub files: usize,

    /// Additional names for files already copied.
    pub hard_links: usize,

    /// Symbolic links recreated.
    pub symlinks: usize,

    /// FIFOs and device nodes recreated.
    pub special: usize,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Copies everything inside `source_dir` into `dest_dir`, preserving file types, modes,
/// ownership and hard links.
///
/// Symlinks are recreated rather than followed. Existing files in `dest_dir` are overwritten.
/// Directory modes are applied last so that read-only directories can still be populated.
///
/// Ownership is applied when permitted; failing to change it is not an error.
pub fn copy_tree(
    source_dir: impl AsRef<Path>,
    dest_dir: impl AsRef<Path>,
) -> FlashrootResult<CopyStats> {
    let source_dir = source_dir.as_ref();
    let dest_dir = dest_dir.as_ref();

    let mut stats = CopyStats::default();
    let mut linked: HashMap<(u64, u64), PathBuf> = HashMap::new();
    let mut directories = Vec::new();

    fs::create_dir_all(dest_dir).map_err(FlashrootError::at("mkdir", dest_dir))?;

    for entry in WalkDir::new(source_dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source_dir).to_path_buf();
            FlashrootError::syscall("walk", path, e)
        })?;

        let source_path = entry.path();
        let relative = source_path
            .strip_prefix(source_dir)
            .map_err(FlashrootError::custom)?;
        let target_path = dest_dir.join(relative);

        let metadata = entry
            .metadata()
            .map_err(|e| FlashrootError::syscall("stat", source_path, e))?;
        let file_type = metadata.file_type();

        if file_type.is_dir() {
            tracing::trace!("mkdir {}", target_path.display());
            fs::create_dir_all(&target_path).map_err(FlashrootError::at("mkdir", &target_path))?;
            directories.push((target_path.clone(), metadata.mode()));
            stats.directories += 1;
        } else if file_type.is_symlink() {
            let link_target =
                fs::read_link(source_path).map_err(FlashrootError::at("readlink", source_path))?;
            remove_existing(&target_path)?;
            symlink(&link_target, &target_path).map_err(FlashrootError::at("symlink", &target_path))?;
            stats.symlinks += 1;
        } else if file_type.is_file() {
            let key = (metadata.dev(), metadata.ino());
            if metadata.nlink() > 1 {
                if let Some(first) = linked.get(&key) {
                    remove_existing(&target_path)?;
                    fs::hard_link(first, &target_path).map_err(FlashrootError::at("link", &target_path))?;
                    stats.hard_links += 1;
                    continue;
                }
                linked.insert(key, target_path.clone());
            }

            tracing::trace!("copy {}", source_path.display());
            fs::copy(source_path, &target_path).map_err(FlashrootError::at("copy", &target_path))?;
            apply_mode(&target_path, metadata.mode())?;
            stats.files += 1;
        } else {
            remove_existing(&target_path)?;
            create_special(&target_path, &metadata)?;
            stats.special += 1;
        }

        if let Err(e) = lchown(&target_path, Some(metadata.uid()), Some(metadata.gid())) {
            tracing::trace!("ownership of {} not preserved: {e}", target_path.display());
        }
    }

    // Deepest first so a read-only parent does not block its children.
    for (path, mode) in directories.iter().rev() {
        apply_mode(path, *mode)?;
    }

    tracing::debug!(
        "copied {} into {}: {stats:?}",
        source_dir.display(),
        dest_dir.display()
    );

    Ok(stats)
}

fn create_special(target_path: &Path, metadata: &fs::Metadata) -> FlashrootResult<()> {
    let file_type = metadata.file_type();
    let mode = Mode::from_bits_truncate(metadata.mode() & 0o7777);

    if file_type.is_fifo() {
        tracing::trace!("mkfifo {}", target_path.display());
        mkfifo(target_path, mode).map_err(FlashrootError::at("mkfifo", target_path))
    } else {
        let kind = if file_type.is_char_device() {
            SFlag::S_IFCHR
        } else if file_type.is_block_device() {
            SFlag::S_IFBLK
        } else {
            tracing::warn!("skipping socket {}", target_path.display());
            return Ok(());
        };

        tracing::trace!("mknod {}", target_path.display());
        mknod(target_path, kind, mode, metadata.rdev()).map_err(FlashrootError::at("mknod", target_path))
    }
}

fn apply_mode(path: &Path, mode: u32) -> FlashrootResult<()> {
    fs::set_permissions(path, Permissions::from_mode(mode & 0o7777))
        .map_err(FlashrootError::at("chmod", path))
}

fn remove_existing(path: &Path) -> FlashrootResult<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => {
            fs::remove_dir_all(path).map_err(FlashrootError::at("rmdir", path))
        }
        Ok(_) => fs::remove_file(path).map_err(FlashrootError::at("unlink", path)),
        Err(_) => Ok(()),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

use std::path::{Path, PathBuf};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The kernel's mount table.
pub const PROC_MOUNTS: &str = "/proc/mounts";

/// The filesystems the kernel supports.
pub const PROC_FILESYSTEMS: &str = "/proc/filesystems";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One line of `/proc/mounts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// The mount source, e.g. `/dev/mtdblock5` or `overlayfs:/tmp/root`.
    pub source: String,

    /// Where it is mounted.
    pub target: PathBuf,

    /// The filesystem type.
    pub fstype: String,

    /// The comma separated mount options.
    pub options: String,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Parses the contents of `/proc/mounts`, decoding the octal escapes the kernel uses for
/// whitespace and backslashes.
pub fn parse_mounts(contents: &str) -> Vec<MountEntry> {
    contents
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some(MountEntry {
                source: unescape(fields.next()?),
                target: PathBuf::from(unescape(fields.next()?)),
                fstype: fields.next()?.to_string(),
                options: fields.next().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// Returns true if `fstype` is listed in the contents of `/proc/filesystems`.
pub fn filesystem_listed(contents: &str, fstype: &str) -> bool {
    contents
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .any(|name| name == fstype)
}

/// Finds the first mount of `device`, optionally restricted to `fstype`.
pub fn mount_point_of(
    entries: &[MountEntry],
    device: &Path,
    fstype: Option<&str>,
) -> Option<PathBuf> {
    entries
        .iter()
        .find(|entry| {
            Path::new(&entry.source) == device
                && fstype.map_or(true, |fstype| entry.fstype == fstype)
        })
        .map(|entry| entry.target.clone())
}

/// Returns true if any mount has `tag` as its source.
pub fn has_source(entries: &[MountEntry], tag: &str) -> bool {
    entries.iter().any(|entry| entry.source == tag)
}

/// Returns true if anything is mounted exactly at `target`.
pub fn is_mounted_at(entries: &[MountEntry], target: &Path) -> bool {
    entries.iter().any(|entry| entry.target == target)
}

fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, digit| acc * 8 + u32::from(digit - b'0'));
            out.push(value as u8);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|digit| (b'0'..=b'7').contains(digit))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

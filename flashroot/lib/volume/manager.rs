use std::path::PathBuf;

use getset::{CopyGetters, Getters};
use typed_builder::TypedBuilder;

use crate::{FlashrootError, FlashrootResult};

use super::FsState;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A named persistent flash volume.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder, Getters, CopyGetters)]
pub struct Volume {
    /// The partition name, e.g. `rootfs_data`.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    name: String,

    /// The block device the filesystem is mounted from.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    block_path: PathBuf,

    /// The raw character device used for erase and unlock.
    #[builder(default, setter(into, strip_option))]
    #[getset(get = "pub with_prefix")]
    char_path: Option<PathBuf>,

    /// The partition index.
    #[builder(default)]
    #[getset(get_copy = "pub with_prefix")]
    index: u32,

    /// The partition size in bytes.
    #[builder(default)]
    #[getset(get_copy = "pub with_prefix")]
    size: u64,

    /// The erase block size in bytes.
    #[builder(default)]
    #[getset(get_copy = "pub with_prefix")]
    erase_size: u64,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Finds persistent volumes and performs raw operations on them.
pub trait VolumeManager {
    /// Looks up a volume by partition name.
    fn find(&self, name: &str) -> Option<Volume>;

    /// Reads the on-disk state of the volume.
    fn identify(&self, volume: &Volume) -> FlashrootResult<FsState>;

    /// Prepares a freshly mounted volume for use.
    fn init(&self, volume: &Volume) -> FlashrootResult<()>;

    /// Erases the whole volume, destroying its filesystem.
    fn erase_all(&self, volume: &Volume) -> FlashrootResult<()>;
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Looks up `name` and turns a missing volume into a [`FlashrootError::Lookup`].
pub fn require(volumes: &dyn VolumeManager, name: &str) -> FlashrootResult<Volume> {
    volumes
        .find(name)
        .ok_or_else(|| FlashrootError::Lookup(format!("no {name} volume was found")))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

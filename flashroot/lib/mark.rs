//! Forcing a reformat on the next switch.

use std::{
    fs::OpenOptions,
    io::Write,
    path::Path,
};

use crate::{
    config::Layout,
    volume::{require, VolumeManager, DEADCODE_MARKER, MARKER_LEN},
    FlashrootError, FlashrootResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Writes the reformat sentinel to the start of the persistent volume.
pub struct MarkerWriter<'a> {
    volumes: &'a dyn VolumeManager,
    layout: &'a Layout,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<'a> MarkerWriter<'a> {
    /// Creates a marker writer.
    pub fn new(volumes: &'a dyn VolumeManager, layout: &'a Layout) -> Self {
        Self { volumes, layout }
    }

    /// Overwrites the first bytes of the volume with [`DEADCODE_MARKER`].
    pub fn mark(&self) -> FlashrootResult<()> {
        let volume = require(self.volumes, &self.layout.volume_name)?;
        let path = volume.get_block_path();

        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(FlashrootError::at("open", path))?;

        write_marker(&mut file, path)?;
        file.sync_all().map_err(FlashrootError::at("sync", path))?;

        tracing::info!("{} will be reformatted on the next switch", path.display());
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Writes [`DEADCODE_MARKER`] big-endian with a single write, failing unless every byte landed.
///
/// `path` is only used to name the device in errors.
pub fn write_marker<W: Write>(writer: &mut W, path: &Path) -> FlashrootResult<()> {
    let marker = DEADCODE_MARKER.to_be_bytes();
    let written = writer
        .write(&marker)
        .map_err(FlashrootError::at("write", path))?;

    if written != MARKER_LEN {
        return Err(FlashrootError::ShortWrite {
            path: path.to_path_buf(),
            written,
            expected: MARKER_LEN,
        });
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

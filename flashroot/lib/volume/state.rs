use std::{
    fmt::{self, Display},
    fs::File,
    io::Read,
    path::Path,
};

use crate::{FlashrootError, FlashrootResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The sentinel written at offset 0 to force a reformat on the next switch.
pub const DEADCODE_MARKER: u32 = 0xDEAD_C0DE;

/// The JFFS2 node magic found at the start of a formatted volume.
pub const JFFS2_MAGIC: u16 = 0x1985;

/// The number of bytes at the start of a device that decide its state.
pub const MARKER_LEN: usize = 4;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The format state of a persistent volume, as seen from its first bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsState {
    /// No recognizable sentinel.
    None,

    /// The volume carries the force-reformat sentinel.
    Deadcode,

    /// The volume holds a persistent filesystem from an earlier switch.
    Persistent,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FsState {
    /// Classifies the leading bytes of a device.
    ///
    /// Fewer than [`MARKER_LEN`] bytes classify as [`FsState::None`]. The JFFS2 magic is accepted
    /// in either byte order since the filesystem is written in the CPU's endianness.
    pub fn classify(header: &[u8]) -> Self {
        let Some(header) = header.get(..MARKER_LEN) else {
            return FsState::None;
        };

        if header == DEADCODE_MARKER.to_be_bytes() {
            return FsState::Deadcode;
        }

        let magic = [header[0], header[1]];
        if u16::from_be_bytes(magic) == JFFS2_MAGIC || u16::from_le_bytes(magic) == JFFS2_MAGIC {
            return FsState::Persistent;
        }

        FsState::None
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Reads the leading bytes of `device` and classifies them.
///
/// The result is never cached; every call reads the device again.
pub fn inspect(device: &Path) -> FlashrootResult<FsState> {
    let file = File::open(device).map_err(FlashrootError::at("open", device))?;

    let mut header = Vec::with_capacity(MARKER_LEN);
    file.take(MARKER_LEN as u64)
        .read_to_end(&mut header)
        .map_err(FlashrootError::at("read", device))?;

    let state = FsState::classify(&header);
    tracing::debug!("{} classified as {state}", device.display());
    Ok(state)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for FsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsState::None => write!(f, "none"),
            FsState::Deadcode => write!(f, "deadcode"),
            FsState::Persistent => write!(f, "persistent"),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

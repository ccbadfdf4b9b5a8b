//! Persistent flash volumes.
//!
//! A [`Volume`] names a flash partition and the block device that exposes it. The
//! [`VolumeManager`] trait finds volumes and performs the few raw operations the overlay switch
//! needs; [`MtdVolumes`] implements it for MTD partitions listed in `/proc/mtd`.
//!
//! The on-disk state of a volume is read from the first four bytes of its block device, see
//! [`FsState`] and [`inspect`].

mod manager;
mod mtd;
mod state;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use manager::*;
pub use mtd::*;
pub use state::*;

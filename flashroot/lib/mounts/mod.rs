//! Mount table inspection and root pivoting.
//!
//! [`MountOps`] is the seam between the overlay switch and the kernel. [`SystemMounts`] is the
//! real implementation: it reads `/proc/mounts` and `/proc/filesystems` and drives `mount(2)`,
//! `umount2(2)` and `pivot_root(2)` through `nix`.

mod extroot;
mod ops;
mod procfs;
mod system;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use extroot::*;
pub use ops::*;
pub use procfs::*;
pub use system::*;

//! Copying a writable layer onto the persistent volume.

mod copy;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use copy::*;

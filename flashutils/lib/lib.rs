//! `flashutils` is a library containing general utilities for the flashroot project.

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod error;
pub mod term;
pub mod walk;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use error::*;
pub use term::*;
pub use walk::*;

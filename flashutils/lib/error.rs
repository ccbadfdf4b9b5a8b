//! `flashutils::error` is a module containing error utilities for the flashroot project.

use std::path::PathBuf;

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a flashutils-related operation.
pub type FlashutilsResult<T> = Result<T, FlashutilsError>;

/// An error that occurred in one of the flashutils helpers.
#[derive(pretty_error_debug::Debug, Error)]
pub enum FlashutilsError {
    /// A directory could not be listed during a tree walk.
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        /// The directory that could not be read.
        path: PathBuf,

        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Reading an answer from the terminal failed.
    #[error("failed to read confirmation: {0}")]
    Prompt(#[source] std::io::Error),

    /// An error that occurred when performing an IO operation
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

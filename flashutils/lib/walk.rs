//! Post-order directory walking.
//!
//! [`foreach_dir`] visits every directory below (and including) a root, children before their
//! parent. Only directories are handed to the visitor; the visitor decides what to do with the
//! entries inside each one. Symbolic links are never followed.

use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
};

use crate::FlashutilsError;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A failure recorded while walking a tree.
///
/// A failure never stops the walk of sibling subtrees.
#[derive(Debug)]
pub enum WalkFailure<E> {
    /// The directory could not be listed, so neither it nor anything below it was visited.
    Listing(FlashutilsError),

    /// The visitor returned an error for this directory.
    Visit {
        /// The directory that was being visited.
        path: PathBuf,

        /// The error returned by the visitor.
        error: E,
    },
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Walks `dir` depth-first and calls `visitor` on every directory after all of its
/// subdirectories have been visited.
///
/// Returns every failure met along the way. An empty vector means the whole tree was visited
/// without error.
pub fn foreach_dir<F, E>(dir: &Path, visitor: &mut F) -> Vec<WalkFailure<E>>
where
    F: FnMut(&Path) -> Result<(), E>,
{
    let mut failures = Vec::new();
    walk(dir, visitor, &mut failures);
    failures
}

/// Lists the immediate subdirectories of `dir`, without following symlinks.
pub fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, FlashutilsError> {
    let read_dir = |source| FlashutilsError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir)? {
        let entry = entry.map_err(read_dir)?;
        if entry.file_type().map_err(read_dir)?.is_dir() {
            dirs.push(entry.path());
        }
    }

    dirs.sort();
    Ok(dirs)
}

fn walk<F, E>(dir: &Path, visitor: &mut F, failures: &mut Vec<WalkFailure<E>>)
where
    F: FnMut(&Path) -> Result<(), E>,
{
    let children = match subdirectories(dir) {
        Ok(children) => children,
        Err(e) => {
            tracing::warn!("skipping subtree: {e}");
            failures.push(WalkFailure::Listing(e));
            return;
        }
    };

    for child in &children {
        walk(child, visitor, failures);
    }

    if let Err(error) = visitor(dir) {
        failures.push(WalkFailure::Visit {
            path: dir.to_path_buf(),
            error,
        });
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<E: fmt::Display> fmt::Display for WalkFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkFailure::Listing(e) => write!(f, "{e}"),
            WalkFailure::Visit { path, error } => {
                write!(f, "failed to process {}: {error}", path.display())
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

//! Translation of legacy whiteout markers into real deletions.
//!
//! A writable layer populated before it was mounted as an overlay records deletions as symlinks
//! pointing at [`WHITEOUT_TARGET`]. Once the layer is live, deleting the shadowed path through the
//! merged root turns each marker into a real overlay whiteout.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use flashutils::{foreach_dir, WalkFailure};

use crate::{FlashrootError, FlashrootResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The symlink target that marks an entry as deleted.
pub const WHITEOUT_TARGET: &str = "(overlay-whiteout)";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Reconciles whiteout markers below a directory.
pub trait Reconcile {
    /// Deletes the shadow of every whiteout marker below `root`.
    fn reconcile(&self, root: &Path) -> ReconcileReport;
}

/// Deletes shadows from a merged root.
#[derive(Debug, Clone)]
pub struct WhiteoutReconciler {
    lower: PathBuf,
}

/// The outcome of a reconcile pass.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// The shadow paths that were deleted.
    pub removed: Vec<PathBuf>,

    /// Markers whose shadow did not exist.
    pub absent: Vec<PathBuf>,

    /// Subtrees that could not be listed and shadows that could not be deleted.
    pub failures: Vec<WalkFailure<FlashrootError>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl WhiteoutReconciler {
    /// Creates a reconciler that deletes shadows below `lower`.
    pub fn new(lower: impl Into<PathBuf>) -> Self {
        Self {
            lower: lower.into(),
        }
    }

    /// Returns the path that a marker at `marker` hides, given the walk started at `root`.
    pub fn shadow_of(&self, root: &Path, marker: &Path) -> PathBuf {
        match marker.strip_prefix(root) {
            Ok(relative) => self.lower.join(relative),
            Err(_) => self.lower.join(marker.strip_prefix("/").unwrap_or(marker)),
        }
    }

    fn reconcile_dir(
        &self,
        root: &Path,
        dir: &Path,
        report: &mut ReconcileReport,
    ) -> FlashrootResult<()> {
        let entries = fs::read_dir(dir).map_err(FlashrootError::at("opendir", dir))?;

        for entry in entries {
            let entry = entry.map_err(FlashrootError::at("readdir", dir))?;
            let marker = entry.path();
            if !is_whiteout(&marker) {
                continue;
            }

            let shadow = self.shadow_of(root, &marker);
            match remove_shadow(&shadow) {
                Ok(true) => {
                    tracing::debug!("removed {}", shadow.display());
                    report.removed.push(shadow);
                }
                Ok(false) => {
                    tracing::debug!("{} already gone", shadow.display());
                    report.absent.push(shadow);
                }
                Err(error) => {
                    tracing::warn!("failed to remove {}: {error}", shadow.display());
                    report.failures.push(WalkFailure::Visit {
                        path: shadow,
                        error,
                    });
                }
            }
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns true if `path` is a symlink pointing at [`WHITEOUT_TARGET`].
pub fn is_whiteout(path: &Path) -> bool {
    fs::read_link(path)
        .map(|target| target.as_os_str() == WHITEOUT_TARGET)
        .unwrap_or(false)
}

/// Deletes `shadow`, returning false if there was nothing to delete.
fn remove_shadow(shadow: &Path) -> FlashrootResult<bool> {
    let result = match fs::symlink_metadata(shadow) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(shadow),
        Ok(_) => fs::remove_file(shadow),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(FlashrootError::syscall("unlink", shadow, e)),
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for WhiteoutReconciler {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Reconcile for WhiteoutReconciler {
    fn reconcile(&self, root: &Path) -> ReconcileReport {
        tracing::info!("reconciling whiteouts under {}", root.display());

        let mut report = ReconcileReport::default();
        let walk_failures = foreach_dir(root, &mut |dir: &Path| {
            self.reconcile_dir(root, dir, &mut report)
        });
        report.failures.extend(walk_failures);

        tracing::info!(
            "removed {} whiteout shadows, {} already gone, {} failures",
            report.removed.len(),
            report.absent.len(),
            report.failures.len()
        );

        report
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

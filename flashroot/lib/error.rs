use std::{
    error::Error,
    fmt::{self, Display},
    path::{Path, PathBuf},
};
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a flashroot-related operation.
pub type FlashrootResult<T> = Result<T, FlashrootError>;

/// An error that occurred while inspecting or switching the root overlay.
#[derive(pretty_error_debug::Debug, Error)]
pub enum FlashrootError {
    /// A named volume or mount point could not be found.
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// The system is not in a state where the operation can start.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A system call failed.
    #[error("{op} {} failed: {source}", path.display())]
    Syscall {
        /// The operation that was being performed.
        op: String,

        /// The path the operation was applied to.
        path: PathBuf,

        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Fewer bytes than required reached the device.
    #[error("short write to {}: wrote {written} of {expected} bytes", path.display())]
    ShortWrite {
        /// The device that was written to.
        path: PathBuf,

        /// The number of bytes the kernel accepted.
        written: usize,

        /// The number of bytes that had to be written.
        expected: usize,
    },

    /// A destructive operation was not confirmed.
    #[error("destructive operation was not confirmed")]
    ConfirmationDeclined,

    /// The configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from one of the flashutils helpers.
    #[error(transparent)]
    Utils(#[from] flashutils::FlashutilsError),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FlashrootError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> FlashrootError {
        FlashrootError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Wraps an OS error with the name of the failing step and the path it was applied to.
    pub fn syscall(
        op: impl Into<String>,
        path: impl AsRef<Path>,
        source: impl Into<std::io::Error>,
    ) -> FlashrootError {
        FlashrootError::Syscall {
            op: op.into(),
            path: path.as_ref().to_path_buf(),
            source: source.into(),
        }
    }

    /// Returns a closure suitable for `map_err` that wraps an OS error as [`FlashrootError::Syscall`].
    pub fn at<E: Into<std::io::Error>>(
        op: &'static str,
        path: impl AsRef<Path>,
    ) -> impl FnOnce(E) -> FlashrootError {
        let path = path.as_ref().to_path_buf();
        move |source| FlashrootError::syscall(op, path, source)
    }

    /// Returns true if this is a [`FlashrootError::Precondition`].
    pub fn is_precondition(&self) -> bool {
        matches!(self, FlashrootError::Precondition(_))
    }

    /// Returns true if this is a [`FlashrootError::Lookup`].
    pub fn is_lookup(&self) -> bool {
        matches!(self, FlashrootError::Lookup(_))
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

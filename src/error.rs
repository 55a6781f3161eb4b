use core::fmt;

/// Result alias for `clade`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by tuple storage, dendrograms, and clustering.
///
/// Three rough families, so callers can tell them apart:
///
/// - **Argument errors** (`IndexOutOfBounds`, `DimensionMismatch`,
///   `InvalidClusterCount`, `InvalidParameter`, `EmptyInput`): the call
///   itself was wrong. Raised before any mutation.
/// - **State errors** (`InvalidState`): the call was made at the wrong
///   time, e.g. cutting an unfinished dendrogram.
/// - **Recoverable outcomes** (`Io`, `UnsupportedVersion`, `Cancelled`):
///   persistence failures and cooperative cancellation. A caller of
///   persistence should expect these and e.g. fall back to recomputing.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input was empty.
    EmptyInput,

    /// Row or column index outside the valid range.
    IndexOutOfBounds {
        /// The offending index.
        index: usize,
        /// Number of valid entries.
        len: usize,
    },

    /// Vector/matrix dimension mismatch.
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Invalid number of clusters requested.
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of items.
        n_items: usize,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// Operation called at the wrong time for the structure's state.
    InvalidState(&'static str),

    /// I/O or decode failure during persistence.
    Io(String),

    /// A persisted record carried a format version this build cannot read.
    UnsupportedVersion {
        /// Version found in the record.
        found: u32,
        /// Newest version this build understands.
        supported: u32,
    },

    /// The run was cancelled cooperatively.
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "empty input provided"),
            Error::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Error::InvalidClusterCount { requested, n_items } => {
                write!(f, "cannot create {requested} clusters from {n_items} items")
            }
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Error::Io(msg) => write!(f, "i/o failure: {msg}"),
            Error::UnsupportedVersion { found, supported } => {
                write!(
                    f,
                    "unsupported format version {found} (newest supported: {supported})"
                )
            }
            Error::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

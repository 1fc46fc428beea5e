//! Error type shared by every layer of the binding.

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the binding layer.
///
/// `Engine` carries the native engine's sticky error cell: the code the
/// engine wrote plus the description fetched from it. Everything else is a
/// failure of the binding itself (library loading, string encoding, shape
/// handling, configuration).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The native engine reported an error through its error cell.
    #[error("engine error {number}: {message}")]
    Engine {
        /// Error number read from the engine's error cell.
        number: i32,
        /// Description fetched from the engine after the failed call.
        message: String,
    },

    /// The engine shared library could not be loaded.
    #[error("failed to load engine library: {0}")]
    Load(#[from] libloading::Error),

    /// A required entry point is missing from the engine library.
    #[error("engine library is missing symbol `{name}`")]
    MissingSymbol {
        /// Symbol name that failed to resolve.
        name: &'static str,
        #[source]
        source: libloading::Error,
    },

    /// Context creation failed before any call could be issued.
    #[error("engine context initialization failed: {0}")]
    ContextInit(&'static str),

    /// A string passed to the engine contained an interior NUL byte.
    #[error("string contains an interior NUL byte")]
    NulByte(#[from] std::ffi::NulError),

    /// An array did not have the expected number of elements.
    #[error("expected {expected} elements, got {got}")]
    ShapeMismatch {
        /// Element count implied by the requested shape.
        expected: usize,
        /// Element count actually present.
        got: usize,
    },

    /// A matrix conversion was requested on a flat (unshaped) result.
    #[error("result carries no matrix shape")]
    NotAMatrix,

    /// Complex reinterpretation of an odd-length float array.
    #[error("cannot pair {len} floats into complex values")]
    OddPairCount {
        /// Length of the offending float array.
        len: usize,
    },

    /// The engine returned a solve mode this binding does not know.
    #[error("unknown solve mode {0}")]
    UnknownSolveMode(i32),

    /// Configuration file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file parse failure.
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Engine error number, if this is an engine-side error.
    pub fn engine_number(&self) -> Option<i32> {
        match self {
            Error::Engine { number, .. } => Some(*number),
            _ => None,
        }
    }
}

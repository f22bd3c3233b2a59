//! Error types for the streaming engine

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for streaming operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Raw status code reported by the vendor capture API.
///
/// Zero is success, every failure is negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const SUCCESS: Self = Self(0);
    pub const INTERNAL_FAULT: Self = Self(-1);
    pub const NOT_FOUND: Self = Self(-3);
    pub const BAD_HANDLE: Self = Self(-4);
    pub const BAD_PARAMETER: Self = Self(-7);
    pub const INVALID_VALUE: Self = Self(-11);
    pub const TIMEOUT: Self = Self(-12);
    pub const RESOURCES: Self = Self(-14);
    pub const INVALID_CALL: Self = Self(-15);
    pub const INCOMPLETE: Self = Self(-19);
    pub const IO: Self = Self(-20);
    pub const BUSY: Self = Self(-24);
    pub const UNKNOWN: Self = Self(-28);
    pub const NOT_AVAILABLE: Self = Self(-30);
    pub const INVALID_ADDRESS: Self = Self(-32);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors surfaced by the streaming engine and its collaborators.
#[derive(Error, Debug)]
pub enum StreamError {
    /// A vendor subsystem call returned a non-success code
    #[error("{call} failed with device error {code}")]
    Device { call: &'static str, code: ErrorCode },

    /// A capture buffer could not be allocated or announced
    #[error("buffer {index} could not be registered (device error {code})")]
    ResourceExhausted { index: usize, code: ErrorCode },

    /// A device command never reported completion within the poll deadline
    #[error("command '{name}' did not complete within {waited:?}")]
    CommandTimeout { name: String, waited: Duration },

    /// Caller supplied an argument the engine cannot work with
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The dispatcher thread could not be spawned
    #[error("failed to spawn frame dispatcher: {0}")]
    Dispatcher(#[source] std::io::Error),

    /// Configuration file could not be read or parsed
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl StreamError {
    pub fn device(call: &'static str, code: ErrorCode) -> Self {
        Self::Device { call, code }
    }

    /// Raw vendor code behind this error, if there is one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Device { code, .. } | Self::ResourceExhausted { code, .. } => Some(*code),
            Self::CommandTimeout { .. } => Some(ErrorCode::TIMEOUT),
            Self::InvalidArgument(_) | Self::Dispatcher(_) | Self::Config(_) => None,
        }
    }
}

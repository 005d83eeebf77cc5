use std::fmt;

/// Result type for conductor-types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the types layer
#[derive(Debug)]
pub enum Error {
    /// A value failed one of the invariants documented on the data model.
    Validation(ValidationError),
    /// IO operation failed
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(err) => write!(f, "validation error: {}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Validation(_) => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

/// Specific invariant violated by a data model value. Kept separate from
/// `Error` so callers validating in bulk can collect these without the IO
/// variant getting in the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyType,
    ZeroTimestamp,
    NegativeTokenCount,
    EmptyToolName,
    EmptyBashCommand,
    EmptyFileOperationField(&'static str),
    MissingSessionId,
    MissingSessionProject,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyType => write!(f, "event type must be non-empty"),
            ValidationError::ZeroTimestamp => write!(f, "timestamp must be non-zero"),
            ValidationError::NegativeTokenCount => {
                write!(f, "token/cost fields must be >= 0")
            }
            ValidationError::EmptyToolName => write!(f, "toolName must be non-empty"),
            ValidationError::EmptyBashCommand => write!(f, "command must be non-empty"),
            ValidationError::EmptyFileOperationField(field) => {
                write!(f, "FileOperation.{} must be non-empty", field)
            }
            ValidationError::MissingSessionId => write!(f, "session id is required"),
            ValidationError::MissingSessionProject => write!(f, "session project is required"),
        }
    }
}

impl std::error::Error for ValidationError {}

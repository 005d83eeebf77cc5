use std::fmt;

use conductor_types::ValidationError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    InvalidJson(serde_json::Error),
    MissingField(&'static str),
    InvalidTimestamp(String),
    UnknownType(String),
    /// The line parsed but the decoded event failed a data-model invariant
    /// (spec.md §7 class 3: logged and skipped, line still counts toward
    /// the byte offset).
    Validation(ValidationError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidJson(err) => write!(f, "invalid JSON: {}", err),
            Error::MissingField(field) => write!(f, "missing required field: {}", field),
            Error::InvalidTimestamp(raw) => write!(f, "invalid timestamp: {}", raw),
            Error::UnknownType(type_name) => write!(f, "unknown event type: {}", type_name),
            Error::Validation(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidJson(err) => Some(err),
            Error::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidJson(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

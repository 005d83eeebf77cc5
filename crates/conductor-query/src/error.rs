use std::fmt;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    InvalidTimeRange(String),
    InvalidEventType(String),
    SinceAfterUntil,
    EmptySession(PathBuf),
    Io(std::io::Error),
    Parser(conductor_parser::Error),
    Cache(conductor_cache::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidTimeRange(s) => write!(f, "invalid time range: {:?}", s),
            Error::InvalidEventType(s) => write!(f, "invalid event type: {:?}", s),
            Error::SinceAfterUntil => write!(f, "since is after until"),
            Error::EmptySession(path) => {
                write!(f, "{}: produced neither a session id nor any events", path.display())
            }
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Parser(err) => write!(f, "parse error: {}", err),
            Error::Cache(err) => write!(f, "cache error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Parser(err) => Some(err),
            Error::Cache(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<conductor_parser::Error> for Error {
    fn from(err: conductor_parser::Error) -> Self {
        Error::Parser(err)
    }
}

impl From<conductor_cache::Error> for Error {
    fn from(err: conductor_cache::Error) -> Self {
        Error::Cache(err)
    }
}

use std::fmt;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    /// The loader produced a value that failed the "session id or events"
    /// invariant — both empty is a load error, not a cacheable empty value.
    EmptyLoad(PathBuf),
    Load(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::EmptyLoad(path) => {
                write!(f, "{}: parse produced neither a session id nor events", path.display())
            }
            Error::Load(err) => write!(f, "load error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Load(err) => Some(err.as_ref()),
            Error::EmptyLoad(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Notify(notify::Error),
    /// Another engine process already holds the exclusive lock file.
    AnotherEngineRunning,
    Store(conductor_store::Error),
    Toml(toml::de::Error),
    TomlSer(toml::ser::Error),
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Notify(err) => write!(f, "file watcher error: {}", err),
            Error::AnotherEngineRunning => {
                write!(f, "another engine is already running against this root directory")
            }
            Error::Store(err) => write!(f, "store error: {}", err),
            Error::Toml(err) => write!(f, "invalid config: {}", err),
            Error::TomlSer(err) => write!(f, "could not serialize config: {}", err),
            Error::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Notify(err) => Some(err),
            Error::Store(err) => Some(err),
            Error::Toml(err) => Some(err),
            Error::TomlSer(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Notify(err)
    }
}

impl From<conductor_store::Error> for Error {
    fn from(err: conductor_store::Error) -> Self {
        Error::Store(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Toml(err)
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::TomlSer(err)
    }
}

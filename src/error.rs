use std::path::PathBuf;

/// Errors raised by the collapsing, chaining and counting stages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {source} ({path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("input file {0} does not exist")]
    MissingInput(PathBuf),

    #[error("alignments are not sorted by reference and start: {previous} precedes {current}")]
    UnsortedInput { previous: String, current: String },

    #[error("duplicate id {id} in {path}")]
    DuplicateId { id: String, path: PathBuf },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("id {id} referenced by {context} not found in {path}")]
    MissingId {
        id: String,
        context: String,
        path: PathBuf,
    },

    #[error("inconsistent data: {0}")]
    DataConsistency(String),

    #[error("malformed data in {path}: {message}")]
    Data { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an `io::Error` with the path it happened on.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            source: err,
            path: PathBuf::from("<unknown>"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Failed to read script file {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Script parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum QuarantineError {
    #[error("Quarantine IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Quarantine rejected item: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("Failed to quarantine {file}: {source}")]
    Quarantine {
        file: PathBuf,
        #[source]
        source: QuarantineError,
    },
}

pub type Result<T> = std::result::Result<T, StageError>;

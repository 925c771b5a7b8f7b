//! Failure taxonomy for a single file import.
//!
//! Every variant is file-scoped: the orchestrator logs it against the
//! path and moves on to the next file. Node-scoped problems (a component
//! without its `did`) never reach this type; the tree walker logs and
//! skips them itself.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    /// The bytes are not well-formed XML.
    #[error("XML parse error: {0}")]
    Parse(String),

    /// The document is well-formed but lacks a required structure
    /// (`archdesc`, its `did`, or any usable identifier).
    #[error("invalid finding aid: {0}")]
    InvalidFindingAid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record store failure (create, delete, flush, commit).
    #[error("store error: {0}")]
    Store(String),

    /// Search index failure after retries were exhausted.
    #[error("search index error: {0}")]
    Index(String),
}

impl ImportError {
    /// Short machine-friendly label used in batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ImportError::Parse(_) => "parse",
            ImportError::InvalidFindingAid(_) => "structure",
            ImportError::Io(_) => "io",
            ImportError::Store(_) => "store",
            ImportError::Index(_) => "index",
        }
    }
}

impl From<sqlx::Error> for ImportError {
    fn from(err: sqlx::Error) -> Self {
        ImportError::Store(err.to_string())
    }
}

impl From<quick_xml::Error> for ImportError {
    fn from(err: quick_xml::Error) -> Self {
        ImportError::Parse(err.to_string())
    }
}

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::Level;
use crate::tree::RowId;

#[derive(Debug, Error, Diagnostic)]
pub enum BrowserError {
    #[error("search request failed: {0}")]
    QidoHttp(String),

    #[error("search returned status {status}: {message}")]
    #[diagnostic(help("check the archive base URL and the AE title"))]
    QidoStatus { status: u16, message: String },

    #[error("retrieve request failed: {0}")]
    WadoHttp(String),

    #[error("retrieve returned status {status}: {message}")]
    WadoStatus { status: u16, message: String },

    #[error("store request failed: {0}")]
    StowHttp(String),

    #[error("store returned status {status}: {message}")]
    StowStatus { status: u16, message: String },

    #[error("invalid JSON in archive response: {0}")]
    InvalidResponse(String),

    #[error("record has no {0} attribute")]
    MissingAttribute(&'static str),

    #[error("no {level} with UID {uid}")]
    RecordNotFound { level: Level, uid: String },

    #[error("no such row: {0}")]
    UnknownRow(RowId),

    #[error("{0} rows cannot be expanded")]
    NotExpandable(Level),

    #[error("{0} rows have no viewer links")]
    NoLinks(Level),

    #[error("instance has no viewable reference at index {0}")]
    NoReference(usize),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid page size: {0}")]
    #[diagnostic(help("the page size must be a positive integer"))]
    InvalidLimit(String),

    #[error("upload queue is empty")]
    EmptyUpload,

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

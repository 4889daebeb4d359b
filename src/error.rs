use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, InvoiceError>;

#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invoice number '{0}' has no numeric suffix after a hyphen")]
    MalformedInvoiceNumber(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("saved draft is not valid JSON: {0}")]
    CorruptDraft(#[from] serde_json::Error),

    #[error("saved draft rejected: {0}")]
    InvalidDraft(String),

    #[error("settings error in {}: {reason}", path.display())]
    Settings { path: PathBuf, reason: String },

    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error("document compilation failed: {0}")]
    Compile(String),

    #[error("could not launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl InvoiceError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InvoiceError::Storage { path: path.into(), source }
    }

    pub fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        InvoiceError::InvalidValue { field: field.to_string(), reason: reason.into() }
    }
}

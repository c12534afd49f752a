use thiserror::Error;

/// Failures while parsing or evaluating a filter query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unexpected token {found:?} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        found: String,
        offset: usize,
        expected: &'static str,
    },

    #[error("unexpected end of query, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("invalid number {text:?} at offset {offset}")]
    InvalidNumber { text: String, offset: usize },

    #[error("unknown column {0:?}")]
    UnknownColumn(String),
}

/// Failures reported by [`TableModel`](crate::TableModel) mutators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("unknown column {0:?}")]
    UnknownColumn(String),

    #[error("item is a grouping branch, not a data row")]
    NotALeaf,

    #[error("column {0:?} is not editable")]
    NotEditable(String),

    #[error("invalid filter: {0}")]
    Query(#[from] QueryError),
}

/// Failures reported by [`TreeView`](crate::TreeView).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViewError {
    #[error("view is bound to a different model")]
    ModelMismatch,

    #[error("view is not bound to a model")]
    Unbound,

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Failures while encoding or decoding persisted view state.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("settings document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("header state is not valid base64: {0}")]
    HeaderBlob(#[from] base64::DecodeError),

    #[error("header state has an odd byte length ({0})")]
    HeaderLength(usize),
}

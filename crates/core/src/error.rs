use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document fetch failed: {0}")]
    Fetch(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("superseded by a newer load request: {0}")]
    Superseded(String),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("transient embedding failure: {0}")]
    Transient(String),

    #[error("permanent embedding failure: {0}")]
    Permanent(String),

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("transient completion failure: {0}")]
    Transient(String),

    #[error("permanent completion failure: {0}")]
    Permanent(String),

    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum AskError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

use thiserror::Error;

pub type SourceResult<T> = Result<T, SourceError>;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Invalid source '{id}': {message}")]
    InvalidWireSource { id: String, message: String },

    #[error("Wait for source '{0}' was cancelled before the source was set")]
    WaitCancelled(String),

    #[error("Context has been disposed")]
    Disposed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions(message.into())
    }

    pub fn invalid_wire_source(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidWireSource {
            id: id.into(),
            message: message.into(),
        }
    }
}

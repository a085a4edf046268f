use bindery_source::SourceError;
use bindery_token::TokenError;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("<{tag}> is missing required attribute '{attribute}'")]
    MissingAttribute { tag: String, attribute: String },

    #[error("Invalid command markup: {0}")]
    InvalidMarkup(String),

    #[error("Data source '{source_name}' returned {actual} result sets for {expected} members")]
    MemberCountMismatch {
        source_name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown data provider '{0}'")]
    UnknownProvider(String),

    #[error("Provider failed: {0}")]
    Provider(String),

    #[error("Provider gave up after {attempts} attempts: {message}")]
    ProviderExhausted { attempts: usize, message: String },

    #[error("Component collection has already run")]
    AlreadyRun,

    #[error("Component collection is disposed")]
    Disposed,
}

impl RuntimeError {
    pub fn missing_attribute(tag: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingAttribute {
            tag: tag.into(),
            attribute: attribute.into(),
        }
    }
}

use bindery_source::SourceError;
use thiserror::Error;

pub type TokenResult<T> = Result<T, TokenError>;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Malformed binding path '{path}': {message}")]
    MalformedPath { path: String, message: String },

    #[error("Invalid expression '{expression}' at {pos}: {message}")]
    InvalidExpression {
        expression: String,
        pos: usize,
        message: String,
    },

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl TokenError {
    pub fn malformed_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedPath {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn invalid_expression(
        expression: impl Into<String>,
        pos: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidExpression {
            expression: expression.into(),
            pos,
            message: message.into(),
        }
    }
}

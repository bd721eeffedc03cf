use thiserror::Error;

/// Errors from the hosted auth+database platform (or its in-memory stand-in)
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("{0}")]
    Rejected(String),

    #[error("Not signed in")]
    NoSession,

    #[error("Backend returned {status}: {message}")]
    Unexpected { status: u16, message: String },

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Token(#[from] crate::auth::TokenError),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl BackendError {
    /// Message safe to show to the person at the keyboard
    pub fn user_message(&self) -> String {
        match self {
            BackendError::InvalidCredentials(msg) | BackendError::Rejected(msg) => msg.clone(),
            BackendError::NoSession => "You are not signed in".to_string(),
            BackendError::Transport(_) => "Could not reach the server. Please try again.".to_string(),
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

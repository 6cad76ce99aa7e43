use thiserror::Error;

use crate::types::{RegistrationStep, UserError};

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("User errors: {}", format_user_errors(.0))]
    UserErrors(Vec<UserError>),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A registration that stopped at `step`
#[derive(Error, Debug)]
#[error("{step} failed: {source}")]
pub struct RegistrationError {
    pub step: RegistrationStep,
    #[source]
    pub source: AdminError,
}

impl RegistrationError {
    pub fn new(step: RegistrationStep, source: AdminError) -> Self {
        Self { step, source }
    }
}

fn format_user_errors(errors: &[UserError]) -> String {
    errors
        .iter()
        .map(|e| match &e.field {
            Some(field) if !field.is_empty() => format!("{}: {}", field.join("."), e.message),
            _ => e.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

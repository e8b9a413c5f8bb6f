//! Requests and seed request construction.

mod builder;
mod types;

pub use builder::{build_seed_request, SeedRequest, Validation, ALLOWED_FIELDS};
pub use types::{CrawlRequest, DEFAULT_CALLBACK};

use thiserror::Error;

/// Rejected seed request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Missing required parameter: 'url'")]
    MissingUrl,

    #[error("Error while creating Request, invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Error while creating Request, unexpected argument '{0}'")]
    UnexpectedField(String),

    #[error("Error while creating Request, invalid '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

impl RequestError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

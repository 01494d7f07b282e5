//! Decoding of engine errors into [`AdminError::Database`].
//!
//! Drivers disagree on how they report failures: newer ones hand over a
//! numeric code next to the text, older ones only text with the code as the
//! trailing token. One classifier is picked at startup and used for every
//! call.

use crate::config::ErrorDialect;
use crate::utils::errors::{AdminError, LOGIN_FAILURE_CODE};
use std::sync::Arc;

const LOGIN_FAILURE_TEXT: &str = "Login failure";

/// An error as the driver surfaced it, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDriverError {
    pub code: Option<i64>,
    pub message: String,
}

impl RawDriverError {
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, raw: &RawDriverError) -> AdminError;
}

/// Driver reports the code separately.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredErrors;

impl ErrorClassifier for StructuredErrors {
    fn classify(&self, raw: &RawDriverError) -> AdminError {
        let code = raw.code.unwrap_or(-1);
        let message = if code == LOGIN_FAILURE_CODE {
            LOGIN_FAILURE_TEXT.to_string()
        } else {
            raw.message.clone()
        };
        AdminError::Database { code, message }
    }
}

/// Driver reports text only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyErrors;

impl ErrorClassifier for LegacyErrors {
    fn classify(&self, raw: &RawDriverError) -> AdminError {
        let text = raw.message.trim();
        let code = if text == LOGIN_FAILURE_TEXT {
            LOGIN_FAILURE_CODE
        } else {
            text.split_whitespace()
                .last()
                .and_then(|t| t.parse::<i64>().ok())
                .unwrap_or(-1)
        };
        AdminError::Database {
            code,
            message: raw.message.clone(),
        }
    }
}

pub fn classifier_for(dialect: ErrorDialect) -> Arc<dyn ErrorClassifier> {
    match dialect {
        ErrorDialect::Structured => Arc::new(StructuredErrors),
        ErrorDialect::Legacy => Arc::new(LegacyErrors),
    }
}

//! Error types for recurrence-engine operations.
//!
//! Parse failures on dates and times are not errors here: they degrade to an
//! open bound or an unset time and are reported through `tracing`.

use thiserror::Error;

use crate::rule::Frequency;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Unbounded range: cannot expand {frequency} rule, date fence has an open bound")]
    UnboundedRange { frequency: Frequency },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid RRULE: {0}")]
    InvalidRule(String),

    #[error("Expansion error: {0}")]
    Expansion(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

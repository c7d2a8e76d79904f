// Report validation: rejects malformed segments before any merge runs.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("user id is empty")]
    EmptyUserId,

    #[error("video id is empty")]
    EmptyVideoId,

    #[error("`{field}` must be a finite number")]
    NonFinite { field: &'static str },

    #[error("`{field}` must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },

    #[error("invalid time segment: start {start} must be before end {end}")]
    EmptySegment { start: f64, end: f64 },

    #[error("video duration must be positive (got {value})")]
    NonPositiveDuration { value: f64 },
}

impl ValidationError {
    /// Name of the offending request field, if the error is tied to one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::EmptyUserId => Some("userId"),
            Self::EmptyVideoId => Some("videoId"),
            Self::NonFinite { field } | Self::Negative { field, .. } => Some(field),
            Self::EmptySegment { .. } => Some("end"),
            Self::NonPositiveDuration { .. } => Some("videoDuration"),
        }
    }
}

pub(crate) fn finite(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::NonFinite { field })
    }
}

pub(crate) fn non_negative(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    let value = finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::Negative { field, value });
    }
    Ok(value)
}

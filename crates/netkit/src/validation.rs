//! Acceptable status ranges

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Inclusive range of status codes a request treats as success.
///
/// Responses outside the range never reach the parser; they complete with
/// `ErrorResponse` when they carry a body and `Validate` when they don't.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusValidation {
    pub min: u16,
    pub max: u16,
}

impl StatusValidation {
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    /// 2xx only
    pub const fn success() -> Self {
        Self::new(200, 299)
    }

    /// Any status is handed to the parser
    pub const fn any() -> Self {
        Self::new(100, 999)
    }

    pub fn accepts(&self, status: StatusCode) -> bool {
        (self.min..=self.max).contains(&status.as_u16())
    }
}

impl Default for StatusValidation {
    fn default() -> Self {
        Self::success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_accepts_2xx_only() {
        let validation = StatusValidation::default();
        assert!(validation.accepts(StatusCode::OK));
        assert!(validation.accepts(StatusCode::NO_CONTENT));
        assert!(!validation.accepts(StatusCode::NOT_MODIFIED));
        assert!(!validation.accepts(StatusCode::NOT_FOUND));
        assert!(!validation.accepts(StatusCode::CONTINUE));
    }

    #[test]
    fn test_custom_range() {
        let validation = StatusValidation::new(200, 404);
        assert!(validation.accepts(StatusCode::NOT_FOUND));
        assert!(!validation.accepts(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(StatusValidation::any().accepts(StatusCode::INTERNAL_SERVER_ERROR));
    }
}

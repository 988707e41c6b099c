//! Errors raised at the configuration and persistence boundary.
//!
//! Nothing on the per-sample path returns an error: out-of-range values are
//! clamped, indices wrap and non-finite outputs are scrubbed to zero.

use crate::port::ParamId;

#[derive(Debug)]
pub enum ModuleError {
    UnknownParam(ParamId),
    InvalidState(String),
    Json(serde_json::Error),
}

impl std::fmt::Display for ModuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleError::UnknownParam(id) => write!(f, "Unknown parameter: {}", id),
            ModuleError::InvalidState(msg) => write!(f, "Invalid module state: {}", msg),
            ModuleError::Json(err) => write!(f, "Malformed state JSON: {}", err),
        }
    }
}

impl std::error::Error for ModuleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModuleError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ModuleError {
    fn from(err: serde_json::Error) -> Self {
        ModuleError::Json(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            ModuleError::UnknownParam(4).to_string(),
            "Unknown parameter: 4"
        );
        assert!(ModuleError::InvalidState("shifts".into())
            .to_string()
            .contains("shifts"));
    }

    #[test]
    fn test_json_error_source() {
        let err: ModuleError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(err.source().is_some());
    }
}

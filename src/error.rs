use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum ControllerError {
    #[error("Invalid parameter '{name}': {reason}")]
    Validation { name: &'static str, reason: String },

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("Communication failed: {0}")]
    Communication(String),

    #[error("Endpoint registration failed: {0}")]
    Registration(String),

    #[error("Malformed ZCL frame: {0}")]
    Frame(String),

    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

impl ControllerError {
    pub fn validation(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            name,
            reason: reason.into(),
        }
    }

    /// HTTP status the request surface answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::UnknownEndpoint(_) => 404,
            Self::Communication(_) | Self::Mqtt(_) => 502,
            Self::Registration(_) => 503,
            Self::Frame(_) | Self::IoError(_) | Self::SerdeJsonError(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(ControllerError::validation("val", "too large").status_code(), 400);
        assert_eq!(
            ControllerError::UnknownEndpoint("/devices/1A2B/endpoints/0B".into()).status_code(),
            404
        );
        assert_eq!(
            ControllerError::Communication("timeout".into()).status_code(),
            502
        );
        assert_eq!(
            ControllerError::Registration("stack offline".into()).status_code(),
            503
        );
    }

    #[test]
    fn test_validation_message_names_parameter() {
        let err = ControllerError::validation("rate", "exceeds 65535");
        assert_eq!(err.to_string(), "Invalid parameter 'rate': exceeds 65535");
    }
}

use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackingErrorCode {
    InvalidArgument,
    ScriptLoadFailed,
    TrackerUnavailable,
    Internal,
}

impl TrackingErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingErrorCode::InvalidArgument => "tracking/invalid-argument",
            TrackingErrorCode::ScriptLoadFailed => "tracking/script-load-failed",
            TrackingErrorCode::TrackerUnavailable => "tracking/tracker-unavailable",
            TrackingErrorCode::Internal => "tracking/internal",
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrackingError {
    pub code: TrackingErrorCode,
    message: String,
}

impl TrackingError {
    pub fn new(code: TrackingErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for TrackingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for TrackingError {}

pub type TrackingResult<T> = Result<T, TrackingError>;

pub fn invalid_argument(message: impl Into<String>) -> TrackingError {
    TrackingError::new(TrackingErrorCode::InvalidArgument, message)
}

/// The analytics script could not be inserted, or it loaded without exposing its global API.
pub fn script_load_failed(message: impl Into<String>) -> TrackingError {
    TrackingError::new(TrackingErrorCode::ScriptLoadFailed, message)
}

pub fn tracker_unavailable(message: impl Into<String>) -> TrackingError {
    TrackingError::new(TrackingErrorCode::TrackerUnavailable, message)
}

pub fn internal_error(message: impl Into<String>) -> TrackingError {
    TrackingError::new(TrackingErrorCode::Internal, message)
}

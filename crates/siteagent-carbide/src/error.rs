//! Error taxonomy for site controller calls.
//!
//! Transport status codes are mapped to a small set of error kinds. A
//! classified error is reported to the workflow engine as non-retryable;
//! anything else passes through unchanged and is left to the engine's
//! retry policy.

use std::fmt;

use thiserror::Error;
use tonic::{Code, Status};

/// gRPC status codes, independent of the transport library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl From<Code> for TransportCode {
    fn from(code: Code) -> Self {
        match code {
            Code::Ok => TransportCode::Ok,
            Code::Cancelled => TransportCode::Cancelled,
            Code::Unknown => TransportCode::Unknown,
            Code::InvalidArgument => TransportCode::InvalidArgument,
            Code::DeadlineExceeded => TransportCode::DeadlineExceeded,
            Code::NotFound => TransportCode::NotFound,
            Code::AlreadyExists => TransportCode::AlreadyExists,
            Code::PermissionDenied => TransportCode::PermissionDenied,
            Code::ResourceExhausted => TransportCode::ResourceExhausted,
            Code::FailedPrecondition => TransportCode::FailedPrecondition,
            Code::Aborted => TransportCode::Aborted,
            Code::OutOfRange => TransportCode::OutOfRange,
            Code::Unimplemented => TransportCode::Unimplemented,
            Code::Internal => TransportCode::Internal,
            Code::Unavailable => TransportCode::Unavailable,
            Code::DataLoss => TransportCode::DataLoss,
            Code::Unauthenticated => TransportCode::Unauthenticated,
        }
    }
}

/// Error types reported to the workflow engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    CarbideObjectNotFound,
    CarbideUnimplemented,
    CarbideUnavailable,
    CarbideDenied,
    CarbideAlreadyExists,
    CarbideFailedPrecondition,
    CarbideInvalidArgument,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::CarbideObjectNotFound => "CarbideObjectNotFound",
            ErrorKind::CarbideUnimplemented => "CarbideUnimplemented",
            ErrorKind::CarbideUnavailable => "CarbideUnavailable",
            ErrorKind::CarbideDenied => "CarbideDenied",
            ErrorKind::CarbideAlreadyExists => "CarbideAlreadyExists",
            ErrorKind::CarbideFailedPrecondition => "CarbideFailedPrecondition",
            ErrorKind::CarbideInvalidArgument => "CarbideInvalidArgument",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a transport code to an error kind. `None` means the code carries no
/// classification and the error should pass through.
pub fn classify(code: TransportCode) -> Option<ErrorKind> {
    match code {
        TransportCode::NotFound => Some(ErrorKind::CarbideObjectNotFound),
        TransportCode::Unimplemented => Some(ErrorKind::CarbideUnimplemented),
        TransportCode::Unavailable => Some(ErrorKind::CarbideUnavailable),
        TransportCode::PermissionDenied => Some(ErrorKind::CarbideDenied),
        TransportCode::AlreadyExists => Some(ErrorKind::CarbideAlreadyExists),
        TransportCode::FailedPrecondition => Some(ErrorKind::CarbideFailedPrecondition),
        TransportCode::InvalidArgument => Some(ErrorKind::CarbideInvalidArgument),
        _ => None,
    }
}

/// Outcome of a failed activity.
#[derive(Debug, Error)]
pub enum ActivityError {
    /// Typed failure the engine must not retry.
    #[error("{kind}: {message}")]
    NonRetryable { kind: ErrorKind, message: String },

    /// Unclassified site controller failure, passed through as-is.
    #[error("site controller call failed: {0}")]
    Retryable(Status),
}

impl ActivityError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        ActivityError::NonRetryable {
            kind: ErrorKind::InvalidRequest,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ActivityError::NonRetryable { kind, .. } => Some(*kind),
            ActivityError::Retryable(_) => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ActivityError::Retryable(_))
    }
}

/// Wrap a site controller status into an [`ActivityError`].
pub fn wrap_status(status: Status) -> ActivityError {
    match classify(status.code().into()) {
        Some(kind) => ActivityError::NonRetryable {
            kind,
            message: status.message().to_string(),
        },
        None => ActivityError::Retryable(status),
    }
}

impl From<Status> for ActivityError {
    fn from(status: Status) -> Self {
        wrap_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classified_codes() {
        let cases = [
            (TransportCode::NotFound, ErrorKind::CarbideObjectNotFound),
            (TransportCode::Unimplemented, ErrorKind::CarbideUnimplemented),
            (TransportCode::Unavailable, ErrorKind::CarbideUnavailable),
            (TransportCode::PermissionDenied, ErrorKind::CarbideDenied),
            (TransportCode::AlreadyExists, ErrorKind::CarbideAlreadyExists),
            (TransportCode::FailedPrecondition, ErrorKind::CarbideFailedPrecondition),
            (TransportCode::InvalidArgument, ErrorKind::CarbideInvalidArgument),
        ];
        for (code, kind) in cases {
            assert_eq!(classify(code), Some(kind), "{code:?}");
        }
    }

    #[test]
    fn unclassified_codes() {
        for code in [
            TransportCode::Ok,
            TransportCode::Internal,
            TransportCode::Unknown,
            TransportCode::DeadlineExceeded,
            TransportCode::Unauthenticated,
        ] {
            assert_eq!(classify(code), None, "{code:?}");
        }
    }

    #[test]
    fn tonic_codes_convert() {
        assert_eq!(TransportCode::from(Code::NotFound), TransportCode::NotFound);
        assert_eq!(
            TransportCode::from(Code::Unauthenticated),
            TransportCode::Unauthenticated
        );
    }

    #[test]
    fn wrap_status_classifies() {
        let err = wrap_status(Status::not_found("vpc missing"));
        assert_eq!(err.kind(), Some(ErrorKind::CarbideObjectNotFound));
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "CarbideObjectNotFound: vpc missing");
    }

    #[test]
    fn wrap_status_passes_through_unclassified() {
        let err = wrap_status(Status::internal("boom"));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn invalid_request_is_non_retryable() {
        let err = ActivityError::invalid_request("missing id");
        assert_eq!(err.kind(), Some(ErrorKind::InvalidRequest));
        assert!(!err.is_retryable());
    }
}

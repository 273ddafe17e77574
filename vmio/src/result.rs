//! Result codes reported by asynchronous jobs.

use std::fmt;

use serde::Serialize;

/// Terminal (or pending) outcome of a job as seen by SDK callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[non_exhaustive]
pub enum ResultCode {
    /// The operation completed.
    Success,
    /// The peer or transport reported a generic failure.
    Failure,
    /// Invalid package, invalid channel or unregistered job.
    InvalidArgument,
    /// The operation did not complete within the allotted time.
    Timeout,
    /// The operation is still in flight.
    OperationPending,
    /// The transport send queue is full.
    SendQueueFull,
    /// The channel stopped before connecting.
    Stopped,
    /// The transport gave up connecting.
    ConnectionTimeout,
    /// The peer rejected the session.
    AuthenticationFailed,
    /// The peer does not know the requested VM.
    UnknownVmId,
    /// A state that has no defined mapping.
    Unexpected,
}

/// Coarse classification of a [`ResultCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[non_exhaustive]
pub enum ErrorClass {
    /// Not an error.
    Ok,
    /// Rejected at the call site without touching the network.
    InvalidArgument,
    /// The connection could not be established or was lost.
    ConnectionFailure,
    /// Retry later: queue full or operation pending.
    TransientBusy,
    /// Any other failure.
    Failure,
}

impl ResultCode {
    /// Classifies the code.
    pub const fn class(self) -> ErrorClass {
        match self {
            Self::Success => ErrorClass::Ok,
            Self::InvalidArgument => ErrorClass::InvalidArgument,
            Self::Stopped
            | Self::Timeout
            | Self::ConnectionTimeout
            | Self::AuthenticationFailed
            | Self::UnknownVmId => ErrorClass::ConnectionFailure,
            Self::OperationPending | Self::SendQueueFull => ErrorClass::TransientBusy,
            Self::Failure | Self::Unexpected => ErrorClass::Failure,
        }
    }

    /// Returns `true` for [`ResultCode::Success`].
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::InvalidArgument => "invalid argument",
            Self::Timeout => "timeout",
            Self::OperationPending => "operation pending",
            Self::SendQueueFull => "send queue full",
            Self::Stopped => "stopped",
            Self::ConnectionTimeout => "connection timeout",
            Self::AuthenticationFailed => "authentication failed",
            Self::UnknownVmId => "unknown vm id",
            Self::Unexpected => "unexpected",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_codes_are_transient() {
        assert_eq!(ResultCode::SendQueueFull.class(), ErrorClass::TransientBusy);
        assert_eq!(ResultCode::OperationPending.class(), ErrorClass::TransientBusy);
    }

    #[test]
    fn connection_failures_are_distinct_codes() {
        let codes = [
            ResultCode::Stopped,
            ResultCode::ConnectionTimeout,
            ResultCode::AuthenticationFailed,
            ResultCode::UnknownVmId,
        ];
        for code in codes {
            assert_eq!(code.class(), ErrorClass::ConnectionFailure, "{code}");
            assert!(!code.is_success());
        }
    }
}

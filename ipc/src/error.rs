//! Per-action outcome codes
//!
//! Every result record starts with one of these codes. They are plain data,
//! not Rust errors: a chain that hits a protocol violation still completes,
//! it just reports the violation in its records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one executed action
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Success = 0,
    /// A handle was not live in the relevant universe
    InvalidHandle = 1,
    /// The receiving universe has no free slots
    OutOfHandles = 2,
    OutOfMemory = 3,
    /// An argument was rejected (e.g. an inline payload above the system maximum)
    IllegalArgs = 4,
    /// A user buffer was unmapped or lacked the needed permission
    Fault = 5,
    /// The peer's chain did not pair with ours
    ProtocolViolation = 6,
    /// The peer lane is gone
    EndOfLane = 7,
}

impl ErrorCode {
    /// Converts a raw wire value back into a code
    pub fn from_raw(raw: i32) -> Option<Self> {
        let code = match raw {
            0 => ErrorCode::Success,
            1 => ErrorCode::InvalidHandle,
            2 => ErrorCode::OutOfHandles,
            3 => ErrorCode::OutOfMemory,
            4 => ErrorCode::IllegalArgs,
            5 => ErrorCode::Fault,
            6 => ErrorCode::ProtocolViolation,
            7 => ErrorCode::EndOfLane,
            _ => return None,
        };
        Some(code)
    }

    /// Returns the wire value
    pub fn as_raw(&self) -> i32 {
        *self as i32
    }

    pub fn is_success(&self) -> bool {
        *self == ErrorCode::Success
    }

    /// True when the failure was caused by the remote side misbehaving
    ///
    /// Servers use this to tell "abort this request" apart from "the lane is
    /// gone, stop serving".
    pub fn is_remote_error(&self) -> bool {
        matches!(self, ErrorCode::ProtocolViolation)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Success => "success",
            ErrorCode::InvalidHandle => "invalid handle",
            ErrorCode::OutOfHandles => "out of handles",
            ErrorCode::OutOfMemory => "out of memory",
            ErrorCode::IllegalArgs => "illegal arguments",
            ErrorCode::Fault => "fault",
            ErrorCode::ProtocolViolation => "protocol violation",
            ErrorCode::EndOfLane => "end of lane",
        };
        write!(f, "{}", name)
    }
}

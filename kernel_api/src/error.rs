//! Kernel error types

use core_types::{AccessError, Handle};
use ipc::{ErrorCode, MarshalError};
use thiserror::Error;

/// Errors returned synchronously by kernel calls
///
/// These are local to the caller. Failures that happen while a chain is
/// being matched are reported per action through [`ErrorCode`] instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KernelError {
    /// The handle is not live in the caller's universe
    #[error("Invalid handle: {0}")]
    InvalidHandle(Handle),

    /// The handle is live but names the wrong kind of object
    #[error("{handle} is not a {expected} descriptor")]
    WrongObjectType {
        handle: Handle,
        expected: &'static str,
    },

    /// The universe has no free slots
    #[error("Universe is out of handles")]
    OutOfHandles,

    /// An allocation was refused
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// An argument was rejected
    #[error("Illegal arguments: {0}")]
    IllegalArgs(String),

    /// User memory could not be accessed
    #[error("Memory fault: {0}")]
    Fault(#[from] AccessError),

    /// A flat submission could not be parsed
    #[error("Malformed submission: {0}")]
    Marshal(#[from] MarshalError),
}

impl KernelError {
    /// The wire code that corresponds to this error
    pub fn code(&self) -> ErrorCode {
        match self {
            KernelError::InvalidHandle(_) | KernelError::WrongObjectType { .. } => {
                ErrorCode::InvalidHandle
            }
            KernelError::OutOfHandles => ErrorCode::OutOfHandles,
            KernelError::OutOfMemory(_) => ErrorCode::OutOfMemory,
            KernelError::IllegalArgs(_) | KernelError::Marshal(_) => ErrorCode::IllegalArgs,
            KernelError::Fault(_) => ErrorCode::Fault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            KernelError::InvalidHandle(Handle::NULL).code(),
            ErrorCode::InvalidHandle
        );
        assert_eq!(KernelError::OutOfHandles.code(), ErrorCode::OutOfHandles);
        assert_eq!(
            KernelError::from(AccessError::Unmapped { address: 0 }).code(),
            ErrorCode::Fault
        );
        assert_eq!(
            KernelError::from(MarshalError::Empty).code(),
            ErrorCode::IllegalArgs
        );
    }

    #[test]
    fn test_messages() {
        let err = KernelError::WrongObjectType {
            handle: Handle::from_parts(1, 1),
            expected: "lane",
        };
        assert_eq!(err.to_string(), "Handle(1@1) is not a lane descriptor");
        assert_eq!(
            KernelError::InvalidHandle(Handle::NULL).to_string(),
            "Invalid handle: Handle(null)"
        );
    }
}

//! Result records and their wire encoding
//!
//! Each executed action produces exactly one record. Records are packed
//! back to back, little-endian, in the order the actions were submitted
//! (pre-order for nested chains). Every record starts with an 8-byte header:
//!
//! ```text
//! +------------+------------+
//! | error: i32 | reserved   |
//! +------------+------------+
//! ```
//!
//! followed by a kind-specific tail. Inline payloads are padded to
//! [`INLINE_ALIGN`] so the next record starts at a predictable offset.
//! Failed records keep the full size of their kind.

use crate::error::ErrorCode;
use core_types::{Credentials, Handle, CREDENTIALS_LEN};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Alignment of inline payloads inside the result stream
pub const INLINE_ALIGN: usize = 8;

const HEADER_LEN: usize = 8;

/// Rounds an inline payload length up to the next record boundary
pub const fn padded_len(length: usize) -> usize {
    (length + INLINE_ALIGN - 1) & !(INLINE_ALIGN - 1)
}

/// Shape of a result record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultKind {
    /// Error code only
    Simple,
    /// Error code and a handle in the receiver's universe
    Handle,
    /// Error code and a 16-byte credentials token
    Credentials,
    /// Error code and a byte count
    Length,
    /// Error code and a length-prefixed blob
    Inline,
}

/// Outcome of one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultRecord {
    Simple { error: ErrorCode },
    Handle { error: ErrorCode, handle: Handle },
    Credentials { error: ErrorCode, credentials: Credentials },
    Length { error: ErrorCode, length: u64 },
    Inline { error: ErrorCode, data: Vec<u8> },
}

impl ResultRecord {
    /// A record of the given shape carrying only an error code
    pub fn failed(kind: ResultKind, error: ErrorCode) -> Self {
        match kind {
            ResultKind::Simple => ResultRecord::Simple { error },
            ResultKind::Handle => ResultRecord::Handle {
                error,
                handle: Handle::NULL,
            },
            ResultKind::Credentials => ResultRecord::Credentials {
                error,
                credentials: Credentials::ZERO,
            },
            ResultKind::Length => ResultRecord::Length { error, length: 0 },
            ResultKind::Inline => ResultRecord::Inline {
                error,
                data: Vec::new(),
            },
        }
    }

    pub fn success() -> Self {
        ResultRecord::Simple {
            error: ErrorCode::Success,
        }
    }

    pub fn kind(&self) -> ResultKind {
        match self {
            ResultRecord::Simple { .. } => ResultKind::Simple,
            ResultRecord::Handle { .. } => ResultKind::Handle,
            ResultRecord::Credentials { .. } => ResultKind::Credentials,
            ResultRecord::Length { .. } => ResultKind::Length,
            ResultRecord::Inline { .. } => ResultKind::Inline,
        }
    }

    pub fn error(&self) -> ErrorCode {
        match self {
            ResultRecord::Simple { error }
            | ResultRecord::Handle { error, .. }
            | ResultRecord::Credentials { error, .. }
            | ResultRecord::Length { error, .. }
            | ResultRecord::Inline { error, .. } => *error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error().is_success()
    }

    /// The delivered handle, if this is a successful handle record
    pub fn handle(&self) -> Option<Handle> {
        match self {
            ResultRecord::Handle { error, handle } if error.is_success() => Some(*handle),
            _ => None,
        }
    }

    /// The copied byte count, if this is a successful length record
    ///
    /// Compare against the capacity you supplied to detect truncation.
    pub fn length(&self) -> Option<u64> {
        match self {
            ResultRecord::Length { error, length } if error.is_success() => Some(*length),
            _ => None,
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        match self {
            ResultRecord::Credentials { error, credentials } if error.is_success() => {
                Some(*credentials)
            }
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&[u8]> {
        match self {
            ResultRecord::Inline { error, data } if error.is_success() => Some(data),
            _ => None,
        }
    }

    /// Size of this record on the wire
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN
            + match self {
                ResultRecord::Simple { .. } => 0,
                ResultRecord::Handle { .. } | ResultRecord::Length { .. } => 8,
                ResultRecord::Credentials { .. } => CREDENTIALS_LEN,
                ResultRecord::Inline { data, .. } => 8 + padded_len(data.len()),
            }
    }

    /// Appends the wire form of this record
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.error().as_raw().to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        match self {
            ResultRecord::Simple { .. } => {}
            ResultRecord::Handle { handle, .. } => {
                out.extend_from_slice(&handle.as_raw().to_le_bytes());
            }
            ResultRecord::Credentials { credentials, .. } => {
                out.extend_from_slice(credentials.as_bytes());
            }
            ResultRecord::Length { length, .. } => {
                out.extend_from_slice(&length.to_le_bytes());
            }
            ResultRecord::Inline { data, .. } => {
                out.extend_from_slice(&(data.len() as u64).to_le_bytes());
                out.extend_from_slice(data);
                out.resize(out.len() + padded_len(data.len()) - data.len(), 0);
            }
        }
    }
}

/// Errors from decoding a result stream
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Result stream truncated at offset {offset}: need {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    #[error("Unknown error code {code} at offset {offset}")]
    UnknownErrorCode { offset: usize, code: i32 },
}

/// Sequential reader over an encoded result stream
///
/// The stream carries no type tags; the reader is told which record shape
/// to expect next, exactly as the submitter knows the shape of its chain.
#[derive(Debug)]
pub struct ResultReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ResultReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::Truncated {
                offset: self.offset,
                needed: len - self.remaining(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn take_u64(&mut self) -> Result<u64, DecodeError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    /// Decodes the next record, expecting the given shape
    pub fn next_record(&mut self, kind: ResultKind) -> Result<ResultRecord, DecodeError> {
        let start = self.offset;
        let header = self.take(HEADER_LEN)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&header[..4]);
        let code = i32::from_le_bytes(raw);
        let error = ErrorCode::from_raw(code).ok_or(DecodeError::UnknownErrorCode {
            offset: start,
            code,
        })?;

        let record = match kind {
            ResultKind::Simple => ResultRecord::Simple { error },
            ResultKind::Handle => ResultRecord::Handle {
                error,
                handle: Handle::from_raw(self.take_u64()? as i64),
            },
            ResultKind::Credentials => {
                let mut token = [0u8; CREDENTIALS_LEN];
                token.copy_from_slice(self.take(CREDENTIALS_LEN)?);
                ResultRecord::Credentials {
                    error,
                    credentials: Credentials::from_bytes(token),
                }
            }
            ResultKind::Length => ResultRecord::Length {
                error,
                length: self.take_u64()?,
            },
            ResultKind::Inline => {
                let raw = self.take_u64()?;
                let length = usize::try_from(raw).unwrap_or(usize::MAX);
                if length > self.remaining() {
                    return Err(DecodeError::Truncated {
                        offset: self.offset,
                        needed: length - self.remaining(),
                    });
                }
                let padded = self.take(padded_len(length))?;
                ResultRecord::Inline {
                    error,
                    data: padded[..length].to_vec(),
                }
            }
        };
        Ok(record)
    }
}

/// Encodes a sequence of records into one result stream
pub fn encode_results(records: &[ResultRecord]) -> Vec<u8> {
    let total = records.iter().map(ResultRecord::encoded_len).sum();
    let mut out = Vec::with_capacity(total);
    for record in records {
        record.encode_into(&mut out);
    }
    out
}

/// Decodes a result stream given the expected record shapes
pub fn decode_results(kinds: &[ResultKind], bytes: &[u8]) -> Result<Vec<ResultRecord>, DecodeError> {
    let mut reader = ResultReader::new(bytes);
    kinds.iter().map(|kind| reader.next_record(*kind)).collect()
}

/// The ordered results of one completed chain
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChainResults {
    records: Vec<ResultRecord>,
}

impl ChainResults {
    pub fn new(records: Vec<ResultRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ResultRecord> {
        self.records.get(index)
    }

    /// Error code of the record at `index`
    pub fn error_at(&self, index: usize) -> Option<ErrorCode> {
        self.records.get(index).map(ResultRecord::error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResultRecord> {
        self.records.iter()
    }

    pub fn all_succeeded(&self) -> bool {
        self.records.iter().all(ResultRecord::is_success)
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ResultRecord> {
        self.records
    }

    /// Wire form of all records
    pub fn encode(&self) -> Vec<u8> {
        encode_results(&self.records)
    }
}

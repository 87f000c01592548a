//! Flat submission records
//!
//! User space hands a chain to the kernel as a flat array of fixed-size
//! records. Nesting is expressed with two flags:
//!
//! - `CHAIN`: another item follows at the same nesting level
//! - `ANCILLARY`: the items that follow form this handshake's nested chain
//!
//! `offer(send, recv), push` flattens to:
//!
//! ```text
//! [Offer  CHAIN|ANCILLARY] [Send CHAIN] [Recv] [Push]
//! ```

use crate::action::{Action, ActionKind, UserBuffer};
use bitflags::bitflags;
use core_types::Handle;
use thiserror::Error;

bitflags! {
    /// Item flags of a submission record
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ItemFlags: u32 {
        const CHAIN = 1 << 0;
        const ANCILLARY = 1 << 1;
    }
}

/// One flat submission record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionRecord {
    pub kind: ActionKind,
    pub flags: ItemFlags,
    pub buffer: u64,
    pub length: u64,
    pub handle: Handle,
}

impl ActionRecord {
    fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            flags: ItemFlags::empty(),
            buffer: 0,
            length: 0,
            handle: Handle::NULL,
        }
    }
}

/// Errors from parsing flat submission records
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum MarshalError {
    #[error("Submission contains no records")]
    Empty,

    #[error("Record {index} ends its chain but more records follow")]
    TrailingRecords { index: usize },

    #[error("Chain is cut off after record {index}")]
    Truncated { index: usize },

    #[error("Record {index} ({kind}) cannot carry a nested chain")]
    UnexpectedAncillary { index: usize, kind: ActionKind },

    #[error("Record {index} nests deeper than {limit} levels")]
    TooDeep { index: usize, limit: usize },
}

/// Deepest nesting a flat submission may express, counting the outer chain
pub const MAX_NESTING_DEPTH: usize = 32;

/// Flattens a chain into submission records (pre-order)
pub fn flatten(chain: &[Action]) -> Vec<ActionRecord> {
    let mut records = Vec::new();
    flatten_level(chain, &mut records);
    records
}

fn flatten_level(chain: &[Action], records: &mut Vec<ActionRecord>) {
    for (position, action) in chain.iter().enumerate() {
        let mut record = ActionRecord::new(action.kind());
        if position + 1 < chain.len() {
            record.flags |= ItemFlags::CHAIN;
        }
        match action {
            Action::SendBuffer(buffer) | Action::RecvBuffer(buffer) => {
                record.buffer = buffer.address;
                record.length = buffer.length;
            }
            Action::PushDescriptor(handle) => record.handle = *handle,
            Action::Offer(nested) | Action::Accept(nested) if !nested.is_empty() => {
                record.flags |= ItemFlags::ANCILLARY;
            }
            _ => {}
        }
        records.push(record);
        flatten_level(action.nested(), records);
    }
}

/// Rebuilds a chain from submission records
pub fn parse_records(records: &[ActionRecord]) -> Result<Vec<Action>, MarshalError> {
    if records.is_empty() {
        return Err(MarshalError::Empty);
    }
    let mut cursor = 0;
    let chain = parse_level(records, &mut cursor, 1)?;
    if cursor != records.len() {
        return Err(MarshalError::TrailingRecords { index: cursor - 1 });
    }
    Ok(chain)
}

fn parse_level(
    records: &[ActionRecord],
    cursor: &mut usize,
    depth: usize,
) -> Result<Vec<Action>, MarshalError> {
    let mut chain = Vec::new();
    loop {
        let index = *cursor;
        let record = records
            .get(index)
            .ok_or(MarshalError::Truncated {
                index: index.saturating_sub(1),
            })?;
        *cursor += 1;

        let ancillary = record.flags.contains(ItemFlags::ANCILLARY);
        if ancillary && !record.kind.is_handshake() {
            return Err(MarshalError::UnexpectedAncillary {
                index,
                kind: record.kind,
            });
        }
        let nested = if ancillary {
            if depth >= MAX_NESTING_DEPTH {
                return Err(MarshalError::TooDeep {
                    index,
                    limit: MAX_NESTING_DEPTH,
                });
            }
            parse_level(records, cursor, depth + 1)?
        } else {
            Vec::new()
        };

        let buffer = UserBuffer::new(record.buffer, record.length);
        chain.push(match record.kind {
            ActionKind::Offer => Action::Offer(nested),
            ActionKind::Accept => Action::Accept(nested),
            ActionKind::ImbueCredentials => Action::ImbueCredentials,
            ActionKind::ExtractCredentials => Action::ExtractCredentials,
            ActionKind::SendBuffer => Action::SendBuffer(buffer),
            ActionKind::RecvBuffer => Action::RecvBuffer(buffer),
            ActionKind::RecvInline => Action::RecvInline,
            ActionKind::PushDescriptor => Action::PushDescriptor(record.handle),
            ActionKind::PullDescriptor => Action::PullDescriptor,
        });

        if !record.flags.contains(ItemFlags::CHAIN) {
            return Ok(chain);
        }
    }
}

//! Chain matching
//!
//! Two chains, one from each lane, are walked in lock-step. Each pair of
//! actions must be compatible:
//!
//! | Lane A               | Lane B                          | Effect |
//! |----------------------|---------------------------------|--------|
//! | `Offer`              | `Accept`                        | new stream, one lane to each side |
//! | `ImbueCredentials`   | `ExtractCredentials`            | imbuer's token to the extractor |
//! | `SendBuffer`         | `RecvBuffer`                    | byte copy, receiver learns the count |
//! | `SendBuffer`         | `RecvInline`                    | bytes staged into the receiver's results |
//! | `PushDescriptor`     | `PullDescriptor`                | duplicate attached in the puller's universe |
//!
//! The first incompatible pair, and every action after it on both sides,
//! fails with `ProtocolViolation`. Pairs executed before that keep their
//! effects. Extra actions on the longer chain fail the same way.
//!
//! Handshakes recurse: the nested chains of an `Offer`/`Accept` pair are
//! matched before the new lanes are handed out, and a violation inside them
//! aborts the enclosing chains too. Results are in pre-order, so a
//! handshake's record precedes those of its nested chain.
//!
//! Faults and resource errors affect only the pair they happen in.

use crate::accessor::{transfer, ForeignSpaceAccessor};
use crate::chain::{fail_actions, PendingChain, PreparedAction, Submitter};
use crate::object::AnyDescriptor;
use crate::state::KernelCore;
use crate::stream::Stream;
use core_types::{AccessError, AccessKind};
use ipc::{ErrorCode, ResultKind, ResultRecord, UserBuffer};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Lane0,
    Lane1,
}

impl Side {
    fn other(self) -> Side {
        match self {
            Side::Lane0 => Side::Lane1,
            Side::Lane1 => Side::Lane0,
        }
    }
}

enum PairOutcome {
    Done,
    Incompatible,
    NestedViolation,
}

struct Executor<'a> {
    core: &'a Arc<KernelCore>,
    submitters: [&'a Submitter; 2],
    results: [Vec<ResultRecord>; 2],
}

/// Executes two chains against each other
///
/// Returns the result records for the lane 0 chain and the lane 1 chain.
pub(crate) fn execute(
    core: &Arc<KernelCore>,
    lane0: &PendingChain,
    lane1: &PendingChain,
) -> (Vec<ResultRecord>, Vec<ResultRecord>) {
    let mut executor = Executor {
        core,
        submitters: [lane0.submitter(), lane1.submitter()],
        results: [Vec::new(), Vec::new()],
    };
    executor.match_level(lane0.actions(), lane1.actions());
    let [records0, records1] = executor.results;
    (records0, records1)
}

impl<'a> Executor<'a> {
    fn out(&mut self, side: Side) -> &mut Vec<ResultRecord> {
        &mut self.results[side as usize]
    }

    fn submitter(&self, side: Side) -> &'a Submitter {
        self.submitters[side as usize]
    }

    /// Returns true if a violation aborted this level
    fn match_level(&mut self, lane0: &[PreparedAction], lane1: &[PreparedAction]) -> bool {
        let paired = lane0.len().min(lane1.len());
        for index in 0..paired {
            match self.execute_pair(&lane0[index], &lane1[index]) {
                PairOutcome::Done => {}
                PairOutcome::Incompatible => {
                    self.abort(&lane0[index..], &lane1[index..]);
                    return true;
                }
                PairOutcome::NestedViolation => {
                    self.abort(&lane0[index + 1..], &lane1[index + 1..]);
                    return true;
                }
            }
        }
        if lane0.len() != lane1.len() {
            self.abort(&lane0[paired..], &lane1[paired..]);
            return true;
        }
        false
    }

    fn abort(&mut self, lane0: &[PreparedAction], lane1: &[PreparedAction]) {
        fail_actions(lane0, ErrorCode::ProtocolViolation, self.out(Side::Lane0));
        fail_actions(lane1, ErrorCode::ProtocolViolation, self.out(Side::Lane1));
    }

    fn execute_pair(&mut self, a: &PreparedAction, b: &PreparedAction) -> PairOutcome {
        use PreparedAction::*;

        match (a, b) {
            (Offer(nested0), Accept(nested1)) => self.handshake(Side::Lane0, nested0, nested1),
            (Accept(nested0), Offer(nested1)) => self.handshake(Side::Lane1, nested0, nested1),
            (ImbueCredentials, ExtractCredentials) => self.credentials(Side::Lane0),
            (ExtractCredentials, ImbueCredentials) => self.credentials(Side::Lane1),
            (SendBuffer(send), RecvBuffer(recv)) => self.copy_buffer(Side::Lane0, *send, *recv),
            (RecvBuffer(recv), SendBuffer(send)) => self.copy_buffer(Side::Lane1, *send, *recv),
            (SendBuffer(send), RecvInline) => self.copy_inline(Side::Lane0, *send),
            (RecvInline, SendBuffer(send)) => self.copy_inline(Side::Lane1, *send),
            (PushDescriptor(descriptor), PullDescriptor) => self.pull(Side::Lane0, descriptor),
            (PullDescriptor, PushDescriptor(descriptor)) => self.pull(Side::Lane1, descriptor),
            _ => PairOutcome::Incompatible,
        }
    }

    fn handshake(
        &mut self,
        offerer: Side,
        nested0: &[PreparedAction],
        nested1: &[PreparedAction],
    ) -> PairOutcome {
        let slot0 = self.results[0].len();
        let slot1 = self.results[1].len();
        self.results[0].push(ResultRecord::failed(ResultKind::Handle, ErrorCode::Success));
        self.results[1].push(ResultRecord::failed(ResultKind::Handle, ErrorCode::Success));

        let (offered, accepted) = Stream::create(self.core);
        let violated = self.match_level(nested0, nested1);

        let acceptor = offerer.other();
        let offer_record = attach(self.submitter(offerer), AnyDescriptor::Lane(offered));
        let accept_record = attach(self.submitter(acceptor), AnyDescriptor::Lane(accepted));
        let slots = [slot0, slot1];
        self.results[offerer as usize][slots[offerer as usize]] = offer_record;
        self.results[acceptor as usize][slots[acceptor as usize]] = accept_record;

        if violated {
            PairOutcome::NestedViolation
        } else {
            PairOutcome::Done
        }
    }

    fn credentials(&mut self, imbuer: Side) -> PairOutcome {
        let credentials = self.submitter(imbuer).credentials;
        self.out(imbuer).push(ResultRecord::success());
        self.out(imbuer.other()).push(ResultRecord::Credentials {
            error: ErrorCode::Success,
            credentials,
        });
        PairOutcome::Done
    }

    fn copy_buffer(&mut self, sender: Side, send: UserBuffer, recv: UserBuffer) -> PairOutcome {
        let receiver = sender.other();
        let count = send.length.min(recv.length);
        let validation = self.core.config.access_validation;

        let copied = ForeignSpaceAccessor::acquire(
            self.submitter(sender).space.clone(),
            send.address,
            count,
            AccessKind::Read,
            validation,
        )
        .and_then(|source| {
            let destination = ForeignSpaceAccessor::acquire(
                self.submitter(receiver).space.clone(),
                recv.address,
                count,
                AccessKind::Write,
                validation,
            )?;
            transfer(&destination, &source)
        });

        match copied {
            Ok(length) => {
                self.out(sender).push(ResultRecord::success());
                self.out(receiver).push(ResultRecord::Length {
                    error: ErrorCode::Success,
                    length,
                });
            }
            Err(_) => {
                self.out(sender)
                    .push(ResultRecord::failed(ResultKind::Simple, ErrorCode::Fault));
                self.out(receiver)
                    .push(ResultRecord::failed(ResultKind::Length, ErrorCode::Fault));
            }
        }
        PairOutcome::Done
    }

    fn copy_inline(&mut self, sender: Side, send: UserBuffer) -> PairOutcome {
        let receiver = sender.other();
        if send.length > self.core.config.max_inline_bytes as u64 {
            self.out(sender)
                .push(ResultRecord::failed(ResultKind::Simple, ErrorCode::IllegalArgs));
            self.out(receiver)
                .push(ResultRecord::failed(ResultKind::Inline, ErrorCode::IllegalArgs));
            return PairOutcome::Done;
        }

        let staged: Result<Vec<u8>, AccessError> = ForeignSpaceAccessor::acquire(
            self.submitter(sender).space.clone(),
            send.address,
            send.length,
            AccessKind::Read,
            self.core.config.access_validation,
        )
        .and_then(|source| source.read_all());

        match staged {
            Ok(data) => {
                self.out(sender).push(ResultRecord::success());
                self.out(receiver).push(ResultRecord::Inline {
                    error: ErrorCode::Success,
                    data,
                });
            }
            Err(_) => {
                self.out(sender)
                    .push(ResultRecord::failed(ResultKind::Simple, ErrorCode::Fault));
                self.out(receiver)
                    .push(ResultRecord::failed(ResultKind::Inline, ErrorCode::Fault));
            }
        }
        PairOutcome::Done
    }

    fn pull(&mut self, pusher: Side, descriptor: &AnyDescriptor) -> PairOutcome {
        let puller = pusher.other();
        match self.submitter(puller).universe.attach(descriptor.clone()) {
            Ok(handle) => {
                self.out(pusher).push(ResultRecord::success());
                self.out(puller).push(ResultRecord::Handle {
                    error: ErrorCode::Success,
                    handle,
                });
            }
            Err(err) => {
                self.out(pusher)
                    .push(ResultRecord::failed(ResultKind::Simple, err.code()));
                self.out(puller)
                    .push(ResultRecord::failed(ResultKind::Handle, err.code()));
            }
        }
        PairOutcome::Done
    }
}

fn attach(submitter: &Submitter, descriptor: AnyDescriptor) -> ResultRecord {
    match submitter.universe.attach(descriptor) {
        Ok(handle) => ResultRecord::Handle {
            error: ErrorCode::Success,
            handle,
        },
        Err(err) => ResultRecord::failed(ResultKind::Handle, err.code()),
    }
}

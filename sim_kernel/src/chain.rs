//! Submitted chains
//!
//! A chain is prepared once at submission: descriptors named by
//! `PushDescriptor` are resolved in the submitter's universe, so the chain
//! holds its own references and later changes to the submitter's table do
//! not affect it.

use crate::address_space::AddressSpace;
use crate::completion::{deliver_to_user, CompletionSlot};
use crate::config::AccessValidation;
use crate::object::AnyDescriptor;
use crate::universe::Universe;
use core_types::{ChainId, Credentials};
use ipc::{Action, ActionKind, ChainResults, ErrorCode, ResultRecord, UserBuffer};
use kernel_api::{KernelError, SubmitOptions};
use std::sync::Arc;

/// An action with its descriptor arguments resolved
#[derive(Debug, Clone)]
pub(crate) enum PreparedAction {
    Offer(Vec<PreparedAction>),
    Accept(Vec<PreparedAction>),
    ImbueCredentials,
    ExtractCredentials,
    SendBuffer(UserBuffer),
    RecvBuffer(UserBuffer),
    RecvInline,
    PushDescriptor(AnyDescriptor),
    PullDescriptor,
}

impl PreparedAction {
    fn prepare(action: &Action, universe: &Universe, levels: usize) -> Result<Self, KernelError> {
        let prepared = match action {
            Action::Offer(nested) => PreparedAction::Offer(prepare_chain(nested, universe, levels)?),
            Action::Accept(nested) => {
                PreparedAction::Accept(prepare_chain(nested, universe, levels)?)
            }
            Action::ImbueCredentials => PreparedAction::ImbueCredentials,
            Action::ExtractCredentials => PreparedAction::ExtractCredentials,
            Action::SendBuffer(buffer) => PreparedAction::SendBuffer(*buffer),
            Action::RecvBuffer(buffer) => PreparedAction::RecvBuffer(*buffer),
            Action::RecvInline => PreparedAction::RecvInline,
            Action::PushDescriptor(handle) => PreparedAction::PushDescriptor(universe.get(*handle)?),
            Action::PullDescriptor => PreparedAction::PullDescriptor,
        };
        Ok(prepared)
    }

    pub(crate) fn kind(&self) -> ActionKind {
        match self {
            PreparedAction::Offer(_) => ActionKind::Offer,
            PreparedAction::Accept(_) => ActionKind::Accept,
            PreparedAction::ImbueCredentials => ActionKind::ImbueCredentials,
            PreparedAction::ExtractCredentials => ActionKind::ExtractCredentials,
            PreparedAction::SendBuffer(_) => ActionKind::SendBuffer,
            PreparedAction::RecvBuffer(_) => ActionKind::RecvBuffer,
            PreparedAction::RecvInline => ActionKind::RecvInline,
            PreparedAction::PushDescriptor(_) => ActionKind::PushDescriptor,
            PreparedAction::PullDescriptor => ActionKind::PullDescriptor,
        }
    }

    pub(crate) fn nested(&self) -> &[PreparedAction] {
        match self {
            PreparedAction::Offer(nested) | PreparedAction::Accept(nested) => nested,
            _ => &[],
        }
    }
}

/// Resolves a chain that may nest at most `levels` deep, itself included
pub(crate) fn prepare_chain(
    chain: &[Action],
    universe: &Universe,
    levels: usize,
) -> Result<Vec<PreparedAction>, KernelError> {
    if levels == 0 && !chain.is_empty() {
        return Err(KernelError::IllegalArgs(
            "action chain is nested too deeply".to_string(),
        ));
    }
    chain
        .iter()
        .map(|action| PreparedAction::prepare(action, universe, levels - 1))
        .collect()
}

/// Appends a failed record for every action, nested ones included, in
/// pre-order
pub(crate) fn fail_actions(actions: &[PreparedAction], code: ErrorCode, out: &mut Vec<ResultRecord>) {
    for action in actions {
        out.push(ResultRecord::failed(action.kind().result_kind(), code));
        fail_actions(action.nested(), code, out);
    }
}

/// The thread a chain was submitted by
#[derive(Debug, Clone)]
pub(crate) struct Submitter {
    pub(crate) universe: Arc<Universe>,
    pub(crate) space: Arc<AddressSpace>,
    pub(crate) credentials: Credentials,
}

/// A chain waiting on a lane or being matched
///
/// Completing consumes the chain. A chain dropped without being completed
/// completes with `EndOfLane`, so its waiter is always released.
#[derive(Debug)]
pub(crate) struct PendingChain {
    id: ChainId,
    actions: Vec<PreparedAction>,
    submitter: Submitter,
    options: SubmitOptions,
    validation: AccessValidation,
    completion: Option<Arc<CompletionSlot>>,
}

impl PendingChain {
    pub(crate) fn new(
        id: ChainId,
        actions: Vec<PreparedAction>,
        submitter: Submitter,
        options: SubmitOptions,
        validation: AccessValidation,
        completion: Arc<CompletionSlot>,
    ) -> Self {
        Self {
            id,
            actions,
            submitter,
            options,
            validation,
            completion: Some(completion),
        }
    }

    pub(crate) fn id(&self) -> ChainId {
        self.id
    }

    pub(crate) fn actions(&self) -> &[PreparedAction] {
        &self.actions
    }

    pub(crate) fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Publishes the results to user memory and wakes the waiter
    pub(crate) fn complete(mut self, records: Vec<ResultRecord>) {
        self.finish(records);
    }

    /// Completes every action with `code`
    pub(crate) fn fail(mut self, code: ErrorCode) {
        let mut records = Vec::new();
        fail_actions(&self.actions, code, &mut records);
        self.finish(records);
    }

    fn finish(&mut self, records: Vec<ResultRecord>) {
        if let Some(slot) = self.completion.take() {
            let results = ChainResults::new(records);
            deliver_to_user(&self.submitter.space, &self.options, &results, self.validation);
            slot.complete(results);
        }
    }
}

impl Drop for PendingChain {
    fn drop(&mut self) {
        if self.completion.is_some() {
            let mut records = Vec::new();
            fail_actions(&self.actions, ErrorCode::EndOfLane, &mut records);
            self.finish(records);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::MemoryObject;
    use core_types::Handle;
    use ipc::ResultKind;

    #[test]
    fn test_prepare_resolves_pushes() {
        let universe = Universe::new(8);
        let memory = AnyDescriptor::Memory(Arc::new(MemoryObject::new(4).unwrap()));
        let handle = universe.attach(memory).unwrap();

        let chain = vec![
            Action::offer_with(vec![Action::push_descriptor(handle)]),
            Action::ImbueCredentials,
        ];
        let prepared = prepare_chain(&chain, &universe, 8).unwrap();
        assert_eq!(prepared[0].kind(), ActionKind::Offer);
        assert_eq!(prepared[0].nested()[0].kind(), ActionKind::PushDescriptor);
        // The chain holds its own reference
        assert_eq!(universe.ref_count(handle).unwrap(), 2);

        let stale = Handle::from_parts(5, 1);
        assert_eq!(
            prepare_chain(&[Action::push_descriptor(stale)], &universe, 8).unwrap_err(),
            KernelError::InvalidHandle(stale)
        );
    }

    #[test]
    fn test_fail_actions_is_preorder() {
        let universe = Universe::new(8);
        let chain = vec![
            Action::accept_with(vec![Action::ExtractCredentials, Action::RecvInline]),
            Action::PullDescriptor,
        ];
        let prepared = prepare_chain(&chain, &universe, 8).unwrap();

        let mut records = Vec::new();
        fail_actions(&prepared, ErrorCode::EndOfLane, &mut records);
        let kinds: Vec<ResultKind> = records.iter().map(ResultRecord::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResultKind::Handle,
                ResultKind::Credentials,
                ResultKind::Inline,
                ResultKind::Handle
            ]
        );
        assert!(records.iter().all(|r| r.error() == ErrorCode::EndOfLane));
    }

    #[test]
    fn test_prepare_limits_nesting() {
        let universe = Universe::new(8);
        let nested = |levels: usize| {
            (1..levels).fold(vec![Action::ImbueCredentials], |chain, _| {
                vec![Action::offer_with(chain)]
            })
        };

        assert!(prepare_chain(&nested(3), &universe, 3).is_ok());
        assert!(matches!(
            prepare_chain(&nested(4), &universe, 3),
            Err(KernelError::IllegalArgs(_))
        ));
        // An empty handshake adds no level
        assert!(prepare_chain(&[Action::offer()], &universe, 1).is_ok());
    }
}

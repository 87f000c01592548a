//! Chain Ordering Integration Tests
//!
//! These tests validate how chains on the two lanes of a stream pair up:
//! - Lock-step matching up to the first mismatch
//! - Strict FIFO pairing across interleavings
//! - Violations never hurt the local side beyond the reported records

use ipc::{Action, ChainResults, ErrorCode};
use kernel_api::KernelApi;
use sim_kernel::IpcAuditEvent;
use std::sync::{Arc, Barrier};
use std::thread;
use tests_resilience::{connected_threads, test_bootstrap};

fn errors(results: &ChainResults) -> Vec<ErrorCode> {
    results.iter().map(|r| r.error()).collect()
}

#[test]
fn test_matched_pairs_equal_shorter_chain() {
    let kernel = test_bootstrap();
    let (a, b) = connected_threads(&kernel).unwrap();

    let waiting = a
        .thread
        .submit(
            a.lane,
            vec![
                Action::ImbueCredentials,
                Action::ExtractCredentials,
                Action::ImbueCredentials,
                Action::ImbueCredentials,
            ],
        )
        .unwrap();
    let theirs = b
        .thread
        .exchange(
            b.lane,
            vec![Action::ExtractCredentials, Action::ImbueCredentials],
        )
        .unwrap();
    let ours = waiting.wait();

    assert_eq!(theirs.len(), 2);
    assert!(theirs.all_succeeded());
    assert_eq!(
        errors(&ours),
        vec![
            ErrorCode::Success,
            ErrorCode::Success,
            ErrorCode::ProtocolViolation,
            ErrorCode::ProtocolViolation
        ]
    );
}

#[test]
fn test_mismatch_keeps_earlier_results() {
    let kernel = test_bootstrap();
    let (a, b) = connected_threads(&kernel).unwrap();

    let waiting = a
        .thread
        .submit(
            a.lane,
            vec![
                Action::ImbueCredentials,
                Action::ExtractCredentials,
                Action::PullDescriptor,
            ],
        )
        .unwrap();
    let theirs = b
        .thread
        .exchange(
            b.lane,
            vec![
                Action::ExtractCredentials,
                Action::RecvInline,
                Action::ImbueCredentials,
            ],
        )
        .unwrap();
    let ours = waiting.wait();

    assert_eq!(
        errors(&ours),
        vec![
            ErrorCode::Success,
            ErrorCode::ProtocolViolation,
            ErrorCode::ProtocolViolation
        ]
    );
    assert_eq!(
        errors(&theirs),
        vec![
            ErrorCode::Success,
            ErrorCode::ProtocolViolation,
            ErrorCode::ProtocolViolation
        ]
    );
    // The pair before the mismatch took effect
    assert_eq!(
        theirs.get(0).unwrap().credentials(),
        Some(a.thread.credentials())
    );
    assert!(ErrorCode::ProtocolViolation.is_remote_error());
}

#[test]
fn test_violation_does_not_break_the_stream() {
    let kernel = test_bootstrap();
    let (a, b) = connected_threads(&kernel).unwrap();

    let waiting = a.thread.submit(a.lane, vec![Action::PullDescriptor]).unwrap();
    b.thread
        .exchange(b.lane, vec![Action::ImbueCredentials])
        .unwrap();
    assert_eq!(waiting.wait().error_at(0), Some(ErrorCode::ProtocolViolation));

    let waiting = a
        .thread
        .submit(a.lane, vec![Action::ExtractCredentials])
        .unwrap();
    assert!(b
        .thread
        .exchange(b.lane, vec![Action::ImbueCredentials])
        .unwrap()
        .all_succeeded());
    assert!(waiting.wait().all_succeeded());
}

#[test]
fn test_fifo_when_one_side_submits_everything_first() {
    let kernel = test_bootstrap();
    let (a, b) = connected_threads(&kernel).unwrap();

    let c1 = a.thread.submit(a.lane, vec![Action::ImbueCredentials]).unwrap();
    let c2 = a
        .thread
        .submit(a.lane, vec![Action::ImbueCredentials, Action::ImbueCredentials])
        .unwrap();

    // D1 has one action, D2 two: a C1 x D2 pairing would show up as a violation
    let d1 = b
        .thread
        .exchange(b.lane, vec![Action::ExtractCredentials])
        .unwrap();
    let d2 = b
        .thread
        .exchange(
            b.lane,
            vec![Action::ExtractCredentials, Action::ExtractCredentials],
        )
        .unwrap();

    assert!(c1.wait().all_succeeded());
    assert!(c2.wait().all_succeeded());
    assert!(d1.all_succeeded());
    assert!(d2.all_succeeded());
}

#[test]
fn test_fifo_under_interleaving() {
    let kernel = test_bootstrap();
    let (a, b) = connected_threads(&kernel).unwrap();

    // A: C1, B: D1, B: D2, A: C2
    let c1 = a.thread.submit(a.lane, vec![Action::ImbueCredentials]).unwrap();
    let d1 = b
        .thread
        .submit(b.lane, vec![Action::ExtractCredentials])
        .unwrap();
    let d2 = b
        .thread
        .submit(b.lane, vec![Action::RecvInline, Action::ExtractCredentials])
        .unwrap();
    let c2 = a.thread.submit(a.lane, vec![Action::PullDescriptor]).unwrap();

    assert!(c1.wait().all_succeeded());
    assert!(d1.wait().all_succeeded());
    // C2 x D2 is a mismatch, which proves D2 was not paired with C1
    assert_eq!(c2.wait().error_at(0), Some(ErrorCode::ProtocolViolation));
    assert_eq!(d2.wait().len(), 2);
}

#[test]
fn test_fifo_with_concurrent_submitters() {
    const CHAINS: usize = 64;
    let kernel = test_bootstrap();
    let (a, b) = connected_threads(&kernel).unwrap();
    let barrier = Arc::new(Barrier::new(2));

    let sender = {
        let barrier = barrier.clone();
        let a = a.clone();
        thread::spawn(move || {
            barrier.wait();
            (0..CHAINS)
                .map(|_| {
                    a.thread
                        .submit(a.lane, vec![Action::ImbueCredentials])
                        .unwrap()
                })
                .collect::<Vec<_>>()
        })
    };
    let receiver = {
        let barrier = barrier.clone();
        let b = b.clone();
        thread::spawn(move || {
            barrier.wait();
            (0..CHAINS)
                .map(|_| {
                    b.thread
                        .submit(b.lane, vec![Action::ExtractCredentials])
                        .unwrap()
                })
                .collect::<Vec<_>>()
        })
    };

    let sent: Vec<_> = sender.join().unwrap();
    let received: Vec<_> = receiver.join().unwrap();
    let sent_ids: Vec<_> = sent.iter().map(|s| s.id()).collect();
    let received_ids: Vec<_> = received.iter().map(|s| s.id()).collect();
    for submission in sent.into_iter().chain(received) {
        assert!(submission.wait().all_succeeded());
    }

    // The Nth chain of each side was paired with the Nth chain of the other
    let stream = kernel
        .audit_log()
        .get_events()
        .iter()
        .find_map(|record| match &record.event {
            IpcAuditEvent::ChainMatched { stream, .. } => Some(*stream),
            _ => None,
        })
        .unwrap();
    let pairs = kernel.audit_log().matched_pairs(stream);
    assert_eq!(pairs.len(), CHAINS);
    for (n, (lane0, lane1)) in pairs.into_iter().enumerate() {
        let (mine, theirs) = if sent_ids.contains(&lane0) {
            (lane0, lane1)
        } else {
            (lane1, lane0)
        };
        assert_eq!(mine, sent_ids[n]);
        assert_eq!(theirs, received_ids[n]);
    }
}

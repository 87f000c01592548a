//! Handshake Integration Tests
//!
//! Offer/Accept pairs open new streams mid-match. These tests cover the
//! nested chains that ride along with a handshake and the request/response
//! pattern services build on top of it.

use core_types::Handle;
use ipc::{Action, ChainResults, ErrorCode, ResultKind};
use kernel_api::KernelApi;
use sim_kernel::{IpcAuditEvent, Thread};
use std::thread;
use tests_resilience::{connected_threads, map_bytes, map_empty, test_bootstrap};

fn handle_at(results: &ChainResults, index: usize) -> Handle {
    results.get(index).unwrap().handle().unwrap()
}

#[test]
fn test_offer_accept_opens_a_stream() {
    let kernel = test_bootstrap();
    let (client, server) = connected_threads(&kernel).unwrap();

    let offer = client
        .thread
        .submit(client.lane, vec![Action::offer()])
        .unwrap();
    let accepted = server
        .thread
        .exchange(server.lane, vec![Action::accept()])
        .unwrap();
    let offered = offer.wait();

    let client_end = handle_at(&offered, 0);
    let server_end = handle_at(&accepted, 0);
    assert_eq!(
        kernel
            .audit_log()
            .count_events(|e| matches!(e, IpcAuditEvent::StreamCreated { .. })),
        2
    );

    let waiting = server
        .thread
        .submit(server_end, vec![Action::ExtractCredentials])
        .unwrap();
    client
        .thread
        .exchange(client_end, vec![Action::ImbueCredentials])
        .unwrap();
    assert_eq!(
        waiting.wait().get(0).unwrap().credentials(),
        Some(client.thread.credentials())
    );
}

#[test]
fn test_nested_chain_results_follow_handshake() {
    let kernel = test_bootstrap();
    let (client, server) = connected_threads(&kernel).unwrap();
    let path = map_bytes(&client.thread, 0x10000, b"/config/net").unwrap();

    let offer = client
        .thread
        .submit(
            client.lane,
            vec![
                Action::offer_with(vec![
                    Action::ImbueCredentials,
                    Action::send_buffer(path.address, path.length),
                ]),
                Action::ImbueCredentials,
            ],
        )
        .unwrap();
    let accepted = server
        .thread
        .exchange(
            server.lane,
            vec![
                Action::accept_with(vec![Action::ExtractCredentials, Action::RecvInline]),
                Action::ExtractCredentials,
            ],
        )
        .unwrap();
    let offered = offer.wait();

    let kinds: Vec<ResultKind> = accepted.iter().map(|r| r.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            ResultKind::Handle,
            ResultKind::Credentials,
            ResultKind::Inline,
            ResultKind::Credentials
        ]
    );
    assert!(accepted.all_succeeded());
    assert_eq!(accepted.get(2).unwrap().data(), Some(&b"/config/net"[..]));
    assert_eq!(offered.len(), 4);
    assert!(offered.all_succeeded());
}

#[test]
fn test_doubly_nested_handshake() {
    let kernel = test_bootstrap();
    let (a, b) = connected_threads(&kernel).unwrap();

    let offer = a
        .thread
        .submit(
            a.lane,
            vec![Action::offer_with(vec![Action::offer_with(vec![
                Action::ImbueCredentials,
            ])])],
        )
        .unwrap();
    let accepted = b
        .thread
        .exchange(
            b.lane,
            vec![Action::accept_with(vec![Action::accept_with(vec![
                Action::ExtractCredentials,
            ])])],
        )
        .unwrap();
    let offered = offer.wait();

    assert_eq!(offered.len(), 3);
    assert_eq!(accepted.len(), 3);
    assert!(offered.all_succeeded());
    assert_eq!(
        accepted.get(2).unwrap().credentials(),
        Some(a.thread.credentials())
    );
    // Two handshakes, two new streams, each side holding one lane of each
    assert_eq!(a.thread.process().universe().len(), 3);
    assert_eq!(b.thread.process().universe().len(), 3);
}

#[test]
fn test_violation_inside_handshake_aborts_outer_chain() {
    let kernel = test_bootstrap();
    let (a, b) = connected_threads(&kernel).unwrap();

    let offer = a
        .thread
        .submit(
            a.lane,
            vec![
                Action::offer_with(vec![Action::ImbueCredentials]),
                Action::ImbueCredentials,
            ],
        )
        .unwrap();
    let accepted = b
        .thread
        .exchange(
            b.lane,
            vec![
                Action::accept_with(vec![Action::PullDescriptor]),
                Action::ExtractCredentials,
            ],
        )
        .unwrap();
    let offered = offer.wait();

    for results in [&offered, &accepted] {
        assert_eq!(results.error_at(0), Some(ErrorCode::Success));
        assert_eq!(results.error_at(1), Some(ErrorCode::ProtocolViolation));
        assert_eq!(results.error_at(2), Some(ErrorCode::ProtocolViolation));
    }
}

/// Serves `requests` lookups: each request opens a private stream carrying
/// the caller's identity and key, and the reply goes back over that stream.
fn serve(server: Thread, lane: Handle, requests: usize) {
    map_empty(&server, 0x40000, 64).unwrap();
    for _ in 0..requests {
        let request = server
            .exchange(
                lane,
                vec![Action::accept_with(vec![
                    Action::ExtractCredentials,
                    Action::RecvInline,
                ])],
            )
            .unwrap();
        let reply_lane = handle_at(&request, 0);
        let key = request.get(2).unwrap().data().unwrap().to_vec();

        let value = format!("value-of-{}", String::from_utf8_lossy(&key));
        server
            .process()
            .address_space()
            .write_bytes(0x40000, value.as_bytes())
            .unwrap();
        let reply = server
            .exchange(
                reply_lane,
                vec![Action::send_buffer(0x40000, value.len() as u64)],
            )
            .unwrap();
        assert!(reply.all_succeeded());
        server.close_descriptor(reply_lane).unwrap();
    }
}

fn lookup(client: &Thread, lane: Handle, key: &str, scratch: u64) -> String {
    let key_buffer = map_bytes(client, scratch, key.as_bytes()).unwrap();
    let reply_buffer = map_empty(client, scratch + 0x1000, 64).unwrap();

    let opened = client
        .exchange(
            lane,
            vec![Action::offer_with(vec![
                Action::ImbueCredentials,
                Action::send_buffer(key_buffer.address, key_buffer.length),
            ])],
        )
        .unwrap();
    assert!(opened.all_succeeded());
    let reply_lane = handle_at(&opened, 0);

    let reply = client
        .exchange(
            reply_lane,
            vec![Action::recv_buffer(reply_buffer.address, reply_buffer.length)],
        )
        .unwrap();
    let length = reply.get(0).unwrap().length().unwrap() as usize;
    let bytes = client
        .process()
        .address_space()
        .read_bytes(reply_buffer.address, length)
        .unwrap();
    client.close_descriptor(reply_lane).unwrap();
    String::from_utf8(bytes).unwrap()
}

#[test]
fn test_request_response_service() {
    let kernel = test_bootstrap();
    let (client, server) = connected_threads(&kernel).unwrap();

    let service = {
        let thread = server.thread.clone();
        thread::spawn(move || serve(thread, server.lane, 3))
    };

    assert_eq!(lookup(&client.thread, client.lane, "alpha", 0x10000), "value-of-alpha");
    assert_eq!(lookup(&client.thread, client.lane, "beta", 0x20000), "value-of-beta");
    assert_eq!(lookup(&client.thread, client.lane, "gamma", 0x30000), "value-of-gamma");
    service.join().unwrap();

    // Every private stream was torn down after its reply
    assert_eq!(client.thread.process().universe().len(), 1);
    assert_eq!(server.thread.process().universe().len(), 1);
}

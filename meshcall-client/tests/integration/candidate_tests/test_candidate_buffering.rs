use meshcall_client::{NegotiationState::*, SdpKind};
use meshcall_core::{ClientMessage, IceCandidate};

use crate::integration::init_tracing;
use crate::utils::{LoopbackMesh, MockOp, SIGNAL_TIMEOUT_MS, wait_until};

fn candidate(n: u32) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n} 1 udp 2122260223 192.168.1.{n} 5000{n} typ host"),
        sdp_mid: Some("0".into()),
        sdp_m_line_index: Some(0),
    }
}

#[tokio::test]
async fn test_candidates_before_answer() {
    init_tracing();

    let mesh = LoopbackMesh::new();
    let mut alice = mesh.client("alice");
    let mut bob = mesh.raw("bob");

    alice.join("r1").await.unwrap();
    bob.join("r1").await.unwrap();
    bob.recv_event("offer").await.unwrap();
    alice.wait_state(bob.handle, OfferSent).await.unwrap();

    for c in [candidate(1), candidate(2)] {
        bob.send(ClientMessage::IceCandidate {
            target: alice.handle,
            candidate: c,
        })
        .await;
    }
    bob.send(ClientMessage::Answer {
        target: alice.handle,
        sdp: "answer".into(),
    })
    .await;

    alice.wait_connected(bob.handle).await.unwrap();
    wait_until(SIGNAL_TIMEOUT_MS, || async { alice.engine.candidates_from(bob.handle).len() == 2 })
        .await
        .expect("buffered candidates applied");

    // Nothing reaches the connection before the remote description.
    let ops: Vec<MockOp> = alice
        .engine
        .ops(bob.handle)
        .into_iter()
        .filter(|op| matches!(op, MockOp::RemoteDescription(_) | MockOp::Candidate(_)))
        .collect();
    assert_eq!(
        ops,
        vec![
            MockOp::RemoteDescription(SdpKind::Answer),
            MockOp::Candidate(candidate(1)),
            MockOp::Candidate(candidate(2)),
        ]
    );
}

#[tokio::test]
async fn test_duplicate_candidate() {
    init_tracing();

    let mesh = LoopbackMesh::new();
    let mut alice = mesh.client("alice");
    let mut bob = mesh.raw("bob");

    alice.join("r1").await.unwrap();
    bob.join("r1").await.unwrap();
    bob.recv_event("offer").await.unwrap();
    bob.send(ClientMessage::Answer {
        target: alice.handle,
        sdp: "answer".into(),
    })
    .await;
    alice.wait_connected(bob.handle).await.unwrap();

    for c in [candidate(1), candidate(2), candidate(1), candidate(3)] {
        bob.send(ClientMessage::IceCandidate {
            target: alice.handle,
            candidate: c,
        })
        .await;
    }

    wait_until(SIGNAL_TIMEOUT_MS, || async { alice.engine.candidates_from(bob.handle).len() >= 3 })
        .await
        .unwrap();
    assert_eq!(
        alice.engine.candidates_from(bob.handle),
        vec![candidate(1), candidate(2), candidate(3)]
    );
}

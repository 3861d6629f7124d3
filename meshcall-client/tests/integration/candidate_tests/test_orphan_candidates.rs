use meshcall_client::ClientConfig;
use meshcall_core::{IceCandidate, Participant, ParticipantId, ServerMessage};
use std::time::Duration;

use crate::integration::init_tracing;
use crate::utils::{LoopbackMesh, MockEngine, SIGNAL_TIMEOUT_MS, wait_until};

fn candidate(n: u32) -> IceCandidate {
    IceCandidate::new(format!("candidate:{n} 1 udp 1686052607 203.0.113.{n} 6000{n} typ srflx"))
}

#[tokio::test]
async fn test_orphan_candidates_replayed() {
    init_tracing();

    let mesh = LoopbackMesh::new();
    let mut alice = mesh.client("alice");
    alice.join("r1").await.unwrap();

    // Candidate from a peer alice has not heard of yet.
    let xavier = ParticipantId::new();
    alice.inject(ServerMessage::IceCandidate {
        candidate: candidate(1),
        sender: xavier,
    });
    alice.inject(ServerMessage::UserJoined(Participant::new(xavier, "xavier")));
    alice.inject(ServerMessage::Answer {
        sdp: "answer".into(),
        sender: xavier,
    });

    alice.wait_connected(xavier).await.unwrap();
    wait_until(SIGNAL_TIMEOUT_MS, || async { !alice.engine.candidates_from(xavier).is_empty() })
        .await
        .expect("orphan candidate replayed");
    assert_eq!(alice.engine.candidates_from(xavier), vec![candidate(1)]);
}

#[tokio::test]
async fn test_orphans_dropped_on_departure() {
    init_tracing();

    let mesh = LoopbackMesh::new();
    let mut alice = mesh.client("alice");
    alice.join("r1").await.unwrap();

    let yolanda = ParticipantId::new();
    alice.inject(ServerMessage::IceCandidate {
        candidate: candidate(2),
        sender: yolanda,
    });
    alice.inject(ServerMessage::UserLeft(yolanda));

    alice.inject(ServerMessage::UserJoined(Participant::new(yolanda, "yolanda")));
    alice.inject(ServerMessage::Answer {
        sdp: "answer".into(),
        sender: yolanda,
    });
    alice.wait_connected(yolanda).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(alice.engine.candidates_from(yolanda).is_empty());
}

#[tokio::test]
async fn test_orphan_buffer_is_bounded() {
    init_tracing();

    let mesh = LoopbackMesh::new();
    let config = ClientConfig {
        orphan_candidate_limit: 2,
        ..Default::default()
    };
    let mut alice = mesh.client_with("alice", MockEngine::new(), config);
    alice.join("r1").await.unwrap();

    let zed = ParticipantId::new();
    for n in 1..=4 {
        alice.inject(ServerMessage::IceCandidate {
            candidate: candidate(n),
            sender: zed,
        });
    }
    alice.inject(ServerMessage::UserJoined(Participant::new(zed, "zed")));
    alice.inject(ServerMessage::Answer {
        sdp: "answer".into(),
        sender: zed,
    });
    alice.wait_connected(zed).await.unwrap();

    wait_until(SIGNAL_TIMEOUT_MS, || async { alice.engine.candidates_from(zed).len() == 2 })
        .await
        .unwrap();
    // Oldest candidates are dropped first.
    assert_eq!(alice.engine.candidates_from(zed), vec![candidate(3), candidate(4)]);
}

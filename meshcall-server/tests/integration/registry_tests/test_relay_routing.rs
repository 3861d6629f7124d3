use meshcall_core::{IceCandidate, Participant, ParticipantId, RoomId, ServerMessage};

use crate::integration::{create_test_registry, init_tracing};

#[tokio::test]
async fn test_offer_is_forwarded_with_sender() {
    init_tracing();

    let (registry, signaling) = create_test_registry();
    let room = RoomId::from("r1");
    let a = Participant::new(ParticipantId::new(), "alice");
    let b = Participant::new(ParticipantId::new(), "bob");
    registry.join(&room, a.clone()).await.unwrap();
    registry.join(&room, b.clone()).await.unwrap();
    signaling.clear().await;

    let offer = ServerMessage::Offer {
        sdp: "v=0 offer".into(),
        sender: a.handle,
    };
    registry.relay(a.handle, b.handle, offer.clone()).await;
    // Members is queued behind the relay and acts as a barrier.
    registry.members(&room).await;

    assert_eq!(signaling.messages_for(&b.handle).await, vec![offer]);
    assert!(signaling.messages_for(&a.handle).await.is_empty());
}

#[tokio::test]
async fn test_relay_to_absent_target_is_dropped() {
    init_tracing();

    let (registry, signaling) = create_test_registry();
    let room = RoomId::from("r1");
    let a = Participant::new(ParticipantId::new(), "alice");
    let b = Participant::new(ParticipantId::new(), "bob");
    registry.join(&room, a.clone()).await.unwrap();
    registry.join(&room, b.clone()).await.unwrap();
    registry.leave(b.handle).await;
    registry.members(&room).await;
    signaling.clear().await;

    let candidate = ServerMessage::IceCandidate {
        candidate: IceCandidate::new("candidate:1"),
        sender: a.handle,
    };
    registry.relay(a.handle, b.handle, candidate).await;
    registry.members(&room).await;

    assert!(signaling.messages_for(&b.handle).await.is_empty());
    assert!(signaling.messages_for(&a.handle).await.is_empty());
}

#[tokio::test]
async fn test_relay_never_crosses_rooms() {
    init_tracing();

    let (registry, signaling) = create_test_registry();
    let a = Participant::new(ParticipantId::new(), "alice");
    let b = Participant::new(ParticipantId::new(), "bob");
    registry.join(&RoomId::from("r1"), a.clone()).await.unwrap();
    registry.join(&RoomId::from("r2"), b.clone()).await.unwrap();
    signaling.clear().await;

    let answer = ServerMessage::Answer {
        sdp: "v=0 answer".into(),
        sender: a.handle,
    };
    registry.relay(a.handle, b.handle, answer).await;
    registry.members(&RoomId::from("r1")).await;
    registry.members(&RoomId::from("r2")).await;

    assert!(signaling.messages_for(&b.handle).await.is_empty());
}

#[tokio::test]
async fn test_relay_from_unjoined_sender_is_ignored() {
    init_tracing();

    let (registry, signaling) = create_test_registry();
    let room = RoomId::from("r1");
    let a = Participant::new(ParticipantId::new(), "alice");
    registry.join(&room, a.clone()).await.unwrap();
    signaling.clear().await;

    let stranger = ParticipantId::new();
    let offer = ServerMessage::Offer {
        sdp: "v=0".into(),
        sender: stranger,
    };
    registry.relay(stranger, a.handle, offer).await;
    registry.members(&room).await;

    assert!(signaling.messages_for(&a.handle).await.is_empty());
}

#[tokio::test]
async fn test_relay_preserves_per_target_order() {
    init_tracing();

    let (registry, signaling) = create_test_registry();
    let room = RoomId::from("r1");
    let a = Participant::new(ParticipantId::new(), "alice");
    let b = Participant::new(ParticipantId::new(), "bob");
    registry.join(&room, a.clone()).await.unwrap();
    registry.join(&room, b.clone()).await.unwrap();
    signaling.clear().await;

    for i in 0..20 {
        let msg = ServerMessage::IceCandidate {
            candidate: IceCandidate::new(format!("candidate:{i}")),
            sender: a.handle,
        };
        registry.relay(a.handle, b.handle, msg).await;
    }
    registry.members(&room).await;

    let received: Vec<String> = signaling
        .messages_for(&b.handle)
        .await
        .into_iter()
        .filter_map(|m| match m {
            ServerMessage::IceCandidate { candidate, .. } => Some(candidate.candidate),
            _ => None,
        })
        .collect();
    let expected: Vec<String> = (0..20).map(|i| format!("candidate:{i}")).collect();
    assert_eq!(received, expected);
}

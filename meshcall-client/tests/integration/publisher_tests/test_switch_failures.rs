use meshcall_client::{CaptureError, CaptureSource, ClientError, MediaTrack, TrackKind};

use super::publishing_trio;
use crate::integration::init_tracing;
use crate::utils::{LoopbackMesh, MockOp};

#[tokio::test]
async fn test_switch_capture_failure() {
    init_tracing();

    let mesh = LoopbackMesh::new();
    let (alice, bob, carol) = publishing_trio(&mesh).await.unwrap();
    let publisher = alice.client.publisher();
    let camera = publisher.video_track().unwrap();

    alice.engine.deny(CaptureSource::Screen);
    let err = publisher.start_screen_share().await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Capture(CaptureError::PermissionDenied(CaptureSource::Screen))
    ));

    assert_eq!(publisher.active_video_source(), Some(CaptureSource::Camera));
    assert!(!camera.is_stopped());
    for peer in [bob.handle, carol.handle] {
        assert!(!alice.engine.ops(peer).iter().any(|op| matches!(op, MockOp::Replace { .. })));
        assert_eq!(alice.engine.sending(peer, TrackKind::Video).as_deref(), Some(camera.id()));
    }
}

#[tokio::test]
async fn test_switch_rollback() {
    init_tracing();

    let mesh = LoopbackMesh::new();
    let (alice, bob, carol) = publishing_trio(&mesh).await.unwrap();
    let publisher = alice.client.publisher();
    let camera = publisher.video_track().unwrap();

    alice.engine.fail_replace_for(carol.handle);
    let err = publisher.start_screen_share().await.unwrap_err();
    assert!(matches!(err, ClientError::ReplaceFailed { peer, .. } if peer == carol.handle));

    // bob briefly got the screen and was put back on the camera.
    let video_ops: Vec<Option<String>> = alice
        .engine
        .ops(bob.handle)
        .into_iter()
        .filter_map(|op| match op {
            MockOp::Replace {
                kind: TrackKind::Video,
                track,
            } => Some(track),
            _ => None,
        })
        .collect();
    assert_eq!(video_ops.len(), 2);
    assert!(video_ops[0].as_deref().is_some_and(|id| id.starts_with("screen")));
    assert_eq!(video_ops[1].as_deref(), Some(camera.id()));

    for peer in [bob.handle, carol.handle] {
        assert_eq!(alice.engine.sending(peer, TrackKind::Video).as_deref(), Some(camera.id()));
    }
    assert_eq!(publisher.active_video_source(), Some(CaptureSource::Camera));
    assert!(!camera.is_stopped());
}

#[tokio::test]
async fn test_switch_before_publish() {
    init_tracing();

    let mesh = LoopbackMesh::new();
    let alice = mesh.client("alice");

    let err = alice.client.publisher().start_screen_share().await.unwrap_err();
    assert!(matches!(err, ClientError::NothingPublished));
}

#[tokio::test]
async fn test_republish_refused() {
    init_tracing();

    let mesh = LoopbackMesh::new();
    let (alice, bob, carol) = publishing_trio(&mesh).await.unwrap();
    let publisher = alice.client.publisher();
    let camera = publisher.video_track().unwrap();
    let microphone = publisher.audio_track().unwrap();

    alice.engine.fail_replace_for(carol.handle);
    let err = publisher.publish_default().await.unwrap_err();
    assert!(matches!(err, ClientError::AlreadyPublished));

    assert!(!camera.is_stopped());
    assert!(!microphone.is_stopped());
    assert_eq!(publisher.video_track().map(|t| t.id().to_owned()), Some(camera.id().to_owned()));
    for peer in [bob.handle, carol.handle] {
        assert!(!alice.engine.ops(peer).iter().any(|op| matches!(op, MockOp::Replace { .. })));
        assert_eq!(alice.engine.sending(peer, TrackKind::Video).as_deref(), Some(camera.id()));
        assert_eq!(alice.engine.sending(peer, TrackKind::Audio).as_deref(), Some(microphone.id()));
    }
}

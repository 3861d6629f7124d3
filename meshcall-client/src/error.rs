use crate::engine::CaptureSource;
use crate::peer::NegotiationState;
use thiserror::Error;

/// Failure to acquire a local capture device.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission to capture {0} was denied")]
    PermissionDenied(CaptureSource),

    #[error("no {0} source available")]
    NoSource(CaptureSource),

    #[error("{0} capture failed: {1}")]
    Device(CaptureSource, String),
}

/// Failure reported by the media engine for a connection operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Webrtc(#[from] webrtc::Error),

    #[error("media transport error: {0}")]
    Transport(String),

    #[error("no sender for {0} track")]
    NoSender(crate::engine::TrackKind),

    #[error("connection is closed")]
    Closed,
}

/// A negotiation message that is illegal in the current state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("cannot {action} while {state}")]
    IllegalTransition {
        action: &'static str,
        state: NegotiationState,
    },
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("signaling connection failed: {0}")]
    Signaling(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("not in a room")]
    NotJoined,

    #[error("track replacement failed for peer {peer}: {source}")]
    ReplaceFailed {
        peer: meshcall_core::ParticipantId,
        #[source]
        source: EngineError,
    },

    #[error("no video track has been published")]
    NothingPublished,

    #[error("default tracks are already published")]
    AlreadyPublished,

    #[error("client has shut down")]
    Shutdown,
}

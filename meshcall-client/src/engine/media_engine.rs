use crate::engine::ConnectionEvent;
use crate::error::{CaptureError, EngineError};
use async_trait::async_trait;
use meshcall_core::{IceCandidate, IceServerConfig, ParticipantId};
use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Where a local track comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureSource {
    Microphone,
    Camera,
    Screen,
}

impl CaptureSource {
    pub fn kind(self) -> TrackKind {
        match self {
            Self::Microphone => TrackKind::Audio,
            Self::Camera | Self::Screen => TrackKind::Video,
        }
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Microphone => f.write_str("microphone"),
            Self::Camera => f.write_str("camera"),
            Self::Screen => f.write_str("screen"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A local capture track. Clones refer to the same underlying track.
pub trait MediaTrack: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    fn kind(&self) -> TrackKind;

    fn set_enabled(&self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Release the capture. A stopped track never produces media again.
    fn stop(&self);
}

/// One negotiated connection to a remote participant.
#[async_trait]
pub trait MediaConnection: Send + Sync + 'static {
    type Track: MediaTrack;

    /// Create an offer and install it as the local description.
    async fn generate_offer(&self) -> Result<String, EngineError>;

    async fn apply_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError>;

    /// Create an answer to the applied remote offer and install it locally.
    async fn generate_answer(&self) -> Result<String, EngineError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError>;

    /// Swap the outgoing track of `kind` without renegotiating.
    async fn replace_track(&self, kind: TrackKind, track: Option<Self::Track>) -> Result<(), EngineError>;

    async fn close(&self) -> Result<(), EngineError>;
}

/// The external media stack: capture devices plus connection factory.
#[async_trait]
pub trait MediaEngine: Send + Sync + 'static {
    type Track: MediaTrack;
    type Connection: MediaConnection<Track = Self::Track>;

    async fn capture(&self, source: CaptureSource) -> Result<Self::Track, CaptureError>;

    /// Microphone and camera, all or nothing.
    async fn create_local_tracks(&self) -> Result<Vec<Self::Track>, CaptureError> {
        let audio = self.capture(CaptureSource::Microphone).await?;
        match self.capture(CaptureSource::Camera).await {
            Ok(video) => Ok(vec![audio, video]),
            Err(e) => {
                audio.stop();
                Err(e)
            }
        }
    }

    /// Open a connection to `remote`, sending `tracks`. Callbacks for this
    /// connection are delivered on `events`.
    async fn create_connection(
        &self,
        remote: ParticipantId,
        tracks: Vec<Self::Track>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Self::Connection, EngineError>;

    /// Replace the ICE servers used for connections created from now on.
    fn configure_ice(&self, _servers: Vec<IceServerConfig>) {}
}

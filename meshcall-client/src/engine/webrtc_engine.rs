use crate::engine::{
    CaptureSource, ConnectionEvent, MediaConnection, MediaEngine, MediaTrack, SdpKind, SessionDescription, TrackKind,
    TransportState,
};
use crate::error::{CaptureError, EngineError};
use async_trait::async_trait;
use bytes::Bytes;
use meshcall_core::utils::default_ice_servers;
use meshcall_core::{IceCandidate, IceServerConfig, ParticipantId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8, MediaEngine as CodecRegistry};
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

const STREAM_ID: &str = "meshcall";

struct TrackInner {
    id: String,
    kind: TrackKind,
    source: CaptureSource,
    local: Arc<TrackLocalStaticSample>,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

/// A sample-fed local track. The embedding application pushes encoded
/// frames with [`WebrtcTrack::write_sample`].
#[derive(Clone)]
pub struct WebrtcTrack {
    inner: Arc<TrackInner>,
}

impl WebrtcTrack {
    fn new(source: CaptureSource) -> Self {
        let kind = source.kind();
        let mime_type = match kind {
            TrackKind::Audio => MIME_TYPE_OPUS,
            TrackKind::Video => MIME_TYPE_VP8,
        };
        let id = format!("{}-{}", source, Uuid::new_v4());
        let local = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                ..Default::default()
            },
            id.clone(),
            STREAM_ID.to_owned(),
        ));

        Self {
            inner: Arc::new(TrackInner {
                id,
                kind,
                source,
                local,
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn source(&self) -> CaptureSource {
        self.inner.source
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Send one encoded frame. Dropped silently while muted or stopped.
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<(), EngineError> {
        if self.is_stopped() || !self.is_enabled() {
            return Ok(());
        }
        self.inner
            .local
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    fn rtp_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.inner.local.clone()
    }
}

impl std::fmt::Debug for WebrtcTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebrtcTrack")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .finish()
    }
}

impl MediaTrack for WebrtcTrack {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
    }

    fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    fn stop(&self) {
        if !self.inner.stopped.swap(true, Ordering::AcqRel) {
            debug!("Stopped local track {}", self.inner.id);
        }
    }
}

/// A webrtc-rs peer connection towards one remote participant.
pub struct WebrtcConnection {
    remote: ParticipantId,
    peer_connection: Arc<RTCPeerConnection>,
    senders: Mutex<HashMap<TrackKind, Arc<RTCRtpSender>>>,
}

impl WebrtcConnection {
    fn sender(&self, kind: TrackKind) -> Option<Arc<RTCRtpSender>> {
        self.senders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .cloned()
    }
}

#[async_trait]
impl MediaConnection for WebrtcConnection {
    type Track = WebrtcTrack;

    async fn generate_offer(&self) -> Result<String, EngineError> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection.set_local_description(offer.clone()).await?;
        Ok(offer.sdp)
    }

    async fn apply_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        let desc = match desc.kind {
            SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
        };
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    async fn generate_answer(&self) -> Result<String, EngineError> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection.set_local_description(answer.clone()).await?;
        Ok(answer.sdp)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn replace_track(&self, kind: TrackKind, track: Option<WebrtcTrack>) -> Result<(), EngineError> {
        let sender = self.sender(kind).ok_or(EngineError::NoSender(kind))?;
        sender.replace_track(track.map(|t| t.rtp_track())).await?;
        debug!("Replaced {} track towards {}", kind, self.remote);
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// [`MediaEngine`] backed by webrtc-rs.
///
/// Capture devices are not opened here: the application declares which
/// sources it can feed and writes samples into the returned tracks.
pub struct WebrtcEngine {
    api: API,
    ice_servers: RwLock<Vec<IceServerConfig>>,
    sources: HashSet<CaptureSource>,
}

impl WebrtcEngine {
    pub fn new(sources: impl IntoIterator<Item = CaptureSource>) -> Result<Self, EngineError> {
        let mut codecs = CodecRegistry::default();
        codecs.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut codecs)?;

        let api = APIBuilder::new()
            .with_media_engine(codecs)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api,
            ice_servers: RwLock::new(default_ice_servers()),
            sources: sources.into_iter().collect(),
        })
    }

    fn rtc_config(&self) -> RTCConfiguration {
        let servers = self.ice_servers.read().unwrap_or_else(|e| e.into_inner());
        RTCConfiguration {
            ice_servers: servers
                .iter()
                .map(|s| RTCIceServer {
                    urls: s.urls.clone(),
                    username: s.username.clone().unwrap_or_default(),
                    credential: s.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }
}

fn transport_state(s: RTCPeerConnectionState) -> Option<TransportState> {
    match s {
        RTCPeerConnectionState::New => Some(TransportState::New),
        RTCPeerConnectionState::Connecting => Some(TransportState::Connecting),
        RTCPeerConnectionState::Connected => Some(TransportState::Connected),
        RTCPeerConnectionState::Disconnected => Some(TransportState::Disconnected),
        RTCPeerConnectionState::Failed => Some(TransportState::Failed),
        RTCPeerConnectionState::Closed => Some(TransportState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

fn spawn_rtcp_drain(sender: Arc<RTCRtpSender>) {
    // Interceptors only see RTCP if someone reads it.
    tokio::spawn(async move {
        let mut buf = vec![0u8; 1500];
        while sender.read(&mut buf).await.is_ok() {}
    });
}

#[async_trait]
impl MediaEngine for WebrtcEngine {
    type Track = WebrtcTrack;
    type Connection = WebrtcConnection;

    async fn capture(&self, source: CaptureSource) -> Result<WebrtcTrack, CaptureError> {
        if !self.sources.contains(&source) {
            return Err(CaptureError::NoSource(source));
        }
        let track = WebrtcTrack::new(source);
        info!("Captured {} as track {}", source, track.id());
        Ok(track)
    }

    async fn create_connection(
        &self,
        remote: ParticipantId,
        tracks: Vec<WebrtcTrack>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<WebrtcConnection, EngineError> {
        let peer_connection = Arc::new(self.api.new_peer_connection(self.rtc_config()).await?);

        let state_tx = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let tx = state_tx.clone();
            Box::pin(async move {
                debug!("Peer connection state for {}: {:?}", remote, s);
                if let Some(state) = transport_state(s) {
                    let _ = tx.send(ConnectionEvent::StateChanged(remote, state));
                }
            })
        }));

        let ice_tx = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                };
                let _ = tx.send(ConnectionEvent::CandidateGenerated(remote, candidate));
            })
        }));

        let track_tx = events;
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
                let tx = track_tx.clone();
                Box::pin(async move {
                    let kind = match track.kind() {
                        RTPCodecType::Audio => TrackKind::Audio,
                        RTPCodecType::Video => TrackKind::Video,
                        RTPCodecType::Unspecified => return,
                    };
                    let _ = tx.send(ConnectionEvent::RemoteTrack {
                        remote,
                        kind,
                        track_id: track.id(),
                    });
                })
            },
        ));

        let mut senders = HashMap::new();
        for track in &tracks {
            let sender = peer_connection.add_track(track.rtp_track()).await?;
            spawn_rtcp_drain(sender.clone());
            senders.insert(track.kind(), sender);
        }

        // Keep a sender slot for every kind so a track published later can
        // be swapped in without renegotiating.
        for (kind, codec_type) in [(TrackKind::Audio, RTPCodecType::Audio), (TrackKind::Video, RTPCodecType::Video)] {
            if senders.contains_key(&kind) {
                continue;
            }
            let transceiver = peer_connection
                .add_transceiver_from_kind(
                    codec_type,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Sendrecv,
                        send_encodings: vec![],
                    }),
                )
                .await?;
            let sender = transceiver.sender().await;
            spawn_rtcp_drain(sender.clone());
            senders.insert(kind, sender);
        }

        info!("Created peer connection towards {} with {} local tracks", remote, tracks.len());

        Ok(WebrtcConnection {
            remote,
            peer_connection,
            senders: Mutex::new(senders),
        })
    }

    fn configure_ice(&self, servers: Vec<IceServerConfig>) {
        if servers.is_empty() {
            warn!("Ignoring empty ICE server list");
            return;
        }
        *self.ice_servers.write().unwrap_or_else(|e| e.into_inner()) = servers;
    }
}

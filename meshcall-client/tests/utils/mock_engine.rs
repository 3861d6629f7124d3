use async_trait::async_trait;
use meshcall_client::{
    CaptureError, CaptureSource, ConnectionEvent, EngineError, MediaConnection, MediaEngine, MediaTrack, SdpKind,
    SessionDescription, TrackKind, TransportState,
};
use meshcall_core::{IceCandidate, IceServerConfig, ParticipantId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

struct MockTrackInner {
    id: String,
    source: CaptureSource,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

#[derive(Clone)]
pub struct MockTrack {
    inner: Arc<MockTrackInner>,
}

impl MockTrack {
    pub fn source(&self) -> CaptureSource {
        self.inner.source
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MockTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockTrack({})", self.inner.id)
    }
}

impl MediaTrack for MockTrack {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn kind(&self) -> TrackKind {
        self.inner.source.kind()
    }

    fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }
}

/// Everything a mock connection was asked to do, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOp {
    Created { tracks: Vec<String> },
    Offer,
    RemoteDescription(SdpKind),
    Answer,
    Candidate(IceCandidate),
    Replace { kind: TrackKind, track: Option<String> },
    Closed,
}

#[derive(Default)]
struct MockState {
    counter: u32,
    denied: HashSet<CaptureSource>,
    failing_replace: HashSet<ParticipantId>,
    manual_transport: bool,
    connections: HashMap<ParticipantId, mpsc::UnboundedSender<ConnectionEvent>>,
    ops: HashMap<ParticipantId, Vec<MockOp>>,
    ice_servers: Vec<IceServerConfig>,
}

/// Scriptable in-memory media engine. Connections report the transport
/// as connected once both descriptions are in place, unless
/// [`MockEngine::set_manual_transport`] is on.
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn deny(&self, source: CaptureSource) {
        self.lock().denied.insert(source);
    }

    pub fn fail_replace_for(&self, remote: ParticipantId) {
        self.lock().failing_replace.insert(remote);
    }

    pub fn set_manual_transport(&self, manual: bool) {
        self.lock().manual_transport = manual;
    }

    /// Deliver `event` on the newest connection towards `remote`.
    pub fn emit(&self, remote: ParticipantId, event: ConnectionEvent) -> bool {
        let tx = self.lock().connections.get(&remote).cloned();
        tx.is_some_and(|tx| tx.send(event).is_ok())
    }

    pub fn emit_state(&self, remote: ParticipantId, state: TransportState) -> bool {
        self.emit(remote, ConnectionEvent::StateChanged(remote, state))
    }

    pub fn ops(&self, remote: ParticipantId) -> Vec<MockOp> {
        self.lock().ops.get(&remote).cloned().unwrap_or_default()
    }

    fn count(&self, remote: ParticipantId, pred: impl Fn(&MockOp) -> bool) -> usize {
        self.ops(remote).iter().filter(|op| pred(op)).count()
    }

    pub fn offers_to(&self, remote: ParticipantId) -> usize {
        self.count(remote, |op| *op == MockOp::Offer)
    }

    pub fn answers_to(&self, remote: ParticipantId) -> usize {
        self.count(remote, |op| *op == MockOp::Answer)
    }

    pub fn connections_to(&self, remote: ParticipantId) -> usize {
        self.count(remote, |op| matches!(op, MockOp::Created { .. }))
    }

    pub fn total_offers(&self) -> usize {
        self.lock()
            .ops
            .values()
            .flatten()
            .filter(|op| **op == MockOp::Offer)
            .count()
    }

    pub fn candidates_from(&self, remote: ParticipantId) -> Vec<IceCandidate> {
        self.ops(remote)
            .into_iter()
            .filter_map(|op| match op {
                MockOp::Candidate(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self, remote: ParticipantId) -> bool {
        self.ops(remote).last() == Some(&MockOp::Closed)
    }

    /// Id of the `kind` track currently sent to `remote`.
    pub fn sending(&self, remote: ParticipantId, kind: TrackKind) -> Option<String> {
        let mut current = None;
        for op in self.ops(remote) {
            match op {
                MockOp::Created { tracks } => {
                    current = tracks.into_iter().find(|id| kind_of(id) == kind);
                }
                MockOp::Replace { kind: k, track } if k == kind => current = track,
                _ => {}
            }
        }
        current
    }

    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        self.lock().ice_servers.clone()
    }

    fn next(&self) -> u32 {
        let mut state = self.lock();
        state.counter += 1;
        state.counter
    }
}

fn kind_of(track_id: &str) -> TrackKind {
    if track_id.starts_with("microphone") {
        TrackKind::Audio
    } else {
        TrackKind::Video
    }
}

pub struct MockConnection {
    remote: ParticipantId,
    engine: MockEngine,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl MockConnection {
    fn record(&self, op: MockOp) {
        self.engine.lock().ops.entry(self.remote).or_default().push(op);
    }

    fn gather(&self) {
        let n = self.engine.next();
        let candidate = IceCandidate {
            candidate: format!("candidate:{n} 1 udp 2122260223 127.0.0.1 {} typ host", 40000 + n),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        };
        let _ = self
            .events
            .send(ConnectionEvent::CandidateGenerated(self.remote, candidate));
    }

    fn transport_up(&self) {
        if !self.engine.lock().manual_transport {
            let _ = self
                .events
                .send(ConnectionEvent::StateChanged(self.remote, TransportState::Connected));
        }
    }
}

#[async_trait]
impl MediaConnection for MockConnection {
    type Track = MockTrack;

    async fn generate_offer(&self) -> Result<String, EngineError> {
        self.record(MockOp::Offer);
        self.gather();
        Ok(format!("mock-offer-{}", self.engine.next()))
    }

    async fn apply_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        self.record(MockOp::RemoteDescription(desc.kind));
        let _ = self.events.send(ConnectionEvent::RemoteTrack {
            remote: self.remote,
            kind: TrackKind::Video,
            track_id: format!("remote-video-{}", self.remote),
        });
        if desc.kind == SdpKind::Answer {
            self.transport_up();
        }
        Ok(())
    }

    async fn generate_answer(&self) -> Result<String, EngineError> {
        self.record(MockOp::Answer);
        self.gather();
        self.transport_up();
        Ok(format!("mock-answer-{}", self.engine.next()))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        self.record(MockOp::Candidate(candidate));
        Ok(())
    }

    async fn replace_track(&self, kind: TrackKind, track: Option<MockTrack>) -> Result<(), EngineError> {
        if self.engine.lock().failing_replace.contains(&self.remote) {
            return Err(EngineError::Transport("injected replace failure".into()));
        }
        self.record(MockOp::Replace {
            kind,
            track: track.map(|t| t.id().to_owned()),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.record(MockOp::Closed);
        Ok(())
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    type Track = MockTrack;
    type Connection = MockConnection;

    async fn capture(&self, source: CaptureSource) -> Result<MockTrack, CaptureError> {
        if self.lock().denied.contains(&source) {
            return Err(CaptureError::PermissionDenied(source));
        }
        let n = self.next();
        Ok(MockTrack {
            inner: Arc::new(MockTrackInner {
                id: format!("{}-{}", source, n),
                source,
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
            }),
        })
    }

    async fn create_connection(
        &self,
        remote: ParticipantId,
        tracks: Vec<MockTrack>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<MockConnection, EngineError> {
        {
            let mut state = self.lock();
            state.connections.insert(remote, events.clone());
            state.ops.entry(remote).or_default().push(MockOp::Created {
                tracks: tracks.iter().map(|t| t.id().to_owned()).collect(),
            });
        }
        Ok(MockConnection {
            remote,
            engine: self.clone(),
            events,
        })
    }

    fn configure_ice(&self, servers: Vec<IceServerConfig>) {
        self.lock().ice_servers = servers;
    }
}

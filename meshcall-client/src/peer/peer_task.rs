use crate::engine::{
    ConnectionEvent, MediaConnection, MediaEngine, SessionDescription, TrackKind, TransportState,
};
use crate::error::EngineError;
use crate::event::ClientEvent;
use crate::peer::{
    CandidateDisposition, FailureAction, Negotiation, NegotiationState, OfferDecision, PeerHandle, Role,
};
use crate::publisher::{SharedTracks, SurfaceRegistry, TrackOwner};
use crate::signaling::SignalSink;
use meshcall_core::{ClientMessage, IceCandidate, ParticipantId};
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub(crate) enum PeerCommand<T> {
    Initiate,
    RemoteOffer(String),
    RemoteAnswer(String),
    RemoteCandidate(IceCandidate),
    ReplaceTrack {
        kind: TrackKind,
        track: Option<T>,
        /// `Ok(false)` when there is no live connection to update.
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
}

/// Everything a peer task shares with the rest of the client.
pub(crate) struct PeerContext<E: MediaEngine> {
    pub engine: Arc<E>,
    pub tracks: SharedTracks<E::Track>,
    pub signaling: Arc<dyn SignalSink>,
    pub surfaces: SurfaceRegistry,
    pub events: mpsc::UnboundedSender<ClientEvent>,
    /// How long a failed responder waits for the initiator to re-offer.
    pub reoffer_timeout: Duration,
}

impl<E: MediaEngine> Clone for PeerContext<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            tracks: self.tracks.clone(),
            signaling: self.signaling.clone(),
            surfaces: self.surfaces.clone(),
            events: self.events.clone(),
            reoffer_timeout: self.reoffer_timeout,
        }
    }
}

enum StepError {
    Cancelled,
    Engine(EngineError),
}

impl From<EngineError> for StepError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

/// Runs `fut` unless the peer is closed first.
async fn guarded<T>(
    cancel: &mut watch::Receiver<bool>,
    fut: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, StepError> {
    tokio::select! {
        biased;
        _ = cancelled(cancel) => Err(StepError::Cancelled),
        res = fut => res.map_err(StepError::Engine),
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn closed_events() -> mpsc::UnboundedReceiver<ConnectionEvent> {
    mpsc::unbounded_channel().1
}

/// Starts the task that owns the connection towards `remote`.
pub(crate) fn spawn_peer<E: MediaEngine>(
    remote: ParticipantId,
    role: Role,
    ctx: &PeerContext<E>,
) -> PeerHandle<E::Track> {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (state_tx, state_rx) = watch::channel(NegotiationState::Idle);

    let task = PeerTask {
        remote,
        ctx: ctx.clone(),
        negotiation: Negotiation::new(role),
        connection: None,
        conn_events: closed_events(),
        commands: cmd_rx,
        cancel: cancel_rx,
        state_tx,
        reoffer_deadline: None,
    };
    tokio::spawn(task.run());

    PeerHandle::new(role, cmd_tx, cancel_tx, state_rx)
}

/// Serializes every negotiation step for one remote peer. Commands and
/// connection callbacks are handled one at a time, in arrival order.
struct PeerTask<E: MediaEngine> {
    remote: ParticipantId,
    ctx: PeerContext<E>,
    negotiation: Negotiation,
    connection: Option<E::Connection>,
    conn_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    commands: mpsc::UnboundedReceiver<PeerCommand<E::Track>>,
    cancel: watch::Receiver<bool>,
    state_tx: watch::Sender<NegotiationState>,
    /// Set while a failed responder waits for a fresh offer.
    reoffer_deadline: Option<Instant>,
}

impl<E: MediaEngine> PeerTask<E> {
    async fn run(mut self) {
        info!("Peer {} record created as {:?}", self.remote, self.negotiation.role());

        loop {
            let step = tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel) => break,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                Some(ev) = self.conn_events.recv() => self.on_connection_event(ev).await,
                _ = deadline(self.reoffer_deadline) => {
                    self.reoffer_expired();
                    Ok(())
                }
            };

            if self.settle(step).await.is_break() {
                break;
            }
        }

        self.shutdown().await;
    }

    /// Apply `f` to the state machine and report the transition, if any.
    fn apply<R>(&mut self, f: impl FnOnce(&mut Negotiation) -> R) -> R {
        let from = self.negotiation.state();
        let out = f(&mut self.negotiation);
        let to = self.negotiation.state();

        if from != to {
            debug!("Peer {}: {} -> {}", self.remote, from, to);
            let _ = self.ctx.events.send(ClientEvent::PeerStateChanged {
                peer: self.remote,
                from,
                to,
            });
            self.state_tx.send_replace(to);
        }
        out
    }

    async fn handle_command(&mut self, cmd: PeerCommand<E::Track>) -> Result<(), StepError> {
        match cmd {
            PeerCommand::Initiate => self.initiate().await,
            PeerCommand::RemoteOffer(sdp) => self.accept_offer(sdp).await,
            PeerCommand::RemoteAnswer(sdp) => self.accept_answer(sdp).await,
            PeerCommand::RemoteCandidate(candidate) => self.remote_candidate(candidate).await,
            PeerCommand::ReplaceTrack { kind, track, reply } => self.replace_track(kind, track, reply).await,
        }
    }

    async fn open_connection(&mut self) -> Result<(), StepError> {
        self.drop_connection().await;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let tracks = self.ctx.tracks.read().unwrap_or_else(|e| e.into_inner()).tracks();
        let connection = guarded(
            &mut self.cancel,
            self.ctx.engine.create_connection(self.remote, tracks, events_tx),
        )
        .await?;

        self.connection = Some(connection);
        self.conn_events = events_rx;
        Ok(())
    }

    /// Close the current connection. Its pending callbacks are discarded.
    async fn drop_connection(&mut self) {
        self.conn_events = closed_events();
        if let Some(connection) = self.connection.take()
            && let Err(e) = connection.close().await
        {
            debug!("Peer {}: close failed: {}", self.remote, e);
        }
    }

    async fn initiate(&mut self) -> Result<(), StepError> {
        if self.negotiation.state() != NegotiationState::Idle {
            warn!(
                "Peer {}: not initiating while {}",
                self.remote,
                self.negotiation.state()
            );
            return Ok(());
        }
        if self.connection.is_none() {
            self.open_connection().await?;
        }

        let connection = self.connection.as_ref().ok_or(EngineError::Closed)?;
        let sdp = guarded(&mut self.cancel, connection.generate_offer()).await?;

        self.ctx
            .signaling
            .send(ClientMessage::Offer {
                target: self.remote,
                sdp,
            })
            .await;
        if let Err(e) = self.apply(|n| n.on_offer_sent()) {
            warn!("Peer {}: {}", self.remote, e);
        }
        self.flush_local().await;
        Ok(())
    }

    async fn accept_offer(&mut self, sdp: String) -> Result<(), StepError> {
        let decision = match self.apply(|n| n.on_remote_offer()) {
            Ok(decision) => decision,
            Err(e) => {
                warn!("Peer {}: offer rejected: {}", self.remote, e);
                return Ok(());
            }
        };
        if decision != OfferDecision::Ignore {
            self.reoffer_deadline = None;
        }

        match decision {
            OfferDecision::Accept if self.connection.is_some() => {}
            OfferDecision::Accept => self.open_connection().await?,
            OfferDecision::Rollback | OfferDecision::Reconnect => {
                info!("Peer {}: {:?}, rebuilding connection", self.remote, decision);
                self.open_connection().await?;
            }
            OfferDecision::Ignore => {
                info!("Peer {}: keeping local offer, remote offer ignored", self.remote);
                return Ok(());
            }
            OfferDecision::Reject => {
                warn!(
                    "Peer {}: offer rejected while {}",
                    self.remote,
                    self.negotiation.state()
                );
                return Ok(());
            }
        }

        let connection = self.connection.as_ref().ok_or(EngineError::Closed)?;
        guarded(
            &mut self.cancel,
            connection.apply_remote_description(SessionDescription::offer(sdp)),
        )
        .await?;
        self.flush_remote().await?;

        let connection = self.connection.as_ref().ok_or(EngineError::Closed)?;
        let answer = guarded(&mut self.cancel, connection.generate_answer()).await?;

        self.ctx
            .signaling
            .send(ClientMessage::Answer {
                target: self.remote,
                sdp: answer,
            })
            .await;
        if let Err(e) = self.apply(|n| n.on_answer_sent()) {
            warn!("Peer {}: {}", self.remote, e);
        }
        self.flush_local().await;
        Ok(())
    }

    async fn accept_answer(&mut self, sdp: String) -> Result<(), StepError> {
        if let Err(e) = self.apply(|n| n.on_remote_answer()) {
            warn!("Peer {}: answer dropped: {}", self.remote, e);
            return Ok(());
        }

        let connection = self.connection.as_ref().ok_or(EngineError::Closed)?;
        guarded(
            &mut self.cancel,
            connection.apply_remote_description(SessionDescription::answer(sdp)),
        )
        .await?;
        self.flush_remote().await
    }

    async fn remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), StepError> {
        match self.negotiation.on_remote_candidate(candidate.clone()) {
            CandidateDisposition::Apply => self.add_candidate(candidate).await,
            CandidateDisposition::Buffered => {
                debug!(
                    "Peer {}: candidate buffered while {}",
                    self.remote,
                    self.negotiation.state()
                );
                Ok(())
            }
            CandidateDisposition::Duplicate => {
                debug!("Peer {}: duplicate candidate ignored", self.remote);
                Ok(())
            }
            CandidateDisposition::Discarded => Ok(()),
        }
    }

    async fn add_candidate(&mut self, candidate: IceCandidate) -> Result<(), StepError> {
        let Some(connection) = self.connection.as_ref() else {
            return Ok(());
        };
        match guarded(&mut self.cancel, connection.add_ice_candidate(candidate)).await {
            Err(StepError::Engine(e)) => {
                warn!("Peer {}: candidate rejected: {}", self.remote, e);
                Ok(())
            }
            other => other,
        }
    }

    async fn flush_remote(&mut self) -> Result<(), StepError> {
        for candidate in self.negotiation.take_buffered_remote() {
            self.add_candidate(candidate).await?;
        }
        Ok(())
    }

    async fn flush_local(&mut self) {
        for candidate in self.negotiation.take_pending_local() {
            self.send_candidate(candidate).await;
        }
    }

    async fn send_candidate(&self, candidate: IceCandidate) {
        self.ctx
            .signaling
            .send(ClientMessage::IceCandidate {
                target: self.remote,
                candidate,
            })
            .await;
    }

    async fn replace_track(
        &mut self,
        kind: TrackKind,
        track: Option<E::Track>,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    ) -> Result<(), StepError> {
        let result = match self.connection.as_ref() {
            Some(connection) if !self.negotiation.is_closed() => guarded(&mut self.cancel, connection.replace_track(kind, track))
                .await
                .map(|_| true),
            _ => Ok(false),
        };

        match result {
            Ok(applied) => {
                let _ = reply.send(Ok(applied));
                Ok(())
            }
            Err(StepError::Engine(e)) => {
                let _ = reply.send(Err(e));
                Ok(())
            }
            Err(StepError::Cancelled) => {
                let _ = reply.send(Ok(false));
                Err(StepError::Cancelled)
            }
        }
    }

    async fn on_connection_event(&mut self, event: ConnectionEvent) -> Result<(), StepError> {
        match event {
            ConnectionEvent::CandidateGenerated(_, candidate) => {
                if let Some(candidate) = self.negotiation.on_local_candidate(candidate) {
                    self.send_candidate(candidate).await;
                }
            }
            ConnectionEvent::StateChanged(_, TransportState::Connected) => {
                if self.negotiation.on_transport_connected() {
                    info!("Peer {}: media transport connected", self.remote);
                    let _ = self.ctx.events.send(ClientEvent::PeerConnected(self.remote));
                }
            }
            ConnectionEvent::StateChanged(_, state) if state.is_failure() => {
                return Err(StepError::Engine(EngineError::Transport(format!(
                    "transport {:?}",
                    state
                ))));
            }
            ConnectionEvent::StateChanged(_, state) => {
                debug!("Peer {}: transport {:?}", self.remote, state);
            }
            ConnectionEvent::RemoteTrack { kind, track_id, .. } => {
                self.ctx
                    .surfaces
                    .track_available(TrackOwner::Remote(self.remote), kind, track_id);
            }
        }
        Ok(())
    }

    /// Turns an engine failure into the reconnect policy. Returns `Break`
    /// when the peer was closed.
    async fn settle(&mut self, mut step: Result<(), StepError>) -> ControlFlow<()> {
        loop {
            let e = match step {
                Ok(()) => return ControlFlow::Continue(()),
                Err(StepError::Cancelled) => return ControlFlow::Break(()),
                Err(StepError::Engine(e)) => e,
            };

            warn!("Peer {}: negotiation failed: {}", self.remote, e);
            match self.apply(|n| n.on_transport_failed()) {
                FailureAction::Ignore => return ControlFlow::Continue(()),
                FailureAction::GiveUp => {
                    self.drop_connection().await;
                    self.report_unreachable();
                    return ControlFlow::Continue(());
                }
                FailureAction::Reconnect => {
                    self.drop_connection().await;
                    step = match self.negotiation.role() {
                        Role::Initiator => {
                            info!("Peer {}: reconnecting", self.remote);
                            self.apply(|n| n.reset_for_reconnect());
                            self.initiate().await
                        }
                        Role::Responder => {
                            info!(
                                "Peer {}: waiting {:?} for the initiator to reconnect",
                                self.remote, self.ctx.reoffer_timeout
                            );
                            self.reoffer_deadline = Some(Instant::now() + self.ctx.reoffer_timeout);
                            Ok(())
                        }
                    };
                }
            }
        }
    }

    fn report_unreachable(&mut self) {
        self.reoffer_deadline = None;
        warn!("Peer {} is unreachable, giving up", self.remote);
        let _ = self.ctx.events.send(ClientEvent::PeerUnreachable(self.remote));
    }

    /// No offer came back after the transport failed.
    fn reoffer_expired(&mut self) {
        self.reoffer_deadline = None;
        if self.negotiation.give_up() {
            self.report_unreachable();
        }
    }

    async fn shutdown(&mut self) {
        self.apply(|n| n.close());
        self.drop_connection().await;
        self.ctx.surfaces.remove_owner(TrackOwner::Remote(self.remote));
        info!("Peer {} record closed", self.remote);
    }
}

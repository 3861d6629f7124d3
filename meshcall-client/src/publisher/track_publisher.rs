use crate::engine::{CaptureSource, MediaEngine, MediaTrack, TrackKind};
use crate::error::{ClientError, EngineError};
use crate::peer::{PeerCommand, PeerDirectory};
use crate::publisher::{LocalTrackSet, SharedTracks, SurfaceRegistry, TrackOwner};
use futures::future::join_all;
use meshcall_core::ParticipantId;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{info, warn};

type CommandTx<T> = mpsc::UnboundedSender<PeerCommand<T>>;

/// Owns the local tracks and swaps them across every live peer connection.
pub struct TrackPublisher<E: MediaEngine> {
    engine: Arc<E>,
    tracks: SharedTracks<E::Track>,
    peers: PeerDirectory<E::Track>,
    surfaces: SurfaceRegistry,
    switching: Arc<Mutex<()>>,
}

impl<E: MediaEngine> Clone for TrackPublisher<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            tracks: self.tracks.clone(),
            peers: self.peers.clone(),
            surfaces: self.surfaces.clone(),
            switching: self.switching.clone(),
        }
    }
}

async fn replace_on<T: MediaTrack>(
    peer: ParticipantId,
    commands: CommandTx<T>,
    kind: TrackKind,
    track: Option<T>,
) -> (ParticipantId, Result<bool, EngineError>) {
    let (reply_tx, reply_rx) = oneshot::channel();
    let cmd = PeerCommand::ReplaceTrack {
        kind,
        track,
        reply: reply_tx,
    };
    if commands.send(cmd).is_err() {
        return (peer, Ok(false));
    }
    // A peer closed mid-switch has nothing left to update.
    (peer, reply_rx.await.unwrap_or(Ok(false)))
}

impl<E: MediaEngine> TrackPublisher<E> {
    pub(crate) fn new(engine: Arc<E>, peers: PeerDirectory<E::Track>, surfaces: SurfaceRegistry) -> Self {
        Self {
            engine,
            tracks: Arc::new(RwLock::new(LocalTrackSet::default())),
            peers,
            surfaces,
            switching: Arc::new(Mutex::new(())),
        }
    }

    pub(crate) fn shared_tracks(&self) -> SharedTracks<E::Track> {
        self.tracks.clone()
    }

    fn read<R>(&self, f: impl FnOnce(&LocalTrackSet<E::Track>) -> R) -> R {
        f(&self.tracks.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn write<R>(&self, f: impl FnOnce(&mut LocalTrackSet<E::Track>) -> R) -> R {
        f(&mut self.tracks.write().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn active_video_source(&self) -> Option<CaptureSource> {
        self.read(|t| t.video_source())
    }

    pub fn local_tracks(&self) -> Vec<E::Track> {
        self.read(|t| t.tracks())
    }

    pub fn video_track(&self) -> Option<E::Track> {
        self.read(|t| t.video().cloned())
    }

    pub fn audio_track(&self) -> Option<E::Track> {
        self.read(|t| t.audio().cloned())
    }

    /// Send `track` as the `kind` track of every live peer. Returns the
    /// first failure, if any.
    async fn replace_everywhere(&self, kind: TrackKind, track: Option<E::Track>) -> Result<(), ClientError> {
        let replacements = self
            .peers
            .senders()
            .into_iter()
            .map(|(peer, commands)| replace_on(peer, commands, kind, track.clone()));

        let mut first_error = None;
        for (peer, result) in join_all(replacements).await {
            if let Err(source) = result {
                warn!("Replacing {} track for {} failed: {}", kind, peer, source);
                first_error.get_or_insert(ClientError::ReplaceFailed { peer, source });
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn announce(&self, track: &E::Track) {
        self.surfaces.track_available(TrackOwner::Local, track.kind(), track.id());
    }

    /// Capture microphone and camera and send them to every peer. Only the
    /// first call publishes; later changes go through [`Self::switch_video`].
    pub async fn publish_default(&self) -> Result<(), ClientError> {
        let _switching = self.switching.lock().await;

        if self.read(|t| t.audio().is_some() || t.video().is_some()) {
            return Err(ClientError::AlreadyPublished);
        }

        let captured = self.engine.create_local_tracks().await?;
        let mut audio = None;
        let mut video = None;
        for track in captured {
            match track.kind() {
                TrackKind::Audio => audio = Some(track),
                TrackKind::Video => video = Some((CaptureSource::Camera, track)),
            }
        }

        self.write(|t| {
            t.set_audio(audio.clone());
            t.set_video(video.clone());
        });

        if let Err(e) = self.replace_everywhere(TrackKind::Audio, audio.clone()).await {
            warn!("Publishing microphone: {}", e);
        }
        if let Err(e) = self
            .replace_everywhere(TrackKind::Video, video.as_ref().map(|(_, t)| t.clone()))
            .await
        {
            warn!("Publishing camera: {}", e);
        }

        for track in audio.iter().chain(video.iter().map(|(_, t)| t)) {
            self.announce(track);
        }
        info!("Published default tracks");
        Ok(())
    }

    /// Replace the active video track with a fresh capture of `source`.
    ///
    /// All or nothing: if the capture fails nothing is touched, and if any
    /// peer rejects the new track every peer is put back on the old one.
    /// The old track is stopped only after every peer switched.
    pub async fn switch_video(&self, source: CaptureSource) -> Result<(), ClientError> {
        let _switching = self.switching.lock().await;

        let Some((previous_source, previous)) = self.read(|t| t.video_source().zip(t.video().cloned())) else {
            return Err(ClientError::NothingPublished);
        };
        if previous_source == source {
            return Ok(());
        }

        let next = self.engine.capture(source).await?;
        self.write(|t| t.set_video(Some((source, next.clone()))));

        if let Err(e) = self.replace_everywhere(TrackKind::Video, Some(next.clone())).await {
            warn!("Switch to {} failed, restoring {}", source, previous_source);
            self.write(|t| t.set_video(Some((previous_source, previous.clone()))));
            if let Err(restore) = self.replace_everywhere(TrackKind::Video, Some(previous)).await {
                warn!("Restoring {} failed: {}", previous_source, restore);
            }
            next.stop();
            return Err(e);
        }

        self.announce(&next);
        previous.stop();
        info!("Video switched from {} to {}", previous_source, source);
        Ok(())
    }

    pub async fn start_screen_share(&self) -> Result<(), ClientError> {
        self.switch_video(CaptureSource::Screen).await
    }

    pub async fn stop_screen_share(&self) -> Result<(), ClientError> {
        self.switch_video(CaptureSource::Camera).await
    }

    pub fn set_audio_enabled(&self, enabled: bool) -> bool {
        self.read(|t| t.audio().map(|a| a.set_enabled(enabled)).is_some())
    }

    pub fn set_video_enabled(&self, enabled: bool) -> bool {
        self.read(|t| t.video().map(|v| v.set_enabled(enabled)).is_some())
    }

    /// Release every capture. Used when leaving the room.
    pub async fn stop_all(&self) {
        let _switching = self.switching.lock().await;

        let (audio, video) = self.write(|t| (t.set_audio(None), t.set_video(None)));
        for track in audio.into_iter().chain(video.map(|(_, t)| t)) {
            self.surfaces.track_removed(TrackOwner::Local, track.kind());
            track.stop();
        }
    }
}

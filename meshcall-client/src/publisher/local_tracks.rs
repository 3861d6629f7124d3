use crate::engine::{CaptureSource, MediaTrack};
use std::sync::{Arc, RwLock};

/// Tracks currently sent to every peer: zero or one audio track and, once
/// published, exactly one video track (camera or screen).
#[derive(Debug)]
pub struct LocalTrackSet<T> {
    audio: Option<T>,
    video: Option<(CaptureSource, T)>,
}

impl<T> Default for LocalTrackSet<T> {
    fn default() -> Self {
        Self {
            audio: None,
            video: None,
        }
    }
}

impl<T: MediaTrack> LocalTrackSet<T> {
    pub fn audio(&self) -> Option<&T> {
        self.audio.as_ref()
    }

    pub fn video(&self) -> Option<&T> {
        self.video.as_ref().map(|(_, t)| t)
    }

    pub fn video_source(&self) -> Option<CaptureSource> {
        self.video.as_ref().map(|(s, _)| *s)
    }

    /// Snapshot handed to newly created connections.
    pub fn tracks(&self) -> Vec<T> {
        self.audio.iter().chain(self.video.iter().map(|(_, t)| t)).cloned().collect()
    }

    pub(crate) fn set_audio(&mut self, track: Option<T>) -> Option<T> {
        std::mem::replace(&mut self.audio, track)
    }

    pub(crate) fn set_video(&mut self, video: Option<(CaptureSource, T)>) -> Option<(CaptureSource, T)> {
        std::mem::replace(&mut self.video, video)
    }
}

pub type SharedTracks<T> = Arc<RwLock<LocalTrackSet<T>>>;

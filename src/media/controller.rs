//! Media session controller
//!
//! Every channel change releases the previous session before acquiring the
//! next one. `ActiveSession` owns the adaptive client and destroys it on drop,
//! so a session can't outlive the channel it was created for.

use std::time::Instant;

use super::gestures::{ControlsVisibility, GestureTracker, TapAction, SEEK_STEP_SECS};
use super::{
    classify, AdaptiveStream, DecodedFrame, ElementEvent, MediaElement, SourceKind,
    StreamErrorKind, StreamEvent, StreamFactory,
};

/// Everything the player UI observes
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub buffering: bool,
    pub playing: bool,
    pub current_time: f64,
    pub duration: Option<f64>,
    pub volume: f32,
    pub muted: bool,
    pub fullscreen: bool,
    /// Autoplay was refused twice; the user has to press play
    pub needs_user_play: bool,
    pub error: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            buffering: false,
            playing: false,
            current_time: 0.0,
            duration: None,
            volume: 1.0,
            muted: false,
            fullscreen: false,
            needs_user_play: false,
            error: None,
        }
    }
}

/// Scoped ownership of one channel's streaming resources
struct ActiveSession {
    channel_id: String,
    kind: SourceKind,
    stream: Option<Box<dyn AdaptiveStream>>,
}

impl ActiveSession {
    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.destroy();
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.release_stream();
    }
}

pub struct MediaController {
    element: Box<dyn MediaElement>,
    stream_factory: StreamFactory,
    session: Option<ActiveSession>,
    current_url: Option<String>,
    state: PlaybackState,
    gestures: GestureTracker,
    controls: ControlsVisibility,
}

impl MediaController {
    pub fn new(element: Box<dyn MediaElement>, stream_factory: StreamFactory) -> Self {
        Self {
            element,
            stream_factory,
            session: None,
            current_url: None,
            state: PlaybackState::default(),
            gestures: GestureTracker::new(),
            controls: ControlsVisibility::new(Instant::now()),
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.channel_id.as_str())
    }

    /// URL the current session was loaded from
    pub fn source_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.session.as_ref().map(|s| s.kind)
    }

    pub fn has_stream_client(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.stream.is_some())
    }

    pub fn controls_visible(&self) -> bool {
        self.controls.is_visible()
    }

    /// Swap the rendering element (player mode change); the current channel is reloaded
    pub fn replace_element(&mut self, element: Box<dyn MediaElement>) {
        let current = self
            .session
            .as_ref()
            .map(|s| s.channel_id.clone())
            .zip(self.current_url.take());
        self.unload();
        self.element = element;
        if let Some((id, url)) = current {
            self.load_channel(&id, &url);
        }
    }

    /// Tear down the current session and detach the element
    pub fn unload(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!("Releasing media session for {}", session.channel_id);
            drop(session);
        }
        self.element.clear_source();
        self.current_url = None;
        let volume = self.state.volume;
        let fullscreen = self.state.fullscreen;
        self.state = PlaybackState { volume, fullscreen, ..Default::default() };
    }

    /// Enter the session state machine for a channel
    pub fn load_channel(&mut self, channel_id: &str, url: &str) {
        self.unload();

        let kind = classify(url);
        tracing::info!("Loading channel {} ({:?}): {}", channel_id, kind, url);
        self.element.set_volume(self.state.volume);
        self.current_url = Some(url.to_string());
        self.state.buffering = true;

        let mut session = ActiveSession {
            channel_id: channel_id.to_string(),
            kind,
            stream: None,
        };

        match kind {
            SourceKind::Adaptive if self.element.supports_native_hls() => {
                self.element.set_source(url);
                self.session = Some(session);
                self.autoplay();
            }
            SourceKind::Adaptive => {
                // element attaches once the client reports Ready
                session.stream = Some((self.stream_factory)(url));
                self.session = Some(session);
            }
            SourceKind::Progressive => {
                self.element.set_source(url);
                self.element.reload();
                self.session = Some(session);
                self.autoplay();
            }
        }
    }

    /// Unmuted first, then muted, then leave it to the user
    fn autoplay(&mut self) {
        self.element.set_muted(self.state.muted);
        let result = match self.element.play() {
            Err(e) if !self.state.muted => {
                tracing::info!("{}; retrying muted", e);
                self.state.muted = true;
                self.element.set_muted(true);
                self.element.play()
            }
            other => other,
        };
        match result {
            Ok(()) => self.state.needs_user_play = false,
            Err(e) => self.refuse_autoplay(e.0),
        }
    }

    fn refuse_autoplay(&mut self, reason: String) {
        tracing::info!("Autoplay refused: {}", reason);
        self.state.playing = false;
        self.state.buffering = false;
        self.state.needs_user_play = true;
        self.state.error = Some(reason);
    }

    /// Drain element and stream notifications; call once per frame
    pub fn poll(&mut self, now: Instant) {
        let stream_events = self
            .session
            .as_mut()
            .and_then(|s| s.stream.as_mut())
            .map(|stream| stream.poll_events())
            .unwrap_or_default();
        for event in stream_events {
            // a fatal error earlier in the batch already released the client
            if !self.has_stream_client() {
                break;
            }
            self.handle_stream_event(event);
        }

        for event in self.element.poll_events() {
            self.handle_element_event(event);
        }

        self.controls.update(now, self.state.playing);
    }

    fn handle_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Ready { playback_url, variants } => {
                tracing::debug!("Manifest ready ({} variants): {}", variants, playback_url);
                self.element.set_source(&playback_url);
                self.autoplay();
            }
            StreamEvent::LevelLoaded { duration, live } => {
                if !live {
                    self.state.duration = duration;
                }
            }
            StreamEvent::Error { kind, fatal, details } => self.handle_stream_error(kind, fatal, details),
        }
    }

    fn handle_stream_error(&mut self, kind: StreamErrorKind, fatal: bool, details: String) {
        let Some(stream) = self.session.as_mut().and_then(|s| s.stream.as_mut()) else {
            return;
        };
        match (kind, fatal) {
            (StreamErrorKind::Network, false) => {
                tracing::warn!("Network error, reloading: {}", details);
                stream.start_load();
            }
            (StreamErrorKind::Media, false) => {
                tracing::warn!("Media error, recovering: {}", details);
                stream.recover_media_error();
            }
            _ => {
                tracing::error!("Fatal {:?} stream error: {}", kind, details);
                if let Some(session) = self.session.as_mut() {
                    session.release_stream();
                }
                self.element.pause();
                self.element.clear_source();
                self.state.playing = false;
                self.state.buffering = false;
                self.state.error = Some(details);
            }
        }
    }

    fn handle_element_event(&mut self, event: ElementEvent) {
        match event {
            ElementEvent::Waiting => self.state.buffering = true,
            ElementEvent::Playing => {
                self.state.playing = true;
                self.state.buffering = false;
                self.state.needs_user_play = false;
                self.state.error = None;
            }
            ElementEvent::Paused => self.state.playing = false,
            ElementEvent::TimeUpdate(t) => {
                self.state.current_time = t;
                self.state.buffering = false;
            }
            ElementEvent::DurationChange(d) => {
                self.state.duration = (d.is_finite() && d > 0.0).then_some(d);
            }
            ElementEvent::Ended => {
                self.state.playing = false;
                self.state.buffering = false;
            }
            ElementEvent::Error(msg) => {
                if self.has_stream_client() {
                    // decode failures under an adaptive client go through its recovery
                    self.handle_stream_error(StreamErrorKind::Media, false, msg);
                } else {
                    tracing::error!("Playback error: {}", msg);
                    self.element.clear_source();
                    self.state.playing = false;
                    self.state.buffering = false;
                    self.state.error = Some(msg);
                }
            }
        }
    }

    pub fn play(&mut self) {
        if self.session.is_none() {
            return;
        }
        match self.element.play() {
            Ok(()) => {
                self.state.needs_user_play = false;
                self.state.error = None;
            }
            Err(e) => self.state.error = Some(e.0),
        }
    }

    pub fn pause(&mut self) {
        self.element.pause();
        self.state.playing = false;
    }

    pub fn toggle_play(&mut self) {
        if self.state.playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Relative seek, clamped to the known duration
    pub fn seek_by(&mut self, delta: f64) {
        let mut target = (self.state.current_time + delta).max(0.0);
        if let Some(duration) = self.state.duration {
            target = target.min(duration);
        }
        self.element.seek(target);
        self.state.current_time = target;
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.state.volume = volume.clamp(0.0, 1.0);
        self.element.set_volume(self.state.volume);
        if self.state.volume > 0.0 && self.state.muted {
            self.state.muted = false;
            self.element.set_muted(false);
        }
    }

    pub fn toggle_mute(&mut self) {
        self.state.muted = !self.state.muted;
        self.element.set_muted(self.state.muted);
    }

    pub fn toggle_fullscreen(&mut self) -> bool {
        self.state.fullscreen = !self.state.fullscreen;
        self.state.fullscreen
    }

    /// Pointer activity over the surface
    pub fn activity(&mut self, now: Instant) {
        self.controls.touch(now);
    }

    /// Tap on the surface at `x_fraction` of its width
    pub fn tap(&mut self, x_fraction: f32, now: Instant) -> TapAction {
        let action = self.gestures.tap(x_fraction, now);
        match action {
            TapAction::Single => {
                if !self.state.playing && self.session.is_some() {
                    self.play();
                    self.controls.touch(now);
                } else {
                    self.controls.toggle(now);
                }
            }
            TapAction::SeekBackward => {
                self.seek_by(-SEEK_STEP_SECS);
                self.controls.touch(now);
            }
            TapAction::SeekForward => {
                self.seek_by(SEEK_STEP_SECS);
                self.controls.touch(now);
            }
        }
        action
    }

    pub fn take_frame(&mut self) -> Option<DecodedFrame> {
        self.element.take_frame()
    }
}

impl Drop for MediaController {
    fn drop(&mut self) {
        self.unload();
    }
}

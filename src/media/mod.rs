//! Media session: source classification, element/stream abstractions and the controller
//!
//! The controller owns one `MediaElement` (the thing that actually renders
//! video) and, for adaptive sources the element can't handle on its own, one
//! `AdaptiveStream` client. Both are swapped out on every channel change.

mod controller;
mod controller_tests;
mod external;
mod gestures;
pub mod hls;
mod internal;
mod view;

pub use controller::MediaController;
pub use external::ExternalPlayer;
pub use gestures::TapAction;
pub use hls::HlsClient;
pub use internal::{DecodedFrame, InternalPlayer};
pub use view::PlayerView;

/// How a channel URL is played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// HLS manifest (`.m3u8`)
    Adaptive,
    /// Single progressive file or stream
    Progressive,
}

/// Classify by path suffix, ignoring query string and fragment
pub fn classify(url: &str) -> SourceKind {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if path.to_ascii_lowercase().ends_with(".m3u8") {
        SourceKind::Adaptive
    } else {
        SourceKind::Progressive
    }
}

/// Playback was refused by the element (autoplay policy, missing backend, spawn failure)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayRejected(pub String);

impl std::fmt::Display for PlayRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Playback rejected: {}", self.0)
    }
}

impl std::error::Error for PlayRejected {}

/// Notifications from a media element
#[derive(Debug, Clone, PartialEq)]
pub enum ElementEvent {
    Waiting,
    Playing,
    Paused,
    TimeUpdate(f64),
    DurationChange(f64),
    Ended,
    Error(String),
}

/// The video surface
pub trait MediaElement {
    /// Whether the element can consume an HLS master playlist by itself
    fn supports_native_hls(&self) -> bool;
    fn set_source(&mut self, url: &str);
    /// Start (re)loading the current source from scratch
    fn reload(&mut self);
    fn clear_source(&mut self);
    fn play(&mut self) -> Result<(), PlayRejected>;
    fn pause(&mut self);
    fn seek(&mut self, position: f64);
    fn set_volume(&mut self, volume: f32);
    fn set_muted(&mut self, muted: bool);
    fn poll_events(&mut self) -> Vec<ElementEvent>;
    /// Latest decoded frame, for elements that render in-window
    fn take_frame(&mut self) -> Option<DecodedFrame> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    Network,
    Media,
    Other,
}

/// Notifications from an adaptive streaming client
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Manifest resolved; the element should (re)attach to `playback_url`
    Ready { playback_url: String, variants: usize },
    LevelLoaded { duration: Option<f64>, live: bool },
    Error { kind: StreamErrorKind, fatal: bool, details: String },
}

/// Adaptive streaming client attached to one manifest
pub trait AdaptiveStream {
    /// Reload the current segment window
    fn start_load(&mut self);
    /// Re-attach after a decode failure; bounded by the client
    fn recover_media_error(&mut self);
    fn poll_events(&mut self) -> Vec<StreamEvent>;
    fn destroy(&mut self);
}

/// Creates an adaptive client for a manifest URL
pub type StreamFactory = Box<dyn FnMut(&str) -> Box<dyn AdaptiveStream>>;

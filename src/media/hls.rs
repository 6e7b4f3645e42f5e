//! HLS client: manifest parsing, variant selection and live playlist refresh
//!
//! The client runs on its own thread and reports through a channel drained by
//! `poll_events`. It never touches media data itself; the element is handed a
//! single-variant playlist it can decode.

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use super::{AdaptiveStream, StreamErrorKind, StreamEvent};

/// Consecutive playlist refresh failures before the error turns fatal
const MAX_REFRESH_FAILURES: u32 = 3;
/// Decode recoveries allowed per client
const MAX_MEDIA_RECOVERIES: u32 = 3;
/// Refresh interval used when the playlist carries no target duration
const DEFAULT_TARGET_DURATION: f64 = 6.0;
/// Shortest wait before retrying a failed refresh
const MIN_RETRY_SECS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub bandwidth: u64,
    pub resolution: Option<(u32, u32)>,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub duration: f64,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaPlaylist {
    pub target_duration: Option<f64>,
    pub media_sequence: u64,
    pub segments: Vec<Segment>,
    /// `#EXT-X-ENDLIST` seen: video on demand, no refresh needed
    pub ended: bool,
}

impl MediaPlaylist {
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    Master(Vec<Variant>),
    Media(MediaPlaylist),
}

/// Parse the comma-separated attribute list of an `#EXT-X-` tag
fn parse_attribute_list(list: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut rest = list.trim();
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_uppercase();
        rest = &rest[eq + 1..];

        let value;
        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').unwrap_or(quoted.len());
            value = quoted[..end].to_string();
            rest = quoted.get(end + 1..).unwrap_or("");
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            value = rest[..end].trim().to_string();
            rest = &rest[end..];
        }
        rest = rest.trim_start_matches(',').trim_start();
        attrs.push((key, value));
    }
    attrs
}

pub fn parse_manifest(content: &str) -> Result<Manifest, String> {
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
    if lines.next() != Some("#EXTM3U") {
        return Err("Missing #EXTM3U header".to_string());
    }

    let mut variants = Vec::new();
    let mut pending_variant: Option<(u64, Option<(u32, u32)>)> = None;
    let mut media = MediaPlaylist::default();
    let mut pending_duration: Option<f64> = None;
    let mut is_media = false;

    for line in lines {
        if let Some(attrs) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            let mut bandwidth = 0;
            let mut resolution = None;
            for (key, value) in parse_attribute_list(attrs) {
                match key.as_str() {
                    "BANDWIDTH" => bandwidth = value.parse().unwrap_or(0),
                    "RESOLUTION" => {
                        resolution = value
                            .split_once(['x', 'X'])
                            .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)));
                    }
                    _ => {}
                }
            }
            pending_variant = Some((bandwidth, resolution));
        } else if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            is_media = true;
            media.target_duration = value.trim().parse().ok();
        } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
            media.media_sequence = value.trim().parse().unwrap_or(0);
        } else if let Some(value) = line.strip_prefix("#EXTINF:") {
            is_media = true;
            let duration = value.split(',').next().unwrap_or("").trim();
            pending_duration = Some(
                duration
                    .parse()
                    .map_err(|_| format!("Invalid segment duration '{}'", duration))?,
            );
        } else if line == "#EXT-X-ENDLIST" {
            media.ended = true;
        } else if line.starts_with('#') {
            // tags we don't act on
        } else if let Some((bandwidth, resolution)) = pending_variant.take() {
            variants.push(Variant { bandwidth, resolution, uri: line.to_string() });
        } else if let Some(duration) = pending_duration.take() {
            media.segments.push(Segment { duration, uri: line.to_string() });
        }
    }

    if !variants.is_empty() {
        Ok(Manifest::Master(variants))
    } else if is_media {
        Ok(Manifest::Media(media))
    } else {
        Err("Playlist has neither variants nor segments".to_string())
    }
}

/// Resolve a playlist reference against the playlist it came from
pub fn resolve_uri(base: &str, reference: &str) -> String {
    match url::Url::parse(base).and_then(|b| b.join(reference)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => reference.to_string(),
    }
}

/// Highest-bandwidth variant; ties keep manifest order
pub fn pick_variant(variants: &[Variant]) -> Option<&Variant> {
    variants.iter().rev().max_by_key(|v| v.bandwidth)
}

enum HlsCommand {
    StartLoad,
    Stop,
}

/// What the load thread does between playlist fetches
enum Wait {
    /// Live playlist: refetch after the interval, or sooner on `StartLoad`
    Refresh(Duration),
    /// Failed refresh: `StartLoad` can't cut this short
    Backoff(Duration),
    /// VOD: refetch only when asked
    Idle,
}

/// Delay before retry `failures` (1-based): half a target duration, doubled per
/// failure, capped at four target durations
fn retry_delay(failures: u32, target_duration: f64) -> Duration {
    let base = (target_duration / 2.0).max(MIN_RETRY_SECS);
    let delay = base * 2f64.powi(failures.saturating_sub(1).min(16) as i32);
    Duration::from_secs_f64(delay.min(target_duration * 4.0).max(MIN_RETRY_SECS))
}

/// Sleep out a backoff, returns false if the client was stopped
fn wait_backoff(cmd_rx: &Receiver<HlsCommand>, delay: Duration) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        match cmd_rx.recv_timeout(remaining) {
            Ok(HlsCommand::StartLoad) => continue,
            Ok(HlsCommand::Stop) | Err(RecvTimeoutError::Disconnected) => return false,
            Err(RecvTimeoutError::Timeout) => return true,
        }
    }
}

fn fetch(agent: &ureq::Agent, url: &str) -> Result<String, String> {
    let mut response = agent
        .get(url)
        .call()
        .map_err(|e| format!("Request failed: {}", e))?;
    if response.status() != 200 {
        return Err(format!("HTTP error: {}", response.status()));
    }
    response
        .body_mut()
        .read_to_string()
        .map_err(|e| format!("Read failed: {}", e))
}

fn level_event(playlist: &MediaPlaylist) -> StreamEvent {
    StreamEvent::LevelLoaded {
        duration: playlist.ended.then(|| playlist.total_duration()),
        live: !playlist.ended,
    }
}

fn send_error(tx: &Sender<StreamEvent>, kind: StreamErrorKind, fatal: bool, details: String) {
    let _ = tx.send(StreamEvent::Error { kind, fatal, details });
}

pub struct HlsClient {
    command_sender: Option<Sender<HlsCommand>>,
    event_receiver: Option<Receiver<StreamEvent>>,
    pending: Vec<StreamEvent>,
    last_ready: Option<(String, usize)>,
    media_recoveries: u32,
}

impl HlsClient {
    /// Start loading `manifest_url` on a background thread
    pub fn attach(manifest_url: &str) -> Self {
        let (cmd_tx, cmd_rx) = channel();
        let (event_tx, event_rx) = channel();
        let url = manifest_url.to_string();

        thread::spawn(move || {
            let agent = ureq::Agent::config_builder()
                .timeout_global(Some(Duration::from_secs(15)))
                .timeout_connect(Some(Duration::from_secs(10)))
                .build()
                .new_agent();
            Self::load_thread(&agent, &url, cmd_rx, event_tx);
        });

        Self {
            command_sender: Some(cmd_tx),
            event_receiver: Some(event_rx),
            pending: Vec::new(),
            last_ready: None,
            media_recoveries: 0,
        }
    }

    fn load_thread(
        agent: &ureq::Agent,
        manifest_url: &str,
        cmd_rx: Receiver<HlsCommand>,
        tx: Sender<StreamEvent>,
    ) {
        let content = match fetch(agent, manifest_url) {
            Ok(c) => c,
            Err(e) => {
                send_error(&tx, StreamErrorKind::Network, true, format!("Manifest load failed: {}", e));
                return;
            }
        };

        let (playback_url, variants, mut playlist) = match parse_manifest(&content) {
            Ok(Manifest::Master(list)) => {
                let Some(best) = pick_variant(&list) else {
                    send_error(&tx, StreamErrorKind::Other, true, "No playable variant".to_string());
                    return;
                };
                (resolve_uri(manifest_url, &best.uri), list.len(), None)
            }
            Ok(Manifest::Media(playlist)) => (manifest_url.to_string(), 1, Some(playlist)),
            Err(e) => {
                send_error(&tx, StreamErrorKind::Other, true, format!("Manifest parse failed: {}", e));
                return;
            }
        };

        if tx.send(StreamEvent::Ready { playback_url: playback_url.clone(), variants }).is_err() {
            return;
        }

        let mut failures = 0;
        let mut target_duration = DEFAULT_TARGET_DURATION;
        loop {
            let loaded = match playlist.take() {
                Some(p) => Ok(p),
                None => fetch(agent, &playback_url).and_then(|text| match parse_manifest(&text)? {
                    Manifest::Media(p) => Ok(p),
                    Manifest::Master(_) => Err("Variant playlist is a master playlist".to_string()),
                }),
            };

            let wait = match loaded {
                Ok(p) => {
                    failures = 0;
                    if let Some(target) = p.target_duration.filter(|t| *t > 0.0) {
                        target_duration = target;
                    }
                    if tx.send(level_event(&p)).is_err() {
                        return;
                    }
                    if p.ended {
                        Wait::Idle
                    } else {
                        Wait::Refresh(Duration::from_secs_f64(target_duration))
                    }
                }
                Err(e) => {
                    failures += 1;
                    let fatal = failures >= MAX_REFRESH_FAILURES;
                    send_error(&tx, StreamErrorKind::Network, fatal, format!("Playlist refresh failed: {}", e));
                    if fatal {
                        return;
                    }
                    Wait::Backoff(retry_delay(failures, target_duration))
                }
            };

            let proceed = match wait {
                Wait::Refresh(interval) => match cmd_rx.recv_timeout(interval) {
                    Ok(HlsCommand::Stop) | Err(RecvTimeoutError::Disconnected) => false,
                    Ok(HlsCommand::StartLoad) | Err(RecvTimeoutError::Timeout) => true,
                },
                Wait::Backoff(delay) => {
                    tracing::debug!("Retrying playlist in {:.1}s (failure {})", delay.as_secs_f64(), failures);
                    wait_backoff(&cmd_rx, delay)
                }
                Wait::Idle => matches!(cmd_rx.recv(), Ok(HlsCommand::StartLoad)),
            };
            if !proceed {
                return;
            }
        }
    }
}

impl AdaptiveStream for HlsClient {
    fn start_load(&mut self) {
        if let Some(ref sender) = self.command_sender {
            let _ = sender.send(HlsCommand::StartLoad);
        }
    }

    fn recover_media_error(&mut self) {
        if self.media_recoveries >= MAX_MEDIA_RECOVERIES {
            self.pending.push(StreamEvent::Error {
                kind: StreamErrorKind::Media,
                fatal: true,
                details: "Too many decode errors".to_string(),
            });
            return;
        }
        self.media_recoveries += 1;
        if let Some((url, variants)) = self.last_ready.clone() {
            self.pending.push(StreamEvent::Ready { playback_url: url, variants });
        }
    }

    fn poll_events(&mut self) -> Vec<StreamEvent> {
        let mut events = std::mem::take(&mut self.pending);
        if let Some(ref receiver) = self.event_receiver {
            loop {
                match receiver.try_recv() {
                    Ok(event) => {
                        if let StreamEvent::Ready { ref playback_url, variants } = event {
                            self.last_ready = Some((playback_url.clone(), variants));
                        }
                        events.push(event);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.event_receiver = None;
                        break;
                    }
                }
            }
        }
        events
    }

    fn destroy(&mut self) {
        if let Some(sender) = self.command_sender.take() {
            let _ = sender.send(HlsCommand::Stop);
        }
        self.event_receiver = None;
        self.pending.clear();
    }
}

impl Drop for HlsClient {
    fn drop(&mut self) {
        self.destroy();
    }
}

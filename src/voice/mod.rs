//! Voice assistant bridge
//!
//! `VoiceAssistant` is the UI-side handle. Each `connect` starts one worker
//! thread (see `session`) and the handle drains its events once per frame.

mod audio;
mod protocol;
mod session;

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread;

use crate::config::AppConfig;
use crate::models::{Channel, ConnectionState, Speaker, TranscriptEntry};

/// Transcript entries kept for display
const MAX_TRANSCRIPT: usize = 200;

#[derive(Debug)]
pub enum VoiceError {
    MissingApiKey,
    AlreadyActive(ConnectionState),
    Spawn(String),
}

impl std::fmt::Display for VoiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceError::MissingApiKey => write!(
                f,
                "No API key configured (set it in Settings or {})",
                crate::config::API_KEY_ENV
            ),
            VoiceError::AlreadyActive(state) => write!(f, "Voice session already {}", state.label()),
            VoiceError::Spawn(e) => write!(f, "Failed to start voice session: {}", e),
        }
    }
}

impl std::error::Error for VoiceError {}

/// UI to session
pub(crate) enum SessionCommand {
    Stop,
    SendText(String),
    /// Channel list was republished; tool calls resolve against this one
    UpdateChannels(Vec<Channel>),
}

/// Session to UI
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    StateChanged(ConnectionState),
    Transcript(Speaker, String),
    /// Model finished or was interrupted; the next fragment starts a new entry
    TurnEnded,
    InputLevel(f32),
    OutputLevel(f32),
    ChangeChannel(String),
    /// Non-fatal condition worth showing
    Notice(String),
    Error(String),
}

pub struct VoiceAssistant {
    state: ConnectionState,
    commands: Option<Sender<SessionCommand>>,
    events: Option<Receiver<VoiceEvent>>,
    transcript: Vec<TranscriptEntry>,
    turn_open: bool,
    input_level: f32,
    output_level: f32,
    last_error: Option<String>,
}

impl VoiceAssistant {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            commands: None,
            events: None,
            transcript: Vec::new(),
            turn_open: false,
            input_level: 0.0,
            output_level: 0.0,
            last_error: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn input_level(&self) -> f32 {
        self.input_level
    }

    pub fn output_level(&self) -> f32 {
        self.output_level
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ConnectionState::Connecting | ConnectionState::Connected)
    }

    /// Open a session with the current channel list as context
    pub fn connect(&mut self, channels: &[Channel], config: &AppConfig) -> Result<(), VoiceError> {
        let url = config.api_key().map(|key| protocol::endpoint_url(&key));
        self.connect_to(channels, config, url)
    }

    fn connect_to(&mut self, channels: &[Channel], config: &AppConfig, url: Option<String>) -> Result<(), VoiceError> {
        if !self.state.can_transition(ConnectionState::Connecting) {
            return Err(VoiceError::AlreadyActive(self.state));
        }
        let url = url.ok_or(VoiceError::MissingApiKey)?;

        let params = session::SessionParams {
            url,
            model: config.voice_model.clone(),
            voice_name: config.voice_name.clone(),
            channels: channels.to_vec(),
        };
        let (cmd_tx, cmd_rx) = channel();
        let (event_tx, event_rx) = channel();

        thread::Builder::new()
            .name("voice-session".to_string())
            .spawn(move || session::run(params, cmd_rx, event_tx))
            .map_err(|e| VoiceError::Spawn(e.to_string()))?;

        self.commands = Some(cmd_tx);
        self.events = Some(event_rx);
        self.last_error = None;
        self.turn_open = false;
        self.set_state(ConnectionState::Connecting);
        Ok(())
    }

    /// Ask the session to stop; the worker releases everything and reports Disconnected
    pub fn disconnect(&mut self) {
        if let Some(sender) = self.commands.take() {
            let _ = sender.send(SessionCommand::Stop);
        }
    }

    /// Hand a republished channel list to the running session
    pub fn update_channels(&self, channels: &[Channel]) {
        if let Some(sender) = &self.commands {
            let _ = sender.send(SessionCommand::UpdateChannels(channels.to_vec()));
        }
    }

    /// Send a typed request; ignored unless connected
    pub fn send_text(&mut self, text: &str) -> bool {
        let text = text.trim();
        if self.state != ConnectionState::Connected || text.is_empty() {
            return false;
        }
        let sent = self
            .commands
            .as_ref()
            .is_some_and(|c| c.send(SessionCommand::SendText(text.to_string())).is_ok());
        if sent {
            self.push_transcript(Speaker::User, text);
            self.turn_open = false;
        }
        sent
    }

    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
        self.turn_open = false;
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        if self.state.can_transition(next) {
            tracing::info!("Voice: {} -> {}", self.state.label(), next.label());
            self.state = next;
        } else {
            tracing::warn!("Ignoring voice transition {} -> {}", self.state.label(), next.label());
        }
    }

    /// Transcription arrives in fragments; extend the open entry for the same speaker
    fn push_transcript(&mut self, speaker: Speaker, text: &str) {
        match self.transcript.last_mut() {
            Some(last) if self.turn_open && last.speaker == speaker => last.text.push_str(text),
            _ => {
                self.transcript.push(TranscriptEntry { speaker, text: text.trim_start().to_string() });
                if self.transcript.len() > MAX_TRANSCRIPT {
                    self.transcript.remove(0);
                }
            }
        }
        self.turn_open = true;
    }

    /// Drain session events; channel changes and errors are returned to the caller
    pub fn poll(&mut self) -> Vec<VoiceEvent> {
        let mut drained = Vec::new();
        if let Some(ref receiver) = self.events {
            loop {
                match receiver.try_recv() {
                    Ok(event) => drained.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.events = None;
                        self.commands = None;
                        break;
                    }
                }
            }
        }

        let mut out = Vec::new();
        for event in drained {
            match event {
                VoiceEvent::StateChanged(state) => self.set_state(state),
                VoiceEvent::Transcript(speaker, ref text) => self.push_transcript(speaker, text),
                VoiceEvent::TurnEnded => self.turn_open = false,
                VoiceEvent::InputLevel(level) => self.input_level = level,
                VoiceEvent::OutputLevel(level) => self.output_level = level,
                VoiceEvent::Error(ref e) => {
                    self.last_error = Some(e.clone());
                    self.set_state(ConnectionState::Error);
                }
                VoiceEvent::ChangeChannel(_) | VoiceEvent::Notice(_) => {}
            }
            out.push(event);
        }

        // worker gone without a final state (panic)
        if self.events.is_none() && self.is_active() {
            self.set_state(ConnectionState::Error);
            self.last_error.get_or_insert_with(|| "Voice session ended unexpectedly".to_string());
        }
        out
    }
}

impl Default for VoiceAssistant {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VoiceAssistant {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached() -> (VoiceAssistant, Sender<VoiceEvent>, Receiver<SessionCommand>) {
        let (cmd_tx, cmd_rx) = channel();
        let (event_tx, event_rx) = channel();
        let mut assistant = VoiceAssistant::new();
        assistant.commands = Some(cmd_tx);
        assistant.events = Some(event_rx);
        assistant.state = ConnectionState::Connecting;
        (assistant, event_tx, cmd_rx)
    }

    #[test]
    fn test_connect_requires_api_key() {
        let mut assistant = VoiceAssistant::new();
        let config = AppConfig::default();
        assert!(matches!(assistant.connect_to(&[], &config, None), Err(VoiceError::MissingApiKey)));
        assert_eq!(assistant.state(), ConnectionState::Disconnected);
        assert!(assistant.commands.is_none());
    }

    #[test]
    fn test_connect_starts_session_worker() {
        let mut assistant = VoiceAssistant::new();
        let config = AppConfig::default();
        let url = Some("ws://127.0.0.1:1/live".to_string());
        assert!(assistant.connect_to(&[], &config, url).is_ok());
        assert_eq!(assistant.state(), ConnectionState::Connecting);

        // nothing listens on port 1, so the worker reports a failure
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while assistant.state() != ConnectionState::Error && std::time::Instant::now() < deadline {
            assistant.poll();
            thread::sleep(std::time::Duration::from_millis(20));
        }
        assert_eq!(assistant.state(), ConnectionState::Error);
        assert!(assistant.last_error().is_some());
    }

    #[test]
    fn test_update_channels_forwards_to_session() {
        let (assistant, _tx, cmd_rx) = attached();
        let channels = vec![Channel { id: "news".into(), name: "World News".into(), ..Default::default() }];
        assistant.update_channels(&channels);
        assert!(matches!(cmd_rx.try_recv(), Ok(SessionCommand::UpdateChannels(c)) if c == channels));
    }

    #[test]
    fn test_connect_rejected_while_active() {
        let (mut assistant, _tx, _rx) = attached();
        let config = AppConfig { voice_api_key: "key".into(), ..Default::default() };
        assert!(matches!(
            assistant.connect(&[], &config),
            Err(VoiceError::AlreadyActive(ConnectionState::Connecting))
        ));
    }

    #[test]
    fn test_session_lifecycle() {
        let (mut assistant, tx, cmd_rx) = attached();
        tx.send(VoiceEvent::StateChanged(ConnectionState::Connected)).unwrap();
        tx.send(VoiceEvent::ChangeChannel("news".into())).unwrap();
        let events = assistant.poll();
        assert_eq!(assistant.state(), ConnectionState::Connected);
        assert!(events.contains(&VoiceEvent::ChangeChannel("news".into())));

        assistant.disconnect();
        assert!(matches!(cmd_rx.try_recv(), Ok(SessionCommand::Stop)));
        tx.send(VoiceEvent::StateChanged(ConnectionState::Disconnected)).unwrap();
        drop(tx);
        assistant.poll();
        assert_eq!(assistant.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_error_surfaces_and_allows_retry() {
        let (mut assistant, tx, _rx) = attached();
        tx.send(VoiceEvent::Error("Connection failed".into())).unwrap();
        tx.send(VoiceEvent::StateChanged(ConnectionState::Error)).unwrap();
        drop(tx);
        assistant.poll();
        assert_eq!(assistant.state(), ConnectionState::Error);
        assert_eq!(assistant.last_error(), Some("Connection failed"));
        assert!(assistant.state().can_transition(ConnectionState::Connecting));
    }

    #[test]
    fn test_worker_vanishing_is_an_error() {
        let (mut assistant, tx, _rx) = attached();
        drop(tx);
        assistant.poll();
        assert_eq!(assistant.state(), ConnectionState::Error);
        assert!(assistant.last_error().is_some());
    }

    #[test]
    fn test_transcript_fragments_merge_per_turn() {
        let (mut assistant, tx, _rx) = attached();
        for event in [
            VoiceEvent::Transcript(Speaker::User, "What's ".into()),
            VoiceEvent::Transcript(Speaker::User, "on?".into()),
            VoiceEvent::Transcript(Speaker::Assistant, "Try ".into()),
            VoiceEvent::Transcript(Speaker::Assistant, "the news.".into()),
            VoiceEvent::TurnEnded,
            VoiceEvent::Transcript(Speaker::Assistant, " Anything else?".into()),
        ] {
            tx.send(event).unwrap();
        }
        assistant.poll();
        let texts: Vec<&str> = assistant.transcript().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["What's on?", "Try the news.", "Anything else?"]);
        assert_eq!(assistant.transcript()[0].speaker, Speaker::User);
    }

    #[test]
    fn test_send_text_only_when_connected() {
        let (mut assistant, tx, cmd_rx) = attached();
        assert!(!assistant.send_text("hello"));
        tx.send(VoiceEvent::StateChanged(ConnectionState::Connected)).unwrap();
        assistant.poll();
        assert!(assistant.send_text("  recommend something  "));
        assert!(matches!(cmd_rx.try_recv(), Ok(SessionCommand::SendText(t)) if t == "recommend something"));
        assert_eq!(assistant.transcript().last().map(|e| e.text.as_str()), Some("recommend something"));
    }
}

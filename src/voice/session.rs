//! Live session worker thread
//!
//! Owns the socket and both audio devices. Everything acquired here lives in
//! `SessionResources`, whose drop releases it no matter how the loop exits.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::time::{Duration, Instant};

use serde_json::json;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{HandshakeError, Message, WebSocket};

use super::audio::{CaptureChunk, Microphone, PlaybackQueue, Speaker};
use super::protocol::{self, FunctionCall, FunctionResponse, ServerEvent, CHANGE_CHANNEL, OUTPUT_SAMPLE_RATE};
use super::{SessionCommand, VoiceEvent};
use crate::models::{Channel, ConnectionState, Speaker as Who};

/// Socket read timeout; bounds how long mic chunks wait to go out
const POLL_INTERVAL: Duration = Duration::from_millis(20);
const LEVEL_INTERVAL: Duration = Duration::from_millis(100);
const SETUP_TIMEOUT: Duration = Duration::from_secs(15);
/// TCP connect plus WebSocket/TLS handshake
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);
/// Socket timeout while the handshake is in flight; stop requests are checked between steps
const HANDSHAKE_STEP: Duration = Duration::from_millis(100);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

pub(crate) struct SessionParams {
    pub url: String,
    pub model: String,
    pub voice_name: String,
    pub channels: Vec<Channel>,
}

/// Resources of one session, released together
struct SessionResources {
    socket: Option<Socket>,
    microphone: Option<Microphone>,
    speaker: Option<Speaker>,
    playback: PlaybackQueue,
    events: Sender<VoiceEvent>,
    /// Reported to the UI once everything is released
    final_state: ConnectionState,
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        // Mic first so no more chunks are produced
        self.microphone = None;
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None);
            let _ = socket.flush();
        }
        self.playback.flush();
        self.speaker = None;
        let _ = self.events.send(VoiceEvent::InputLevel(0.0));
        let _ = self.events.send(VoiceEvent::OutputLevel(0.0));
        let _ = self.events.send(VoiceEvent::StateChanged(self.final_state));
        tracing::info!("Voice session released ({})", self.final_state.label());
    }
}

/// Answer a function call; a channel change is returned for the UI
pub(crate) fn handle_tool_call(call: &FunctionCall, channels: &HashMap<String, String>) -> (Option<String>, FunctionResponse) {
    let respond = |response| FunctionResponse { id: call.id.clone(), name: call.name.clone(), response };

    if call.name != CHANGE_CHANNEL {
        return (None, respond(json!({ "error": format!("Unknown function '{}'", call.name) })));
    }

    let requested = call.args.get("channelId").and_then(|v| v.as_str()).unwrap_or("");
    match channels.get(requested) {
        Some(name) => (
            Some(requested.to_string()),
            respond(json!({ "result": format!("Switched to {}", name) })),
        ),
        None => (
            None,
            respond(json!({ "error": format!("Unknown channel id '{}'", requested) })),
        ),
    }
}

fn is_timeout(err: &tungstenite::Error) -> bool {
    matches!(err, tungstenite::Error::Io(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut))
}

fn set_timeouts(stream: &TcpStream, read: Duration, write: Duration) -> std::io::Result<()> {
    stream.set_read_timeout(Some(read))?;
    stream.set_write_timeout(Some(write))
}

fn set_session_timeouts(socket: &Socket) {
    let result = match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => set_timeouts(stream, POLL_INTERVAL, WRITE_TIMEOUT),
        MaybeTlsStream::Rustls(stream) => set_timeouts(stream.get_ref(), POLL_INTERVAL, WRITE_TIMEOUT),
        _ => Ok(()),
    };
    if let Err(e) = result {
        tracing::warn!("Failed to set socket timeouts: {}", e);
    }
}

/// Drain pending commands before the session is live; typed text is dropped
fn stop_requested(commands: &Receiver<SessionCommand>, channels: &mut Option<Vec<Channel>>) -> bool {
    loop {
        match commands.try_recv() {
            Ok(SessionCommand::Stop) | Err(TryRecvError::Disconnected) => return true,
            Ok(SessionCommand::UpdateChannels(updated)) => *channels = Some(updated),
            Ok(SessionCommand::SendText(_)) => {}
            Err(TryRecvError::Empty) => return false,
        }
    }
}

fn channel_names(channels: &[Channel]) -> HashMap<String, String> {
    channels.iter().map(|c| (c.id.clone(), c.name.clone())).collect()
}

/// Connect and run the handshake in short steps so a silent endpoint can't
/// hold the worker past `OPEN_TIMEOUT` or past a stop request
fn open_socket(
    url: &str,
    commands: &Receiver<SessionCommand>,
    channels: &mut Option<Vec<Channel>>,
) -> Result<Socket, Exit> {
    let failed = |e: String| Exit::Failed(format!("Connection failed: {}", e));
    let deadline = Instant::now() + OPEN_TIMEOUT;

    let parsed = url::Url::parse(url).map_err(|e| failed(e.to_string()))?;
    let host = parsed.host_str().ok_or_else(|| failed("endpoint has no host".to_string()))?;
    let port = parsed.port_or_known_default().unwrap_or(443);
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| failed(e.to_string()))?
        .collect();

    let mut stream = None;
    let mut last_error = "no address".to_string();
    for addr in &addrs {
        if stop_requested(commands, channels) {
            return Err(Exit::Stopped);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match TcpStream::connect_timeout(addr, remaining) {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(e) => last_error = e.to_string(),
        }
    }
    let stream = stream.ok_or_else(|| failed(last_error))?;
    let _ = stream.set_nodelay(true);
    set_timeouts(&stream, HANDSHAKE_STEP, HANDSHAKE_STEP).map_err(|e| failed(e.to_string()))?;

    let mut attempt = tungstenite::client_tls_with_config(url, stream, None, None);
    loop {
        match attempt {
            Ok((socket, _response)) => return Ok(socket),
            Err(HandshakeError::Interrupted(mid)) => {
                if stop_requested(commands, channels) {
                    return Err(Exit::Stopped);
                }
                if Instant::now() >= deadline {
                    return Err(failed("handshake timed out".to_string()));
                }
                attempt = mid.handshake();
            }
            Err(HandshakeError::Failure(e)) if is_timeout(&e) => {
                return Err(failed("handshake timed out".to_string()));
            }
            Err(HandshakeError::Failure(e)) => return Err(failed(e.to_string())),
        }
    }
}

enum Exit {
    Stopped,
    Closed,
    Failed(String),
}

pub(crate) fn run(params: SessionParams, commands: Receiver<SessionCommand>, events: Sender<VoiceEvent>) {
    let mut resources = SessionResources {
        socket: None,
        microphone: None,
        speaker: None,
        playback: PlaybackQueue::new(OUTPUT_SAMPLE_RATE),
        events: events.clone(),
        final_state: ConnectionState::Error,
    };

    let exit = session_loop(&params, &commands, &events, &mut resources);
    resources.final_state = match exit {
        Exit::Stopped | Exit::Closed => ConnectionState::Disconnected,
        Exit::Failed(e) => {
            tracing::error!("Voice session failed: {}", e);
            let _ = events.send(VoiceEvent::Error(e));
            ConnectionState::Error
        }
    };
    // resources dropped here
}

fn session_loop(
    params: &SessionParams,
    commands: &Receiver<SessionCommand>,
    events: &Sender<VoiceEvent>,
    resources: &mut SessionResources,
) -> Exit {
    tracing::info!("Connecting voice session ({})", params.model);
    let mut republished = None;
    let socket = match open_socket(&params.url, commands, &mut republished) {
        Ok(socket) => socket,
        Err(exit) => return exit,
    };
    set_session_timeouts(&socket);
    let socket = resources.socket.insert(socket);
    let channels = republished.as_deref().unwrap_or(params.channels.as_slice());

    let setup = protocol::setup_message(&params.model, &params.voice_name, &protocol::system_prompt(channels));
    if let Err(e) = socket.send(Message::text(setup)) {
        return Exit::Failed(format!("Setup send failed: {}", e));
    }

    let mut known_channels = channel_names(channels);
    let (mic_tx, mic_rx) = channel::<CaptureChunk>();
    let mut mic_tx = Some(mic_tx);
    let mut connected = false;
    let connect_started = Instant::now();
    let mut last_level = Instant::now();

    loop {
        // UI commands
        loop {
            match commands.try_recv() {
                Ok(SessionCommand::Stop) | Err(TryRecvError::Disconnected) => return Exit::Stopped,
                Ok(SessionCommand::SendText(text)) if connected => {
                    if let Err(e) = socket.send(Message::text(protocol::text_message(&text))) {
                        return Exit::Failed(format!("Send failed: {}", e));
                    }
                }
                Ok(SessionCommand::SendText(_)) => {}
                Ok(SessionCommand::UpdateChannels(channels)) => known_channels = channel_names(&channels),
                Err(TryRecvError::Empty) => break,
            }
        }

        // Microphone chunks
        while let Ok(chunk) = mic_rx.try_recv() {
            let _ = events.send(VoiceEvent::InputLevel(chunk.level));
            if let Err(e) = socket.send(Message::text(protocol::audio_message(&chunk.pcm))) {
                return Exit::Failed(format!("Send failed: {}", e));
            }
        }

        if last_level.elapsed() >= LEVEL_INTERVAL {
            let _ = events.send(VoiceEvent::OutputLevel(resources.playback.level()));
            last_level = Instant::now();
        }

        if !connected && connect_started.elapsed() > SETUP_TIMEOUT {
            return Exit::Failed("Timed out waiting for session setup".to_string());
        }

        let text = match socket.read() {
            Ok(Message::Text(text)) => text.as_str().to_string(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(text) => text,
                Err(_) => continue,
            },
            Ok(Message::Close(frame)) => {
                tracing::info!("Voice session closed by server: {:?}", frame);
                return Exit::Closed;
            }
            Ok(_) => continue,
            Err(e) if is_timeout(&e) => continue,
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => return Exit::Closed,
            Err(e) => return Exit::Failed(format!("Socket error: {}", e)),
        };

        let server_events = match protocol::parse_server_message(&text) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("{}", e);
                continue;
            }
        };

        let mut responses = Vec::new();
        for event in server_events {
            match event {
                ServerEvent::SetupComplete => {
                    connected = true;
                    let _ = events.send(VoiceEvent::StateChanged(ConnectionState::Connected));
                    // devices are opened only once the session is live
                    match Speaker::start() {
                        Ok(speaker) => {
                            resources.playback = speaker.queue().clone();
                            resources.speaker = Some(speaker);
                        }
                        Err(e) => {
                            tracing::warn!("Voice output unavailable: {}", e);
                            let _ = events.send(VoiceEvent::Notice(format!("Speaker unavailable: {}", e)));
                        }
                    }
                    if let Some(tx) = mic_tx.take() {
                        match Microphone::start(tx) {
                            Ok(mic) => resources.microphone = Some(mic),
                            Err(e) => {
                                tracing::warn!("Microphone unavailable: {}", e);
                                let _ = events.send(VoiceEvent::Notice(format!(
                                    "Microphone unavailable ({}); type requests instead",
                                    e
                                )));
                            }
                        }
                    }
                }
                ServerEvent::Audio(pcm) => {
                    if resources.speaker.is_some() {
                        resources.playback.push(&protocol::i16_to_f32(&pcm), OUTPUT_SAMPLE_RATE);
                    }
                }
                ServerEvent::Interrupted => {
                    tracing::debug!("Model interrupted; flushing playback");
                    resources.playback.flush();
                    let _ = events.send(VoiceEvent::TurnEnded);
                }
                ServerEvent::TurnComplete => {
                    let _ = events.send(VoiceEvent::TurnEnded);
                }
                ServerEvent::InputTranscript(text) => {
                    let _ = events.send(VoiceEvent::Transcript(Who::User, text));
                }
                ServerEvent::OutputTranscript(text) => {
                    let _ = events.send(VoiceEvent::Transcript(Who::Assistant, text));
                }
                ServerEvent::ToolCall(call) => {
                    let (change, response) = handle_tool_call(&call, &known_channels);
                    tracing::info!("Tool call {} ({}): {}", call.name, call.id, response.response);
                    if let Some(id) = change {
                        let _ = events.send(VoiceEvent::ChangeChannel(id));
                    }
                    responses.push(response);
                }
                ServerEvent::GoAway => {
                    tracing::info!("Server requested session end");
                    return Exit::Closed;
                }
            }
        }

        if !responses.is_empty() {
            if let Err(e) = socket.send(Message::text(protocol::tool_response_message(&responses))) {
                return Exit::Failed(format!("Tool response failed: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names() -> HashMap<String, String> {
        HashMap::from([("news".to_string(), "World News".to_string())])
    }

    fn call(name: &str, args: serde_json::Value) -> FunctionCall {
        FunctionCall { id: "call-7".to_string(), name: name.to_string(), args }
    }

    #[test]
    fn test_known_channel_switches_and_acks() {
        let (change, response) = handle_tool_call(&call(CHANGE_CHANNEL, json!({ "channelId": "news" })), &names());
        assert_eq!(change.as_deref(), Some("news"));
        assert_eq!(response.id, "call-7");
        assert_eq!(response.response["result"], "Switched to World News");
    }

    #[test]
    fn test_unknown_channel_acks_with_error() {
        let (change, response) = handle_tool_call(&call(CHANGE_CHANNEL, json!({ "channelId": "nope" })), &names());
        assert!(change.is_none());
        assert_eq!(response.id, "call-7");
        assert!(response.response["error"].as_str().unwrap().contains("nope"));

        let (change, response) = handle_tool_call(&call(CHANGE_CHANNEL, json!({})), &names());
        assert!(change.is_none());
        assert!(response.response.get("error").is_some());
    }

    #[test]
    fn test_unknown_function_acks_with_error() {
        let (change, response) = handle_tool_call(&call("setVolume", json!({ "level": 3 })), &names());
        assert!(change.is_none());
        assert_eq!(response.name, "setVolume");
        assert!(response.response["error"].as_str().unwrap().contains("setVolume"));
    }

    #[test]
    fn test_resources_release_on_drop() {
        let (tx, rx) = channel();
        let playback = PlaybackQueue::new(OUTPUT_SAMPLE_RATE);
        playback.push(&[0.5; 240], OUTPUT_SAMPLE_RATE);
        let resources = SessionResources {
            socket: None,
            microphone: None,
            speaker: None,
            playback: playback.clone(),
            events: tx,
            final_state: ConnectionState::Disconnected,
        };
        drop(resources);

        assert!(playback.is_empty());
        let events: Vec<VoiceEvent> = rx.try_iter().collect();
        assert_eq!(events.last(), Some(&VoiceEvent::StateChanged(ConnectionState::Disconnected)));
    }

    #[test]
    fn test_unreachable_endpoint_reports_error() {
        let (cmd_tx, cmd_rx) = channel();
        let (tx, rx) = channel();
        let params = SessionParams {
            url: "ws://127.0.0.1:1/live".to_string(),
            model: "models/test".to_string(),
            voice_name: "Puck".to_string(),
            channels: Vec::new(),
        };
        run(params, cmd_rx, tx);
        drop(cmd_tx);

        let events: Vec<VoiceEvent> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, VoiceEvent::Error(_))));
        assert_eq!(events.last(), Some(&VoiceEvent::StateChanged(ConnectionState::Error)));
    }

    fn local_params(addr: std::net::SocketAddr, channels: Vec<Channel>) -> SessionParams {
        SessionParams {
            url: format!("ws://{}/live", addr),
            model: "models/test".to_string(),
            voice_name: "Puck".to_string(),
            channels,
        }
    }

    #[test]
    fn test_stop_during_stalled_handshake() {
        // Accepts the TCP connection and never answers the upgrade request
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let params = local_params(listener.local_addr().unwrap(), Vec::new());
        let (cmd_tx, cmd_rx) = channel();
        let (tx, rx) = channel();
        let worker = std::thread::spawn(move || run(params, cmd_rx, tx));

        let (_peer, _) = listener.accept().unwrap();
        std::thread::sleep(Duration::from_millis(200));
        let stopped_at = Instant::now();
        cmd_tx.send(SessionCommand::Stop).unwrap();

        let mut final_state = None;
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(5)) {
            if let VoiceEvent::StateChanged(state) = event {
                final_state = Some(state);
                break;
            }
        }
        assert_eq!(final_state, Some(ConnectionState::Disconnected));
        assert!(stopped_at.elapsed() < OPEN_TIMEOUT);
        worker.join().unwrap();
    }

    #[test]
    fn test_tool_calls_use_updated_channel_list() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let channels = vec![Channel { id: "news".to_string(), name: "World News".to_string(), ..Default::default() }];
        let params = local_params(listener.local_addr().unwrap(), channels);
        let (cmd_tx, cmd_rx) = channel();
        let (tx, rx) = channel();
        let (go_tx, go_rx) = channel::<()>();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            let setup = ws.read().unwrap();
            assert!(setup.to_text().unwrap().contains("setup"));
            ws.send(Message::text(r#"{"setupComplete":{}}"#)).unwrap();
            go_rx.recv().unwrap();
            ws.send(Message::text(
                r#"{"toolCall":{"functionCalls":[{"id":"call-1","name":"changeChannel","args":{"channelId":"news"}}]}}"#,
            ))
            .unwrap();
            loop {
                let text = ws.read().unwrap().to_text().unwrap().to_string();
                if text.contains("toolResponse") {
                    return text;
                }
            }
        });
        let worker = std::thread::spawn(move || run(params, cmd_rx, tx));

        loop {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                VoiceEvent::StateChanged(ConnectionState::Connected) => break,
                _ => continue,
            }
        }
        // "news" was deleted and published while the session was live
        cmd_tx.send(SessionCommand::UpdateChannels(Vec::new())).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        go_tx.send(()).unwrap();

        let reply: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
        let response = &reply["toolResponse"]["functionResponses"][0]["response"];
        assert!(response["error"].as_str().unwrap().contains("news"));

        cmd_tx.send(SessionCommand::Stop).unwrap();
        worker.join().unwrap();
        let events: Vec<VoiceEvent> = rx.try_iter().collect();
        assert!(!events.iter().any(|e| matches!(e, VoiceEvent::ChangeChannel(_))));
    }
}

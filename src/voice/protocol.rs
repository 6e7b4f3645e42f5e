//! Live API wire messages
//!
//! Outbound messages are built as typed structs; inbound frames are decoded
//! into `ServerEvent`s so the session loop never touches raw JSON.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::Channel;

pub const ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Microphone audio sent upstream
pub const INPUT_SAMPLE_RATE: u32 = 16_000;
/// Synthesized speech received from the model
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

pub const CHANGE_CHANNEL: &str = "changeChannel";

pub fn endpoint_url(api_key: &str) -> String {
    format!("{}?key={}", ENDPOINT, api_key)
}

// ---- outbound ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: Value,
    system_instruction: Value,
    tools: Value,
    input_audio_transcription: Value,
    output_audio_transcription: Value,
}

pub fn setup_message(model: &str, voice_name: &str, system_prompt: &str) -> String {
    let setup = Setup {
        model: model.to_string(),
        generation_config: json!({
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice_name } }
            }
        }),
        system_instruction: json!({ "parts": [{ "text": system_prompt }] }),
        tools: json!([{
            "functionDeclarations": [{
                "name": CHANGE_CHANNEL,
                "description": "Switch the TV to the channel with the given id.",
                "parameters": {
                    "type": "OBJECT",
                    "properties": {
                        "channelId": {
                            "type": "STRING",
                            "description": "The id of the channel to switch to, from the channel list."
                        }
                    },
                    "required": ["channelId"]
                }
            }]
        }]),
        input_audio_transcription: json!({}),
        output_audio_transcription: json!({}),
    };
    json!({ "setup": setup }).to_string()
}

/// One chunk of 16 kHz mono PCM16 microphone audio
pub fn audio_message(pcm: &[i16]) -> String {
    json!({
        "realtimeInput": {
            "audio": {
                "mimeType": format!("audio/pcm;rate={}", INPUT_SAMPLE_RATE),
                "data": encode_pcm16(pcm),
            }
        }
    })
    .to_string()
}

/// Typed user turn
pub fn text_message(text: &str) -> String {
    json!({
        "clientContent": {
            "turns": [{ "role": "user", "parts": [{ "text": text }] }],
            "turnComplete": true
        }
    })
    .to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

pub fn tool_response_message(responses: &[FunctionResponse]) -> String {
    json!({ "toolResponse": { "functionResponses": responses } }).to_string()
}

// ---- inbound ----

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<Value>,
    server_content: Option<ServerContent>,
    tool_call: Option<ToolCall>,
    go_away: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<Content>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
    input_transcription: Option<Transcription>,
    output_transcription: Option<Transcription>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct Transcription {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCall {
    #[serde(default)]
    function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// Decoded server frame contents, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SetupComplete,
    /// 24 kHz mono PCM16
    Audio(Vec<i16>),
    Interrupted,
    TurnComplete,
    InputTranscript(String),
    OutputTranscript(String),
    ToolCall(FunctionCall),
    GoAway,
}

pub fn parse_server_message(text: &str) -> Result<Vec<ServerEvent>, String> {
    let message: ServerMessage =
        serde_json::from_str(text).map_err(|e| format!("Invalid server message: {}", e))?;
    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        events.push(ServerEvent::SetupComplete);
    }

    if let Some(content) = message.server_content {
        // interruption comes first so stale audio is dropped before anything new
        if content.interrupted {
            events.push(ServerEvent::Interrupted);
        }
        if let Some(t) = content.input_transcription.filter(|t| !t.text.is_empty()) {
            events.push(ServerEvent::InputTranscript(t.text));
        }
        for part in content.model_turn.map(|c| c.parts).unwrap_or_default() {
            if let Some(inline) = part.inline_data {
                if inline.mime_type.is_empty() || inline.mime_type.starts_with("audio/pcm") {
                    events.push(ServerEvent::Audio(decode_pcm16(&inline.data)?));
                }
            }
        }
        if let Some(t) = content.output_transcription.filter(|t| !t.text.is_empty()) {
            events.push(ServerEvent::OutputTranscript(t.text));
        }
        if content.turn_complete {
            events.push(ServerEvent::TurnComplete);
        }
    }

    if let Some(call) = message.tool_call {
        events.extend(call.function_calls.into_iter().map(ServerEvent::ToolCall));
    }

    if message.go_away.is_some() {
        events.push(ServerEvent::GoAway);
    }

    Ok(events)
}

// ---- context ----

/// System instruction with the live channel list, favorites marked
pub fn system_prompt(channels: &[Channel]) -> String {
    let mut prompt = String::from(
        "You are the voice assistant of TVDeck, an internet TV app. \
         You can switch what is playing by calling changeChannel with a channel id from the list below. \
         When the user asks for a recommendation, suggest channels from this list, preferring favorites, \
         and offer to switch. Keep spoken answers short.\n\nChannels:\n",
    );
    for ch in channels {
        prompt.push_str(&format!("- {}: {}", ch.id, ch.name));
        if !ch.category.is_empty() {
            prompt.push_str(&format!(" [{}]", ch.category));
        }
        if !ch.current_program.is_empty() {
            prompt.push_str(&format!(" now showing \"{}\"", ch.current_program));
        }
        if ch.favorite() {
            prompt.push_str(" (favorite)");
        }
        prompt.push('\n');
    }
    let favorites: Vec<&str> = channels.iter().filter(|c| c.favorite()).map(|c| c.name.as_str()).collect();
    if favorites.is_empty() {
        prompt.push_str("\nThe user has no favorites yet.\n");
    } else {
        prompt.push_str(&format!("\nThe user's favorites: {}.\n", favorites.join(", ")));
    }
    prompt
}

// ---- PCM ----

pub fn encode_pcm16(samples: &[i16]) -> String {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    STANDARD.encode(bytes)
}

pub fn decode_pcm16(data: &str) -> Result<Vec<i16>, String> {
    let bytes = STANDARD.decode(data).map_err(|e| format!("Invalid audio payload: {}", e))?;
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str, name: &str, favorite: bool) -> Channel {
        Channel {
            id: id.to_string(),
            name: name.to_string(),
            category: "News".to_string(),
            current_program: "Evening Report".to_string(),
            video_url: format!("http://cdn/{}.m3u8", id),
            is_favorite: Some(favorite),
            ..Default::default()
        }
    }

    #[test]
    fn test_setup_declares_change_channel() {
        let msg: Value = serde_json::from_str(&setup_message("models/live", "Puck", "hello")).unwrap();
        let setup = &msg["setup"];
        assert_eq!(setup["model"], "models/live");
        assert_eq!(setup["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Puck"
        );
        assert_eq!(setup["systemInstruction"]["parts"][0]["text"], "hello");
        let decl = &setup["tools"][0]["functionDeclarations"][0];
        assert_eq!(decl["name"], "changeChannel");
        assert_eq!(decl["parameters"]["required"][0], "channelId");
        assert!(setup["outputAudioTranscription"].is_object());
    }

    #[test]
    fn test_system_prompt_lists_channels_and_favorites() {
        let prompt = system_prompt(&[channel("news-1", "World News", true), channel("doc", "Docs", false)]);
        assert!(prompt.contains("- news-1: World News [News] now showing \"Evening Report\" (favorite)"));
        assert!(prompt.contains("- doc: Docs"));
        assert!(prompt.contains("The user's favorites: World News."));
        assert!(system_prompt(&[]).contains("no favorites"));
    }

    #[test]
    fn test_audio_message_payload() {
        let msg: Value = serde_json::from_str(&audio_message(&[1, -2])).unwrap();
        let audio = &msg["realtimeInput"]["audio"];
        assert_eq!(audio["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(decode_pcm16(audio["data"].as_str().unwrap()).unwrap(), vec![1, -2]);
    }

    #[test]
    fn test_parse_audio_and_transcripts() {
        let data = encode_pcm16(&[100, -100, 0]);
        let text = format!(
            r#"{{"serverContent":{{"modelTurn":{{"parts":[{{"inlineData":{{"mimeType":"audio/pcm;rate=24000","data":"{}"}}}}]}},
               "inputTranscription":{{"text":"play news"}},"outputTranscription":{{"text":"Switching"}}}}}}"#,
            data
        );
        assert_eq!(
            parse_server_message(&text).unwrap(),
            vec![
                ServerEvent::InputTranscript("play news".into()),
                ServerEvent::Audio(vec![100, -100, 0]),
                ServerEvent::OutputTranscript("Switching".into()),
            ]
        );
    }

    #[test]
    fn test_parse_interrupted_first() {
        let text = r#"{"serverContent":{"turnComplete":true,"interrupted":true}}"#;
        assert_eq!(
            parse_server_message(text).unwrap(),
            vec![ServerEvent::Interrupted, ServerEvent::TurnComplete]
        );
    }

    #[test]
    fn test_parse_tool_call_and_setup() {
        assert_eq!(parse_server_message(r#"{"setupComplete":{}}"#).unwrap(), vec![ServerEvent::SetupComplete]);
        let text = r#"{"toolCall":{"functionCalls":[{"id":"call-1","name":"changeChannel","args":{"channelId":"news-1"}}]}}"#;
        let events = parse_server_message(text).unwrap();
        let [ServerEvent::ToolCall(call)] = events.as_slice() else {
            panic!("expected one tool call, got {:?}", events);
        };
        assert_eq!(call.id, "call-1");
        assert_eq!(call.args["channelId"], "news-1");
    }

    #[test]
    fn test_tool_response_carries_id() {
        let msg: Value = serde_json::from_str(&tool_response_message(&[FunctionResponse {
            id: "call-1".into(),
            name: CHANGE_CHANNEL.into(),
            response: json!({ "result": "ok" }),
        }]))
        .unwrap();
        let response = &msg["toolResponse"]["functionResponses"][0];
        assert_eq!(response["id"], "call-1");
        assert_eq!(response["response"]["result"], "ok");
    }

    #[test]
    fn test_pcm_conversion_clamps() {
        assert_eq!(f32_to_i16(&[0.0, 1.5, -1.5]), vec![0, i16::MAX, -i16::MAX]);
        let back = i16_to_f32(&[16384]);
        assert!((back[0] - 0.5).abs() < 1e-6);
        assert!(decode_pcm16("not base64!").is_err());
        assert!(parse_server_message("not json").is_err());
    }
}

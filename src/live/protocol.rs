//! Wire messages for the live conversational stream
//!
//! Client messages are serialized from typed structs. Server messages are
//! parsed once at the transport boundary and flattened into [`ServerEvent`]s
//! in the order the session must apply them.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use super::envelope::{EncodedChunk, MediaType};
use crate::Result;

/// Inbound event from the remote service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Partial transcript of the model's speech
    OutputTranscriptDelta(String),
    /// Partial transcript of the user's speech
    InputTranscriptDelta(String),
    /// The model finished its turn
    TurnComplete,
    /// Synthesized audio to play
    ModelAudioChunk(EncodedChunk),
    /// The user started speaking over the model; cancel playback
    Interrupted,
    /// Error reported without closing the stream
    Error(String),
    /// The stream ended
    Closed { reason: Option<String> },
}

/// Response modality requested from the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    Audio,
    Text,
}

/// Fixed configuration sent when a session opens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetup {
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub response_modality: Modality,
    pub transcribe_input: bool,
    pub transcribe_output: bool,
}

impl SessionSetup {
    /// Audio-only responses with transcription in both directions
    #[must_use]
    pub fn new(model: &str, voice: &str, system_instruction: &str) -> Self {
        Self {
            model: model.to_string(),
            voice: voice.to_string(),
            system_instruction: system_instruction.to_string(),
            response_modality: Modality::Audio,
            transcribe_input: true,
            transcribe_output: true,
        }
    }

    /// Build the opening `setup` message
    #[must_use]
    pub fn to_message(&self) -> ClientMessage {
        ClientMessage::Setup(Setup {
            model: self.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec![self.response_modality],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.voice.clone(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: self.system_instruction.clone(),
                }],
            },
            input_audio_transcription: self.transcribe_input.then_some(TranscriptionConfig {}),
            output_audio_transcription: self.transcribe_output.then_some(TranscriptionConfig {}),
        })
    }
}

/// Outbound message
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    /// Wrap an audio chunk as realtime input
    #[must_use]
    pub fn audio(chunk: &EncodedChunk) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob {
                mime_type: chunk.media_type().to_string(),
                data: chunk.payload().to_string(),
            }],
        })
    }

    /// Serialize to JSON text
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    model: String,
    generation_config: GenerationConfig,
    system_instruction: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<TranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_transcription: Option<TranscriptionConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<Modality>,
    speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct TranscriptionConfig {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    media_chunks: Vec<Blob>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

/// Raw server message
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    setup_complete: Option<IgnoredAny>,
    #[serde(default)]
    server_content: Option<ServerContent>,
    #[serde(default)]
    go_away: Option<GoAway>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    turn_complete: bool,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    input_transcription: Option<Transcription>,
    #[serde(default)]
    output_transcription: Option<Transcription>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    inline_data: Option<Blob>,
}

#[derive(Debug, Default, Deserialize)]
struct Transcription {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoAway {
    #[serde(default)]
    time_left: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl ServerMessage {
    /// Parse a JSON server message
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a valid server message
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Whether this acknowledges the opening `setup`
    #[must_use]
    pub const fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Flatten into events, in the order the session applies them
    #[must_use]
    pub fn into_events(self) -> Vec<ServerEvent> {
        let mut events = Vec::new();

        if let Some(content) = self.server_content {
            if let Some(text) = content.output_transcription.and_then(|t| t.text)
                && !text.is_empty()
            {
                events.push(ServerEvent::OutputTranscriptDelta(text));
            }
            if let Some(text) = content.input_transcription.and_then(|t| t.text)
                && !text.is_empty()
            {
                events.push(ServerEvent::InputTranscriptDelta(text));
            }
            if content.turn_complete {
                events.push(ServerEvent::TurnComplete);
            }

            let blobs = content
                .model_turn
                .into_iter()
                .flat_map(|turn| turn.parts)
                .filter_map(|part| part.inline_data);
            for blob in blobs {
                match MediaType::parse(&blob.mime_type) {
                    Some(media_type) => {
                        events.push(ServerEvent::ModelAudioChunk(EncodedChunk::new(
                            blob.data, media_type,
                        )));
                    }
                    None => {
                        tracing::debug!(mime_type = %blob.mime_type, "ignoring non-audio inline data");
                    }
                }
            }

            if content.interrupted {
                events.push(ServerEvent::Interrupted);
            }
        }

        if let Some(go_away) = self.go_away {
            events.push(ServerEvent::Error(format!(
                "server going away (time left: {})",
                go_away.time_left.as_deref().unwrap_or("unknown")
            )));
        }

        if let Some(error) = self.error {
            let message = error.message.unwrap_or_else(|| "unknown error".to_string());
            events.push(ServerEvent::Error(match error.code {
                Some(code) => format!("{code}: {message}"),
                None => message,
            }));
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn setup_message_shape() {
        let setup = SessionSetup::new("models/test", "Kore", "Be helpful.");
        let value: serde_json::Value =
            serde_json::from_str(&setup.to_message().to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "setup": {
                    "model": "models/test",
                    "generationConfig": {
                        "responseModalities": ["AUDIO"],
                        "speechConfig": {
                            "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": "Kore" } }
                        }
                    },
                    "systemInstruction": { "parts": [{ "text": "Be helpful." }] },
                    "inputAudioTranscription": {},
                    "outputAudioTranscription": {}
                }
            })
        );
    }

    #[test]
    fn transcription_can_be_disabled() {
        let mut setup = SessionSetup::new("m", "v", "s");
        setup.transcribe_input = false;
        let json = setup.to_message().to_json().unwrap();

        assert!(!json.contains("inputAudioTranscription"));
        assert!(json.contains("outputAudioTranscription"));
    }

    #[test]
    fn audio_input_message_shape() {
        let chunk = EncodedChunk::from_bytes(&[1, 2], MediaType::pcm(16000));
        let value: serde_json::Value =
            serde_json::from_str(&ClientMessage::audio(&chunk).to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "realtimeInput": {
                    "mediaChunks": [{ "mimeType": "audio/pcm;rate=16000", "data": "AQI=" }]
                }
            })
        );
    }

    #[test]
    fn setup_complete_is_recognized() {
        let msg = ServerMessage::parse(r#"{"setupComplete":{}}"#).unwrap();
        assert!(msg.is_setup_complete());
        assert!(msg.into_events().is_empty());
    }

    #[test]
    fn server_content_flattens_in_order() {
        let msg = ServerMessage::parse(
            r#"{
                "serverContent": {
                    "outputTranscription": { "text": "Hello" },
                    "inputTranscription": { "text": "Hi" },
                    "turnComplete": true,
                    "modelTurn": { "parts": [
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAA=" } },
                        { "text": "ignored" }
                    ] },
                    "interrupted": true
                }
            }"#,
        )
        .unwrap();

        assert!(!msg.is_setup_complete());
        assert_eq!(
            msg.into_events(),
            vec![
                ServerEvent::OutputTranscriptDelta("Hello".to_string()),
                ServerEvent::InputTranscriptDelta("Hi".to_string()),
                ServerEvent::TurnComplete,
                ServerEvent::ModelAudioChunk(EncodedChunk::new(
                    "AAA=".to_string(),
                    MediaType::pcm(24000)
                )),
                ServerEvent::Interrupted,
            ]
        );
    }

    #[test]
    fn go_away_and_error_become_error_events() {
        let msg = ServerMessage::parse(
            r#"{"goAway":{"timeLeft":"10s"},"error":{"code":429,"message":"quota"}}"#,
        )
        .unwrap();

        assert_eq!(
            msg.into_events(),
            vec![
                ServerEvent::Error("server going away (time left: 10s)".to_string()),
                ServerEvent::Error("429: quota".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let msg = ServerMessage::parse(r#"{"usageMetadata":{"totalTokenCount":12}}"#).unwrap();
        assert!(msg.into_events().is_empty());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(ServerMessage::parse("not json").is_err());
    }
}

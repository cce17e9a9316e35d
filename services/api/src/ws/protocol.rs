//! Defines the WebSocket message protocol between the client and the server.

use crate::models;
use serde::{Deserialize, Serialize};
use troupe_core::persona::{Persona, PersonaState};
use uuid::Uuid;

/// Messages sent from the client to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Attaches to a session created over the REST API. This must be the
    /// first message on the socket.
    #[serde(rename = "init")]
    Init { session_id: Option<Uuid> },
    /// A text message from the user to the persona.
    #[serde(rename = "user_message")]
    UserMessage { text: String },
    /// Toggles the voice input/output feature.
    #[serde(rename = "set_voice_enabled")]
    SetVoiceEnabled { enabled: bool },
}

/// Messages sent from the server to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms successful session attachment and provides the initial state.
    Initialized {
        session_id: Uuid,
        persona: Persona,
        state: PersonaState,
        history: Vec<models::Message>,
    },
    /// Pushes a complete, updated persona state to the client.
    StateUpdate { state: PersonaState },
    /// Reports a fatal error to the client.
    Error { message: String },
    /// Signals the beginning of a streamed text response from the persona.
    ResponseStart,
    /// A chunk of a streamed text response.
    ResponseChunk { chunk: String },
    /// Signals the end of a streamed text response.
    ResponseEnd,
    /// An update on the user's speech-to-text transcription.
    TranscriptionUpdate { text: String, is_final: bool },
    /// A chunk of audio data (base64 encoded PCM16) for the persona's voice.
    AudioChunk { data: String },
    /// Signals that the persona has started speaking.
    AiSpeakingStart,
    /// Signals that the persona has finished speaking.
    AiSpeakingEnd,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_message_parses_with_and_without_session_id() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "init", "session_id": null}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Init { session_id: None }));

        let id = Uuid::new_v4();
        let msg: ClientMessage =
            serde_json::from_str(&format!(r#"{{"type": "init", "session_id": "{}"}}"#, id))
                .unwrap();
        match msg {
            ClientMessage::Init { session_id } => assert_eq!(session_id, Some(id)),
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn server_messages_are_snake_case_tagged() {
        let json = serde_json::to_value(ServerMessage::AiSpeakingStart).unwrap();
        assert_eq!(json["type"], "ai_speaking_start");

        let json = serde_json::to_value(ServerMessage::ResponseChunk {
            chunk: "hello".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "response_chunk");
        assert_eq!(json["chunk"], "hello");
    }
}

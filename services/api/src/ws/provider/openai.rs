//! Handles the real-time WebSocket connection to OpenAI for voice interaction.

use super::RealtimeClientEvent;
use crate::{
    audio_utils,
    state::AppState,
    ws::{protocol::ServerMessage, session::send_msg},
};
use anyhow::{Context, Result};
use async_openai::types::realtime::{
    self as oai_realtime, ClientEvent as OAIClientEvent, ServerEvent as OAIServerEvent,
};
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{info, warn};

const REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-10-01";

/// Maps a persona voice id onto the provider's voice set, defaulting to
/// Alloy for anything unrecognized.
fn map_voice(voice: &str) -> oai_realtime::RealtimeVoice {
    match voice {
        "ash" => oai_realtime::RealtimeVoice::Ash,
        "ballad" => oai_realtime::RealtimeVoice::Ballad,
        "coral" => oai_realtime::RealtimeVoice::Coral,
        "echo" => oai_realtime::RealtimeVoice::Echo,
        "sage" => oai_realtime::RealtimeVoice::Sage,
        "shimmer" => oai_realtime::RealtimeVoice::Shimmer,
        "verse" => oai_realtime::RealtimeVoice::Verse,
        _ => oai_realtime::RealtimeVoice::Alloy,
    }
}

/// The full session configuration: persona voice, input transcription, and
/// server-side VAD turn detection.
fn full_session_config(voice: &str) -> oai_realtime::SessionResource {
    oai_realtime::SessionResource {
        model: Some(REALTIME_MODEL.to_string()),
        modalities: Some(vec!["text".to_string(), "audio".to_string()]),
        voice: Some(map_voice(voice)),
        input_audio_format: Some(oai_realtime::AudioFormat::PCM16),
        output_audio_format: Some(oai_realtime::AudioFormat::PCM16),
        input_audio_transcription: Some(oai_realtime::AudioTranscription {
            model: Some("whisper-1".to_string()),
            ..Default::default()
        }),
        turn_detection: Some(oai_realtime::TurnDetection::ServerVAD {
            threshold: 0.5,
            prefix_padding_ms: 200,
            silence_duration_ms: 700,
            interrupt_response: Some(true),
            create_response: Some(true),
        }),
        ..Default::default()
    }
}

/// A pared-down configuration used as the one-shot fallback when applying
/// the full one fails: default voice, no transcription, no VAD extras.
fn simplified_session_config() -> oai_realtime::SessionResource {
    oai_realtime::SessionResource {
        model: Some(REALTIME_MODEL.to_string()),
        modalities: Some(vec!["text".to_string(), "audio".to_string()]),
        input_audio_format: Some(oai_realtime::AudioFormat::PCM16),
        output_audio_format: Some(oai_realtime::AudioFormat::PCM16),
        ..Default::default()
    }
}

async fn apply_session_config<S>(
    provider_tx: &mut S,
    session: oai_realtime::SessionResource,
) -> Result<()>
where
    S: futures_util::Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let event = OAIClientEvent::SessionUpdate(oai_realtime::SessionUpdateEvent {
        session,
        event_id: None,
    });
    provider_tx
        .send(WsMessage::Text(serde_json::to_string(&event)?.into()))
        .await?;
    Ok(())
}

/// Runs the main loop for the OpenAI Realtime API connection.
///
/// Connects to the realtime WebSocket, applies the session configuration
/// (falling back once to a simplified configuration before giving up), and
/// then proxies events between our client and the provider.
pub async fn run(
    state: &Arc<AppState>,
    voice: &str,
    mut rx: mpsc::Receiver<RealtimeClientEvent>,
    socket_tx: Arc<Mutex<SplitSink<WebSocket, Message>>>,
) -> Result<()> {
    let url = format!("wss://api.openai.com/v1/realtime?model={}", REALTIME_MODEL);
    let api_key = state
        .config
        .openai_api_key
        .as_ref()
        .context("OpenAI API key not found")?;

    let mut request = url.into_client_request()?;
    request
        .headers_mut()
        .insert("Authorization", format!("Bearer {}", api_key).parse()?);
    request
        .headers_mut()
        .insert("OpenAI-Beta", "realtime=v1".parse()?);

    let (ws_stream, _) = connect_async(request)
        .await
        .context("Failed to connect to OpenAI Realtime WebSocket")?;
    let (mut openai_tx, mut openai_rx) = ws_stream.split();
    info!(voice, "Connected to OpenAI Realtime API.");

    if let Err(e) = apply_session_config(&mut openai_tx, full_session_config(voice)).await {
        warn!(error = ?e, "Full session configuration failed; retrying with simplified configuration");
        apply_session_config(&mut openai_tx, simplified_session_config())
            .await
            .context("Simplified fallback session configuration also failed")?;
    }

    // Main event loop for the OpenAI connection.
    loop {
        tokio::select! {
            biased;
            // Handle events from our application (e.g., audio to send).
            Some(event) = rx.recv() => {
                match event {
                    RealtimeClientEvent::Audio(data) => {
                        let audio_i16: Vec<i16> = data.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect();
                        let encoded_audio = audio_utils::encode_i16(&audio_i16);
                        let append_event = oai_realtime::InputAudioBufferAppendEvent { audio: encoded_audio, event_id: None };
                        openai_tx.send(WsMessage::Text(serde_json::to_string(&OAIClientEvent::InputAudioBufferAppend(append_event))?.into())).await?;
                    }
                    RealtimeClientEvent::TextToSpeak(text) => {
                         let item = oai_realtime::Item {
                             r#type: Some(oai_realtime::ItemType::Message),
                             role: Some(oai_realtime::ItemRole::System),
                             content: Some(vec![oai_realtime::ItemContent {
                                 r#type: oai_realtime::ItemContentType::InputText,
                                 text: Some(text), audio: None, transcript: None,
                             }]),
                             id: None, status: None, call_id: None, name: None, arguments: None, output: None
                         };
                         let create_event = oai_realtime::ConversationItemCreateEvent { item, event_id: None, previous_item_id: None };
                         openai_tx.send(WsMessage::Text(serde_json::to_string(&OAIClientEvent::ConversationItemCreate(create_event))?.into())).await?;

                         let response_event = oai_realtime::ResponseCreateEvent { response: None, event_id: None };
                         openai_tx.send(WsMessage::Text(serde_json::to_string(&OAIClientEvent::ResponseCreate(response_event))?.into())).await?;
                    }
                }
            },
            // Handle events from the OpenAI server (e.g., audio to play).
            Some(msg_result) = openai_rx.next() => {
                if let Ok(WsMessage::Text(text)) = msg_result {
                    if let Ok(server_event) = serde_json::from_str::<OAIServerEvent>(&text) {
                        let mut sink = socket_tx.lock().await;
                        match server_event {
                            OAIServerEvent::ConversationItemInputAudioTranscriptionDelta(e) => send_msg(&mut sink, ServerMessage::TranscriptionUpdate { text: e.delta, is_final: false }).await?,
                            OAIServerEvent::ConversationItemInputAudioTranscriptionCompleted(e) => send_msg(&mut sink, ServerMessage::TranscriptionUpdate { text: e.transcript, is_final: true }).await?,
                            OAIServerEvent::ResponseAudioDelta(e) => send_msg(&mut sink, ServerMessage::AudioChunk { data: e.delta }).await?,
                            OAIServerEvent::InputAudioBufferSpeechStarted(_) => send_msg(&mut sink, ServerMessage::AiSpeakingStart).await?,
                            OAIServerEvent::InputAudioBufferSpeechStopped(_) => send_msg(&mut sink, ServerMessage::AiSpeakingEnd).await?,
                            OAIServerEvent::ResponseDone(_) => send_msg(&mut sink, ServerMessage::AiSpeakingEnd).await?,
                            OAIServerEvent::Error(e) => send_msg(&mut sink, ServerMessage::Error { message: e.error.message }).await?,
                            _ => {}
                        }
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_voices_fall_back_to_alloy() {
        assert!(matches!(
            map_voice("verse"),
            oai_realtime::RealtimeVoice::Verse
        ));
        assert!(matches!(
            map_voice("en-US-matthew"),
            oai_realtime::RealtimeVoice::Alloy
        ));
    }

    #[test]
    fn simplified_config_drops_transcription_and_vad() {
        let full = full_session_config("verse");
        assert!(full.input_audio_transcription.is_some());
        assert!(full.turn_detection.is_some());
        assert!(full.voice.is_some());

        let simple = simplified_session_config();
        assert!(simple.input_audio_transcription.is_none());
        assert!(simple.turn_detection.is_none());
        assert!(simple.voice.is_none());
    }
}

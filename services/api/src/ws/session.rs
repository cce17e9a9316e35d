//! Manages the primary WebSocket connection lifecycle for a persona session.

use super::{
    cycle::handle_turn,
    protocol::{ClientMessage, ServerMessage},
    provider,
};
use crate::{models, state::AppState};
use anyhow::{Context, Result, anyhow};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use rmcp::ServiceExt;
use std::sync::Arc;
use tokio::{
    io::DuplexStream,
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{Instrument, error, info, instrument, warn};
use troupe_core::{
    improv::ImprovService,
    order::BaristaService,
    persona::{PersonaSession, PersonaState},
    tutor::TutorService,
    voice::voice_for_state,
};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Entry point for a new connection: runs the init handshake, confirms the
/// attachment to the client, and spawns the main session loop.
#[instrument(name = "ws_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let temp_id: u32 = rand::random();
    tracing::Span::current().record("session_id", temp_id.to_string());
    info!("New WebSocket connection. Awaiting initialization...");

    let (socket_tx, mut socket_rx) = socket.split();
    let socket_tx = Arc::new(Mutex::new(socket_tx));

    // The first message from the client must be an `init` message.
    let init = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => initialize_session(&text, &state).await,
        Some(Ok(_)) => Err(anyhow!("First message was not a text `init` message.")),
        _ => {
            info!("Client disconnected before sending init message.");
            return;
        }
    };

    let (session_id, persona_session, history) = match init {
        Ok(parts) => parts,
        Err(e) => {
            error!("Session initialization failed: {:?}", e);
            let mut sink = socket_tx.lock().await;
            let _ = send_msg(
                &mut sink,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    let persona = persona_session.persona();
    let snapshot = persona_session.snapshot().await;
    if send_msg(
        &mut *socket_tx.lock().await,
        ServerMessage::Initialized {
            session_id,
            persona,
            state: snapshot,
            history: history.clone(),
        },
    )
    .await
    .is_err()
    {
        error!("Failed to send Initialized message to client.");
        return;
    }

    // Spawn the main session loop in a separate, instrumented task.
    let session_span = tracing::info_span!("agent_runtime", %session_id, %persona);
    tokio::spawn(
        async move {
            if let Err(e) = run_agent_session(
                state,
                socket_tx,
                socket_rx,
                session_id,
                persona_session,
                history,
            )
            .await
            {
                error!(error = ?e, "Agent session terminated with error.");
            }
            info!("Agent session finished.");
        }
        .instrument(session_span),
    );
}

/// Parses the `init` message and attaches to the session it names, loading
/// the saved state snapshot and message history from the store.
async fn initialize_session(
    init_text: &str,
    state: &Arc<AppState>,
) -> Result<(Uuid, PersonaSession, Vec<models::Message>)> {
    let init_msg: ClientMessage = serde_json::from_str(init_text)?;
    let ClientMessage::Init { session_id } = init_msg else {
        return Err(anyhow!("First message must be `init`"));
    };
    let session_id = session_id.context("`session_id` is required for `init`")?;

    tracing::Span::current().record("session_id", session_id.to_string());

    let session = state
        .store
        .get_session(session_id)
        .await
        .context("Session not found; create it over the REST API first")?;
    let persona_session = match state.store.get_state(session_id).await {
        Some(saved) => PersonaSession::from_state(saved),
        None => PersonaSession::new(session.persona, &state.library),
    };
    let history = state.store.session_messages(session_id).await?;
    info!(persona = %session.persona, "Attached to session");
    Ok((session_id, persona_session, history))
}

/// Serves the persona's tool service over an in-process duplex transport.
fn spawn_tool_service(
    state: &Arc<AppState>,
    persona_session: &PersonaSession,
    state_tx: mpsc::Sender<PersonaState>,
    transport: DuplexStream,
) -> JoinHandle<()> {
    match persona_session {
        PersonaSession::Improv(game) => {
            let service = ImprovService::new(game.clone(), Some(state_tx));
            tokio::spawn(async move {
                if let Ok(running) = service.serve(transport).await {
                    let _ = running.waiting().await;
                }
            })
        }
        PersonaSession::Barista(order) => {
            let service = BaristaService::new(order.clone(), Some(state_tx));
            tokio::spawn(async move {
                if let Ok(running) = service.serve(transport).await {
                    let _ = running.waiting().await;
                }
            })
        }
        PersonaSession::Tutor(tutor) => {
            let service = TutorService::new(tutor.clone(), state.library.clone(), Some(state_tx));
            tokio::spawn(async move {
                if let Ok(running) = service.serve(transport).await {
                    let _ = running.waiting().await;
                }
            })
        }
    }
}

/// The main event loop for an active WebSocket session.
///
/// Listens for client messages, state updates from the persona's tools, and
/// routes audio to the realtime voice provider when voice is enabled. The
/// first state update that concludes the session's business (a confirmed
/// order, a finished game) is archived to disk.
async fn run_agent_session(
    state: Arc<AppState>,
    socket_tx: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    mut socket_rx: SplitStream<WebSocket>,
    session_id: Uuid,
    persona_session: PersonaSession,
    mut history: Vec<models::Message>,
) -> Result<()> {
    let persona = persona_session.persona();
    let (state_update_tx, mut state_update_rx) = mpsc::channel(8);
    let (server_transport, client_transport) = tokio::io::duplex(4096);

    let tool_handle = spawn_tool_service(&state, &persona_session, state_update_tx, server_transport);
    let mcp_client = ().serve(client_transport).await?;

    let mut realtime_tx: Option<mpsc::Sender<provider::RealtimeClientEvent>> = None;
    let mut realtime_task_handle: Option<JoinHandle<()>> = None;
    let mut archived = false;

    loop {
        tokio::select! {
            // Handle messages from the client WebSocket.
            Some(msg_result) = socket_rx.next() => {
                match msg_result {
                    Ok(ws_msg) => match ws_msg {
                        Message::Text(text) => {
                            if let Ok(msg) = serde_json::from_str::<ClientMessage>(&text) {
                                match msg {
                                    ClientMessage::UserMessage { text } => {
                                        handle_turn(&state, session_id, &mut history, &persona_session, &mcp_client, &text, &socket_tx, &realtime_tx).await?;
                                    }
                                    ClientMessage::SetVoiceEnabled { enabled } => {
                                        if enabled {
                                            if let Some(handle) = realtime_task_handle.take() { handle.abort(); }
                                            let voice = voice_for_state(&persona_session.snapshot().await).to_string();
                                            let (tx, handle) = provider::start_realtime_provider(state.clone(), persona, voice, socket_tx.clone()).await?;
                                            realtime_tx = Some(tx);
                                            realtime_task_handle = Some(handle);
                                        } else {
                                            if let Some(handle) = realtime_task_handle.take() {
                                                handle.abort();
                                                info!("Aborted realtime provider task.");
                                            }
                                            realtime_tx = None;
                                            info!("Voice disabled by client.");
                                        }
                                    }
                                    _ => warn!("Ignoring unexpected text message post-init."),
                                }
                            }
                        },
                        Message::Binary(data) => {
                            if let Some(tx) = &realtime_tx {
                               if let Err(e) = tx.send(provider::RealtimeClientEvent::Audio(data.into())).await {
                                   error!("Failed to send audio to provider task: {}", e);
                               }
                            } else {
                                warn!("Received audio data from client, but no voice provider is active.");
                            }
                        },
                        Message::Close(_) => {
                            info!("Client sent close frame. Shutting down session.");
                            break;
                        },
                        Message::Ping(_) | Message::Pong(_) => {},
                    },
                    Err(e) => {
                        error!("Error receiving from client WebSocket: {:?}", e);
                        break;
                    }
                }
            },
            // Handle state updates from the persona's tools.
            Some(new_state) = state_update_rx.recv() => {
                state.store.update_state(session_id, &new_state).await?;
                if !archived && new_state.is_final() {
                    match state.store.archive_state(session_id, &new_state).await {
                        Ok(Some(path)) => {
                            archived = true;
                            info!(path = %path.display(), "Session record archived");
                        }
                        Ok(None) => {}
                        // Keep the conversation alive even if the archive write failed.
                        Err(e) => error!(error = ?e, "Failed to archive session record"),
                    }
                }
                send_msg(&mut *socket_tx.lock().await, ServerMessage::StateUpdate { state: new_state }).await?;
            },
            // If all channels close, exit the loop.
            else => break,
        }
    }

    // Clean up background tasks on exit.
    if let Some(handle) = realtime_task_handle.take() {
        handle.abort();
    }
    tool_handle.abort();
    info!("WebSocket connection closed and persona session terminated.");
    Ok(())
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

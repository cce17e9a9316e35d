//! The persona's reason/act cycle: one user utterance in, one spoken (or
//! streamed) response out, with any tool calls the LLM wants in between.

use crate::{
    models::MessageRole,
    state::AppState,
    ws::{protocol::ServerMessage, provider::RealtimeClientEvent, session::send_msg},
};
use anyhow::{Context, Result};
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionToolArgs, FunctionObjectArgs,
};
use axum::extract::ws::{Message, WebSocket};
use futures_util::{StreamExt, stream::SplitSink};
use rmcp::{
    model::{CallToolRequestParam, RawContent},
    service::{RoleClient, RunningService},
};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use troupe_core::{
    llm_client::{LLMAction, LLMStreamEvent},
    persona::PersonaSession,
};
use uuid::Uuid;

/// Handles a single user interaction:
///
/// 1. Snapshot the persona state into the system prompt.
/// 2. Ask the LLM to decide on an action (speak or use a tool).
/// 3. Execute any chosen tools and feed the results back to the LLM.
/// 4. Persist the final response and route it to TTS or stream it as text.
#[allow(clippy::too_many_arguments)]
pub async fn handle_turn(
    state: &Arc<AppState>,
    session_id: Uuid,
    history: &mut Vec<crate::models::Message>,
    persona_session: &PersonaSession,
    mcp_client: &RunningService<RoleClient, ()>,
    user_text: &str,
    socket_tx: &Arc<Mutex<SplitSink<WebSocket, Message>>>,
    realtime_tx: &Option<mpsc::Sender<RealtimeClientEvent>>,
) -> Result<()> {
    // Record the new user message in the store and local history.
    let new_user_msg = state
        .store
        .add_message(session_id, MessageRole::User, user_text)
        .await?;
    history.push(new_user_msg);

    // Compose the system prompt: persona instructions plus the live state.
    let snapshot = persona_session.snapshot().await;
    let state_json = serde_json::to_string_pretty(&snapshot)?;
    let system_prompt = format!(
        "{}\n\n# Current Session State\n```json\n{}\n```",
        persona_session.persona().instructions(),
        state_json
    );

    // Build the full message history for the LLM.
    let mut messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()?
            .into(),
    ];
    for msg in history.iter() {
        match msg.role {
            MessageRole::User => messages.push(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(msg.content.clone())
                    .build()?
                    .into(),
            ),
            MessageRole::Ai => messages.push(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(msg.content.clone())
                    .build()?
                    .into(),
            ),
        };
    }

    // Advertise the persona's tools to the LLM.
    let tools = mcp_client
        .list_all_tools()
        .await?
        .into_iter()
        .map(|t| {
            Ok(ChatCompletionToolArgs::default()
                .function(
                    FunctionObjectArgs::default()
                        .name(t.name)
                        .description(t.description.unwrap_or_default())
                        .parameters(serde_json::to_value(&*t.input_schema)?)
                        .build()?,
                )
                .build()?)
        })
        .collect::<Result<Vec<_>>>()?;

    // Ask the LLM to decide on the next action.
    let action = state.llm_client.decide_action(messages.clone(), tools).await?;

    let mut full_response = String::new();
    match action {
        LLMAction::TextResponse(response_text) => {
            full_response = response_text;
        }
        LLMAction::ToolCall(tool_calls) => {
            // Execute every requested tool against the persona service.
            let mut tool_results = vec![];
            for call in &tool_calls {
                let result = mcp_client
                    .peer()
                    .call_tool(CallToolRequestParam {
                        name: call.function.name.clone().into(),
                        arguments: Some(serde_json::from_str(&call.function.arguments)?),
                    })
                    .await?;

                let annotated_content = result
                    .content
                    .context("Tool call returned no content")?
                    .pop()
                    .context("Content list was empty")?;
                let result_text = match annotated_content.raw {
                    RawContent::Text(text_content) => text_content.text,
                    _ => "{\"error\": \"Unexpected content type from tool\"}".to_string(),
                };
                tool_results.push(result_text);
            }

            // Append the tool calls and their results to the history.
            let mut history_with_tools = messages;
            history_with_tools.push(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .tool_calls(tool_calls.clone())
                    .build()?
                    .into(),
            );
            for (i, result) in tool_results.iter().enumerate() {
                history_with_tools.push(
                    ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(tool_calls[i].id.clone())
                        .content(result.clone())
                        .build()?
                        .into(),
                );
            }

            // Call the LLM again with the tool results for the final wording.
            let mut final_stream = state
                .llm_client
                .stream_after_tools(history_with_tools)
                .await?;
            while let Some(event_result) = final_stream.next().await {
                if let Ok(LLMStreamEvent::TextChunk(chunk)) = event_result {
                    full_response.push_str(&chunk);
                }
            }
        }
    }

    // Save the final response to the history.
    if !full_response.is_empty() {
        let new_ai_msg = state
            .store
            .add_message(session_id, MessageRole::Ai, &full_response)
            .await?;
        history.push(new_ai_msg);
    }

    // Send the response to the client, either via TTS or as text.
    if let Some(tx) = realtime_tx {
        let _ = tx
            .send(RealtimeClientEvent::TextToSpeak(full_response))
            .await;
    } else {
        let mut sink = socket_tx.lock().await;
        send_msg(&mut sink, ServerMessage::ResponseStart).await?;
        send_msg(
            &mut sink,
            ServerMessage::ResponseChunk {
                chunk: full_response,
            },
        )
        .await?;
        send_msg(&mut sink, ServerMessage::ResponseEnd).await?;
    }

    Ok(())
}

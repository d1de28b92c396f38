//! Conversational assistant endpoint.
//!
//! `POST /chat` drives a bounded model/tool loop and relays it to the
//! client as an SSE stream of discrete UI events. At most one tool call is
//! dispatched per model step; tool side effects that committed before a
//! client disconnect stay committed.

use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::chat::client::{ApiMessage, ContentBlock};
use crate::chat::tools;
use crate::models::User;
use crate::policy;
use crate::AppState;

const SYSTEM_PROMPT: &str = "You are a helpful assistant for managing the team's projects. \
    Answer in French when the user writes in French. You can create a project with a title, \
    description, status (IDEA, IN_PROGRESS, REVIEW or DONE) and due date, search and list \
    projects, and give the details of a project.";

/// Request handler for the chat stream. A malformed payload yields
/// HTTP 400 with `{error}`; everything past validation is reported inside
/// the stream so the conversation never crashes.
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return bad_request("Invalid payload: JSON body expected");
    };

    let Some(raw_messages) = payload.get("messages").and_then(|m| m.as_array()) else {
        return bad_request("Invalid payload: messages expected");
    };

    let conversation = convert_messages(raw_messages);
    if conversation.is_empty() {
        return bad_request("Invalid payload: messages must not be empty");
    }

    let Some(client) = state.chat.clone() else {
        warn!("Chat request received but no assistant API key is configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Assistant is not configured"})),
        )
            .into_response();
    };

    // The assistant works without a session, but tools then degrade to
    // "authentication required" results.
    let actor = resolve_actor(&state, &headers);
    let max_steps = state.chat_max_steps.max(1);

    info!(
        authenticated = actor.is_some(),
        messages = conversation.len(),
        "Chat stream started"
    );

    let stream = async_stream::stream! {
        let tool_defs = tools::definitions();
        let mut conversation = conversation;
        let mut completed_steps = 0u32;

        for step in 1..=max_steps {
            completed_steps = step;

            let response = match client.complete(SYSTEM_PROMPT, &conversation, &tool_defs).await {
                Ok(response) => response,
                Err(e) => {
                    error!(error = %e, "Assistant completion failed");
                    yield Ok::<_, Infallible>(
                        Event::default()
                            .event("error")
                            .data(json!({"error": e.to_string()}).to_string()),
                    );
                    break;
                }
            };

            let mut tool_use: Option<(String, String, serde_json::Value)> = None;
            for block in &response.content {
                match block {
                    ContentBlock::Text { text } if !text.is_empty() => {
                        yield Ok(Event::default()
                            .event("text")
                            .data(json!({"text": text}).to_string()));
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        if tool_use.is_none() {
                            tool_use = Some((id.clone(), name.clone(), input.clone()));
                        } else {
                            // One tool call in flight per step; extras are
                            // not dispatched.
                            warn!(tool = %name, "Dropping additional tool call in the same step");
                        }
                    }
                    _ => {}
                }
            }

            let Some((tool_id, tool_name, tool_input)) = tool_use else {
                break;
            };

            if step == max_steps {
                warn!(steps = step, "Chat stream reached the step limit mid-tool-call");
                yield Ok(Event::default()
                    .event("error")
                    .data(json!({"error": "Step limit reached"}).to_string()));
                break;
            }

            yield Ok(Event::default().event("tool_call").data(
                json!({"id": tool_id, "name": tool_name, "input": tool_input}).to_string(),
            ));

            let mut conn = match state.db_pool.get() {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "Database connection error during tool dispatch");
                    yield Ok(Event::default()
                        .event("error")
                        .data(json!({"error": "Tool execution unavailable"}).to_string()));
                    break;
                }
            };

            let result = tools::dispatch(
                &mut conn,
                &state.policy,
                actor.as_ref(),
                &tool_name,
                &tool_input,
            );
            drop(conn);

            // The assistant turn keeps its text and the dispatched tool
            // call; any extra tool calls are stripped so every tool_use
            // has exactly one result.
            let mut assistant_content: Vec<ContentBlock> = Vec::new();
            for block in response.content {
                let keep = match &block {
                    ContentBlock::ToolUse { id, .. } => *id == tool_id,
                    _ => true,
                };
                if keep {
                    assistant_content.push(block);
                }
            }
            conversation.push(ApiMessage::assistant(assistant_content));

            match result {
                Ok(outcome) => {
                    yield Ok(Event::default().event("tool_result").data(
                        json!({
                            "id": tool_id,
                            "name": tool_name,
                            "summary": outcome.summary,
                            "is_error": false,
                        })
                        .to_string(),
                    ));

                    let content =
                        json!({"result": outcome.value, "summary": outcome.summary}).to_string();
                    conversation.push(ApiMessage::tool_result(tool_id, content, false));
                }
                Err(e) => {
                    // Tool failures become error tool-results visible to
                    // the model, not a crashed stream.
                    warn!(tool = %tool_name, error = %e, "Tool execution failed");
                    yield Ok(Event::default().event("tool_result").data(
                        json!({
                            "id": tool_id,
                            "name": tool_name,
                            "summary": e.to_string(),
                            "is_error": true,
                        })
                        .to_string(),
                    ));

                    conversation.push(ApiMessage::tool_result(tool_id, e.to_string(), true));
                }
            }
        }

        yield Ok(Event::default()
            .event("done")
            .data(json!({"steps": completed_steps}).to_string()));
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

/// Accepts both plain-string content and part-lists of text segments, and
/// keeps only user/assistant turns.
fn convert_messages(raw: &[serde_json::Value]) -> Vec<ApiMessage> {
    raw.iter()
        .filter_map(|message| {
            let role = message.get("role")?.as_str()?;
            if role != "user" && role != "assistant" {
                return None;
            }

            let text = match message.get("content") {
                Some(serde_json::Value::String(content)) => content.clone(),
                _ => {
                    let parts = message.get("parts")?.as_array()?;
                    parts
                        .iter()
                        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                        .collect::<Vec<_>>()
                        .join("")
                }
            };

            if text.is_empty() {
                return None;
            }

            Some(ApiMessage {
                role: role.to_string(),
                content: vec![ContentBlock::Text { text }],
            })
        })
        .collect()
}

fn resolve_actor(state: &AppState, headers: &HeaderMap) -> Option<User> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;

    let claims = state.jwt_config.verify_access_token(token).ok()?;
    let mut conn = state.db_pool.get().ok()?;
    policy::resolve_user(&claims, &mut conn).ok()
}

//! Host commands for the popup chat and the classifier status light.

use serde::Serialize;

use crate::classifier::collect_chat_reply;
use crate::TabMind;

/// Health of the classifier endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierStatus {
    pub configured: bool,
    pub reachable: bool,
    pub endpoint: Option<String>,
}

/// Send one chat message and return the final reply text.
pub async fn send_chat_message(state: &TabMind, message: String) -> Result<String, String> {
    let message = message.trim();
    if message.is_empty() {
        return Err("Message is empty".to_string());
    }
    let Some(client) = state.workflow() else {
        return Err("Classifier is not configured".to_string());
    };

    let stream = client
        .chat_stream(message)
        .await
        .map_err(|e| format!("Chat failed: {e}"))?;
    let reply = collect_chat_reply(stream)
        .await
        .map_err(|e| format!("Chat failed: {e}"))?;

    tracing::info!(reply_len = reply.len(), "chat reply received");
    Ok(reply)
}

/// Probe the classifier endpoint. Never fails.
pub async fn check_classifier_health(state: &TabMind) -> ClassifierStatus {
    match state.workflow() {
        Some(client) => ClassifierStatus {
            configured: true,
            reachable: client.health_check().await,
            endpoint: Some(client.config().endpoint.clone()),
        },
        None => ClassifierStatus {
            configured: false,
            reachable: false,
            endpoint: None,
        },
    }
}

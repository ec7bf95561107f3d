//! worker_message tool implementation.
//!
//! Posts a command such as `{"type":"GET_VERSION"}` to the worker.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::worker::{EventReply, MessageReply};
use shellcache_client::{ServiceWorker, WorkerEvent, WorkerMessage};
use shellcache_core::Error;

use super::json_result;
use crate::error::ToolError;

/// Input parameters for worker_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerMessageParams {
    /// Message object, e.g. {"type":"SKIP_WAITING"} or {"type":"GET_VERSION"}.
    pub message: serde_json::Value,
}

/// Output structure for worker_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerMessageOutput {
    /// Reply posted back by the worker.
    pub reply: serde_json::Value,
}

/// Implementation of the worker_message tool.
pub async fn message_impl(worker: &ServiceWorker, params: WorkerMessageParams) -> Result<CallToolResult, McpError> {
    let message: WorkerMessage = serde_json::from_value(params.message)
        .map_err(|e| ToolError::InvalidInput(format!("unrecognized message: {e}")))?;

    let handled = worker.dispatch(WorkerEvent::Message(message)).await?;
    let EventReply::Message(reply) = handled.reply else {
        return Err(Error::WorkerState("message event produced no message reply".into()).into());
    };
    handled.lifetime.settled().await;

    json_result(&WorkerMessageOutput { reply: reply_value(&reply)? })
}

fn reply_value(reply: &MessageReply) -> Result<serde_json::Value, ToolError> {
    Ok(serde_json::to_value(reply)?)
}

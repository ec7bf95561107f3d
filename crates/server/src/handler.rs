//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::cache::{CacheGetParams, CacheListParams, get_impl, list_impl};
use crate::tools::worker_fetch::{WorkerFetchParams, fetch_impl};
use crate::tools::worker_message::{WorkerMessageParams, message_impl};
use crate::tools::worker_status::status_impl;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use shellcache_client::{FetchClient, ServiceWorker};

/// The main MCP server handler for shellcache.
#[derive(Clone)]
pub struct ShellCacheServer {
    tool_router: ToolRouter<Self>,
    worker: Arc<ServiceWorker>,
    /// Host network path for requests the worker passes through.
    fetch: Arc<FetchClient>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl ShellCacheServer {
    /// Create a new server handler around a started worker.
    pub fn new(worker: Arc<ServiceWorker>, fetch: Arc<FetchClient>) -> Self {
        Self { tool_router: Self::tool_router(), worker, fetch }
    }

    /// Deliver a fetch event to the worker.
    ///
    /// Navigations are answered with the app shell; static GETs are served cache-first.
    /// Requests the worker does not intercept are fetched directly.
    #[tool(
        description = "Send a request through the offline worker. Set navigate=true for page loads. Returns status, source (cache, network, offline, passthrough) and the body."
    )]
    async fn worker_fetch(&self, params: Parameters<WorkerFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, self.fetch.as_ref(), params.0).await
    }

    #[tool(description = "Post a message to the worker: {\"type\":\"SKIP_WAITING\"} or {\"type\":\"GET_VERSION\"}.")]
    async fn worker_message(&self, params: Parameters<WorkerMessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.worker, params.0).await
    }

    #[tool(description = "Report worker version, lifecycle phase, scope, app shell and the stores on disk.")]
    async fn worker_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.worker).await
    }

    #[tool(description = "Look up one stored response by URL, without touching the network.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.worker, params.0).await
    }

    #[tool(description = "List the URLs stored in a store (default: the current version's store).")]
    async fn cache_list(&self, params: Parameters<CacheListParams>) -> Result<CallToolResult, McpError> {
        list_impl(&self.worker, params.0).await
    }
}

impl ServerHandler for ShellCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "shellcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(format!(
                "Offline cache worker {} for scope {}.",
                self.worker.context().version,
                self.worker.context().scope
            )),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

//! Stdio tool server: newline-delimited JSON-RPC 2.0.
//!
//! Exposes the search and load stages of [`Brain`] as two tools so editor
//! assistants can query the knowledge base without the local model.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use brain_core::Brain;
use brain_shared::{BrainError, KeywordSet, MatchedFile};

const JSONRPC_VERSION: &str = "2.0";
const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "brain";

// Standard JSON-RPC error codes.
const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    jsonrpc: String,
    /// Absent for notifications.
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

impl RpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsArgs {
    file_paths: Vec<String>,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

pub(crate) struct ToolServer {
    brain: Brain,
}

impl ToolServer {
    pub(crate) fn new(brain: Brain) -> Self {
        Self { brain }
    }

    /// Serve requests until `reader` reaches end of input.
    pub(crate) async fn serve<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(root = %self.brain.root().display(), "tool server ready");

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let Some(response) = self.handle_line(&line).await else {
                continue;
            };
            let mut encoded = serde_json::to_string(&response).map_err(std::io::Error::other)?;
            encoded.push('\n');
            writer.write_all(encoded.as_bytes()).await?;
            writer.flush().await?;
        }

        info!("input closed, tool server stopping");
        Ok(())
    }

    /// Handle one input line. Blank lines and notifications yield no response.
    async fn handle_line(&self, line: &str) -> Option<RpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let request: RpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "unparseable request");
                return Some(RpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("parse error: {e}"),
                ));
            }
        };

        let Some(id) = request.id.clone() else {
            debug!(method = %request.method, "notification received");
            return None;
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(RpcResponse::error(
                id,
                INVALID_REQUEST,
                "jsonrpc must be \"2.0\"",
            ));
        }

        debug!(method = %request.method, "request received");
        Some(self.dispatch(id, &request.method, request.params).await)
    }

    async fn dispatch(&self, id: Value, method: &str, params: Value) -> RpcResponse {
        match method {
            "initialize" => RpcResponse::success(id, initialize_result()),
            "ping" => RpcResponse::success(id, json!({})),
            "tools/list" => RpcResponse::success(id, json!({ "tools": tool_descriptors() })),
            "tools/call" => match serde_json::from_value::<CallParams>(params) {
                Ok(call) => self.call_tool(id, call).await,
                Err(e) => RpcResponse::error(id, INVALID_PARAMS, format!("invalid params: {e}")),
            },
            other => RpcResponse::error(id, METHOD_NOT_FOUND, format!("method not found: {other}")),
        }
    }

    async fn call_tool(&self, id: Value, call: CallParams) -> RpcResponse {
        info!(tool = %call.name, "tool call");
        match call.name.as_str() {
            "search_files" => match serde_json::from_value::<SearchArgs>(call.arguments) {
                Ok(args) => RpcResponse::success(id, self.search_files(args).await),
                Err(e) => RpcResponse::error(id, INVALID_PARAMS, format!("search_files: {e}")),
            },
            "get_contents" => match serde_json::from_value::<ContentsArgs>(call.arguments) {
                Ok(args) => RpcResponse::success(id, self.get_contents(args).await),
                Err(e) => RpcResponse::error(id, INVALID_PARAMS, format!("get_contents: {e}")),
            },
            other => RpcResponse::error(id, INVALID_PARAMS, format!("unknown tool: {other}")),
        }
    }

    // --- Tools ---

    async fn search_files(&self, args: SearchArgs) -> Value {
        let keywords = KeywordSet::from_terms(args.keywords);
        match self.brain.search_files(&keywords).await {
            Ok(outcome) => {
                let warnings: Vec<String> = outcome
                    .failures
                    .iter()
                    .map(|f| format!("search for '{}' failed: {}", f.term, f.reason))
                    .collect();
                tool_text(
                    &json!({
                        "files": MatchedFile::from_ranked(&outcome.files),
                        "warnings": warnings,
                    }),
                    false,
                )
            }
            Err(e) => tool_error(&e),
        }
    }

    async fn get_contents(&self, args: ContentsArgs) -> Value {
        let mut warnings = Vec::new();
        let mut paths = Vec::with_capacity(args.file_paths.len());
        for raw in &args.file_paths {
            match self.resolve_inside_root(raw) {
                Some(path) => paths.push(path),
                None => warnings.push(format!("{raw} is not inside the knowledge base")),
            }
        }

        if paths.is_empty() {
            return tool_text(
                &json!({ "contents": {}, "warnings": warnings }),
                !args.file_paths.is_empty(),
            );
        }

        match self.brain.load_paths(paths.iter().map(PathBuf::as_path)).await {
            Ok(outcome) => {
                warnings.extend(outcome.warnings);
                let contents: BTreeMap<String, String> = outcome
                    .contents
                    .into_iter()
                    .map(|c| (c.path.to_string_lossy().into_owned(), c.content))
                    .collect();
                tool_text(&json!({ "contents": contents, "warnings": warnings }), false)
            }
            Err(e) => tool_error(&e),
        }
    }

    /// Resolve `raw` against the knowledge root; `None` when it escapes it.
    fn resolve_inside_root(&self, raw: &str) -> Option<PathBuf> {
        let root = self.brain.root();
        let candidate = Path::new(raw);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            root.join(candidate)
        };

        // Paths that do not exist are passed through so the loader reports them.
        match (joined.canonicalize(), root.canonicalize()) {
            (Ok(path), Ok(root)) => path.starts_with(&root).then_some(path),
            _ => joined.starts_with(root).then_some(joined),
        }
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

fn tool_descriptors() -> Value {
    json!([
        {
            "name": "search_files",
            "description": "Search the knowledge base for files containing the given keywords. \
                            Returns paths ranked by the number of distinct keywords matched.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "keywords": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Literal terms to search for"
                    }
                },
                "required": ["keywords"]
            }
        },
        {
            "name": "get_contents",
            "description": "Read the contents of knowledge-base files.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_paths": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Absolute paths, or paths relative to the knowledge base root"
                    }
                },
                "required": ["file_paths"]
            }
        }
    ])
}

/// Wrap a JSON payload as a text tool result.
fn tool_text(payload: &Value, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": payload.to_string() }],
        "isError": is_error,
    })
}

fn tool_error(err: &BrainError) -> Value {
    warn!(error = %err, "tool call failed");
    json!({
        "content": [{ "type": "text", "text": err.to_string() }],
        "isError": true,
    })
}

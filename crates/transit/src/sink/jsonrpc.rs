//! JSON-RPC 2.0 envelope used by the sink.
//!
//! Every call is `{"jsonrpc":"2.0","method":"call","params":{...},"id":N}`
//! posted to `{url}/jsonrpc`; the reply carries either `result` or `error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::SinkError;

/// Outgoing call envelope.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: RpcParams<'a>,
    pub id: u32,
}

#[derive(Debug, Serialize)]
pub struct RpcParams<'a> {
    pub service: &'a str,
    pub method: &'a str,
    pub args: &'a [Value],
}

impl<'a> RpcRequest<'a> {
    /// A `call` envelope with a random request id.
    pub fn call(service: &'a str, method: &'a str, args: &'a [Value]) -> Self {
        Self {
            jsonrpc: "2.0",
            method: "call",
            params: RpcParams {
                service,
                method,
                args,
            },
            id: rand::random::<u32>(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorBody {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RpcErrorBody {
    /// The most specific message available; server errors nest it in `data`.
    pub fn detail(&self) -> String {
        self.data
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.message.clone())
    }
}

impl RpcResponse {
    /// The `result` member, or the error envelope as [`SinkError::Rpc`].
    /// A missing result reads as `null`.
    pub fn into_result(self) -> Result<Value, SinkError> {
        if let Some(error) = self.error {
            return Err(SinkError::Rpc {
                code: error.code,
                message: error.detail(),
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

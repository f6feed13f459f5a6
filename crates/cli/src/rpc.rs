//! Minimal JSON-RPC 2.0 client over HTTP

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<ErrorData>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorData {
    pub kind: String,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.data {
            Some(data) => write!(f, "{} ({}): {}", data.kind, self.code, self.message),
            None => write!(f, "RPC error ({}): {}", self.code, self.message),
        }
    }
}

impl std::error::Error for JsonRpcError {}

pub struct RpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let response: JsonRpcResponse = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .context("Failed to connect to daemon")?
            .json()
            .await
            .context("Failed to parse response")?;

        if let Some(error) = response.error {
            return Err(error.into());
        }

        let result = response
            .result
            .ok_or_else(|| anyhow::anyhow!("No result in response"))?;
        serde_json::from_value(result).with_context(|| format!("Unexpected {} result", method))
    }
}

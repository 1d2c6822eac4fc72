//! JSON-RPC 2.0 envelope spoken by bundle relays.
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::client::BundleHash;

#[derive(Serialize, Deserialize, Debug, Clone, Error)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)?;
        if let Some(data) = &self.data {
            write!(f, " data {data}")?;
        }
        Ok(())
    }
}

#[derive(Serialize, Debug)]
pub(crate) struct Request<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

impl<'a, P: Serialize> Request<'a, P> {
    pub(crate) fn new(id: u64, method: &'a str, params: P) -> Self {
        Self { jsonrpc: "2.0", id, method, params }
    }
}

/// A relay answer. `result` is absent or `null` for calls without a return value.
#[derive(Deserialize, Debug)]
pub(crate) struct Response<R> {
    #[serde(default)]
    pub(crate) id: u64,
    result: Option<R>,
    error: Option<JsonRpcError>,
}

impl<R> Response<R> {
    pub(crate) fn into_result(self) -> Result<Option<R>, JsonRpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result),
        }
    }
}

/// Relays disagree on what `eth_sendBundle` returns, so every known shape is accepted.
#[derive(Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum SendBundleResponseType {
    Integer(u64),
    BundleHash(BundleHash),
    String(String),
    SendBundleResponse(SendBundleResponse),
}

impl SendBundleResponseType {
    /// The bundle hash reported by the relay, if the response carried one.
    pub fn bundle_hash(&self) -> Option<BundleHash> {
        match self {
            SendBundleResponseType::BundleHash(hash) => Some(*hash),
            SendBundleResponseType::SendBundleResponse(response) => response.bundle_hash,
            _ => None,
        }
    }
}

#[derive(Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SendBundleResponse {
    #[serde(default)]
    pub(crate) bundle_hash: Option<BundleHash>,
}

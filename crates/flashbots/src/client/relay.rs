use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::client::body::body_signature;
use crate::client::jsonrpc::{JsonRpcError, Request, Response};
use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use reqwest::{Client, Error as ReqwestError};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

/// A Flashbots relay client.
///
/// Every request is signed with the relay authentication key and carries the
/// `X-Flashbots-Signature` header. The authentication key only identifies the
/// searcher towards the relay; it never holds funds.
#[derive(Clone)]
pub struct Relay {
    id: Arc<AtomicU64>,
    client: Client,
    url: Url,
    signer: Option<PrivateKeySigner>,
}

/// Errors for relay requests.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The request failed.
    #[error(transparent)]
    RequestError(#[from] ReqwestError),
    /// The relay answered with a JSON-RPC error.
    #[error(transparent)]
    JsonRpcError(#[from] JsonRpcError),
    /// The relay rejected the request (HTTP 4xx).
    #[error("Client error: {text}")]
    ClientError { text: String },
    /// The relay failed internally (HTTP 5xx).
    #[error("Server error {status}: {text}")]
    ServerError { status: u16, text: String },
    /// The request could not be serialized.
    #[error(transparent)]
    RequestSerdeJson(#[from] serde_json::Error),
    /// The request could not be signed.
    #[error(transparent)]
    SignerError(alloy_signer::Error),
    /// The response could not be deserialized.
    #[error("Deserialization error: {err}. Response: {text}")]
    ResponseSerdeJson { err: serde_json::Error, text: String },
}

impl RelayError {
    /// Transport level failures that may succeed when repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            RelayError::RequestError(err) => err.is_timeout() || err.is_connect(),
            RelayError::ServerError { .. } => true,
            _ => false,
        }
    }
}

impl Relay {
    /// Initializes a new relay client.
    pub fn new(url: impl Into<Url>, signer: Option<PrivateKeySigner>) -> Self {
        Self { id: Arc::new(AtomicU64::new(0)), client: Client::new(), url: url.into(), signer }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Address of the authentication key, if requests are signed.
    pub fn auth_address(&self) -> Option<Address> {
        self.signer.as_ref().map(|signer| signer.address())
    }

    /// Calls `method` on the relay. `Ok(None)` means the relay answered with an empty result.
    pub async fn request<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: P) -> Result<Option<R>, RelayError> {
        let id = self.id.fetch_add(1, Ordering::SeqCst) + 1;
        let body = serde_json::to_string(&Request::new(id, method, params))?;
        trace!("Relay request {} : {}", method, body);

        let signature = self.signer.as_ref().map(|signer| body_signature(&body, signer)).transpose()?;
        self.serialized_request(body, signature).await
    }

    /// Posts an already serialized (and optionally signed) JSON-RPC body.
    pub async fn serialized_request<R: DeserializeOwned>(&self, body: String, signature: Option<String>) -> Result<Option<R>, RelayError> {
        let mut req = self.client.post(self.url.as_ref()).body(body).header("Content-Type", "application/json");

        if let Some(signature) = signature {
            req = req.header("X-Flashbots-Signature", signature);
        }

        let res = req.send().await?;
        let status = res.status();
        let text = res.text().await?;

        if status.is_client_error() {
            // Flashbots rejects invalid bundles with 400 and a JSON-RPC error body
            if let Ok(response) = serde_json::from_str::<Response<Value>>(&text) {
                response.into_result()?;
            }
            return Err(RelayError::ClientError { text });
        }
        if !status.is_success() {
            return Err(RelayError::ServerError { status: status.as_u16(), text });
        }

        debug!("Relay {} response : {}", self.url, text);
        let response: Response<R> = serde_json::from_str(&text).map_err(|err| RelayError::ResponseSerdeJson { err, text })?;
        Ok(response.into_result()?)
    }
}

use crate::client::RelayError;
use alloy_primitives::{hex, keccak256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;

/// Value of the `X-Flashbots-Signature` header for `body`: `<address>:<signature over keccak(body) hex>`.
pub fn body_signature(body: &str, signer: &PrivateKeySigner) -> Result<String, RelayError> {
    let body_hash = keccak256(body.as_bytes()).to_string();
    let signature = signer.sign_message_sync(body_hash.as_bytes()).map_err(RelayError::SignerError)?;
    Ok(format!("{}:0x{}", signer.address(), hex::encode(signature.as_bytes())))
}

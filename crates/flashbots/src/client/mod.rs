//! Client for Flashbots-compatible bundle relays: `eth_callBundle` simulation and
//! `eth_sendBundle` submission with authenticated requests.
pub use body::body_signature;
pub use bundle::{BundleHash, BundleRequest, SimulatedBundle, SimulatedTransaction};
pub use client::{FlashbotsClient, FlashbotsClientError};
pub use jsonrpc::{JsonRpcError, SendBundleResponseType};
pub use relay::{Relay, RelayError};

mod bundle;

#[allow(clippy::module_inception)]
mod client;

mod jsonrpc;
mod relay;

mod body;
mod utils;

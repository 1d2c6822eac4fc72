use alloy_signer_local::PrivateKeySigner;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::client::jsonrpc::SendBundleResponseType;
use crate::client::{BundleHash, BundleRequest, Relay, RelayError, SimulatedBundle};

/// Errors for the Flashbots client.
#[derive(Debug, Error)]
pub enum FlashbotsClientError {
    /// The bundle was rejected before it was sent.
    ///
    /// Simulation needs the target block and the simulation block, submission
    /// needs the target block. Both need at least one transaction.
    #[error("Missing bundle parameter : {0}")]
    MissingParameters(&'static str),
    /// The relay answered without a result where one is required.
    #[error("Empty result for {0}")]
    EmptyResult(&'static str),
    /// The relay responded with an error.
    #[error(transparent)]
    RelayError(#[from] RelayError),
}

#[derive(Clone)]
pub struct FlashbotsClient {
    relay: Relay,
    simulation_relay: Option<Relay>,
    pub name: String,
}

impl FlashbotsClient {
    /// Client signing every request with `auth_signer`, or with a random key when none is given.
    pub fn new(url: Url, auth_signer: Option<PrivateKeySigner>) -> Self {
        let name = url.to_string();
        let signer = auth_signer.unwrap_or_else(PrivateKeySigner::random);
        FlashbotsClient { relay: Relay::new(url, Some(signer)), simulation_relay: None, name }
    }

    pub fn new_no_sign(url: Url) -> Self {
        let name = url.to_string();
        FlashbotsClient { relay: Relay::new(url, None), simulation_relay: None, name }
    }

    /// Use a separate endpoint implementing `eth_callBundle` for simulations.
    ///
    /// The simulation endpoint gets its own random authentication key when the main relay signs requests.
    pub fn with_simulation_relay(self, url: Url) -> Self {
        let signer = self.relay.auth_address().map(|_| PrivateKeySigner::random());
        Self { simulation_relay: Some(Relay::new(url, signer)), ..self }
    }

    /// Get the relay client used for submissions.
    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Simulate a bundle with `eth_callBundle`.
    pub async fn simulate_bundle(&self, bundle: &BundleRequest) -> Result<SimulatedBundle, FlashbotsClientError> {
        if bundle.transactions().is_empty() {
            return Err(FlashbotsClientError::MissingParameters("txs"));
        }
        bundle.target_block().ok_or(FlashbotsClientError::MissingParameters("blockNumber"))?;
        bundle.simulation_block().ok_or(FlashbotsClientError::MissingParameters("stateBlockNumber"))?;

        let relay = self.simulation_relay.as_ref().unwrap_or(&self.relay);
        let simulated: SimulatedBundle =
            relay.request("eth_callBundle", [bundle]).await?.ok_or(FlashbotsClientError::EmptyResult("eth_callBundle"))?;
        debug!("Bundle {} simulated by {} : gas used {}", simulated.hash, self.name, simulated.gas_used);
        Ok(simulated)
    }

    /// Send a bundle with `eth_sendBundle`, returning the bundle hash if the relay reported one.
    pub async fn send_bundle(&self, bundle: &BundleRequest) -> Result<Option<BundleHash>, FlashbotsClientError> {
        if bundle.transactions().is_empty() {
            return Err(FlashbotsClientError::MissingParameters("txs"));
        }
        bundle.target_block().ok_or(FlashbotsClientError::MissingParameters("blockNumber"))?;

        let response: Option<SendBundleResponseType> = self.relay.request("eth_sendBundle", [bundle]).await?;
        info!("Bundle sent to : {}", self.name);
        Ok(response.and_then(|response| response.bundle_hash()))
    }
}

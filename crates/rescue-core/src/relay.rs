use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use flashbots::{BundleHash, FlashbotsClient, FlashbotsClientError};
use tracing::{debug, error, info};

use crate::assembler::SignedBundle;
use crate::chain::ChainSource;
use crate::error::RescueError;

/// Outcome of a successful bundle simulation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimulationReport {
    pub gas_used: U256,
    pub coinbase_diff: U256,
    pub effective_gas_price: U256,
}

/// Handle of a bundle accepted by the relay for one target block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleSubmission {
    pub bundle_id: u64,
    pub bundle_hash: Option<BundleHash>,
    pub target_block: u64,
    pub transactions: Vec<TxHash>,
    /// Lowest nonce each signer used.
    pub signer_nonces: Vec<(Address, u64)>,
}

impl BundleSubmission {
    pub fn new(bundle: &SignedBundle, bundle_hash: Option<BundleHash>) -> Self {
        Self {
            bundle_id: bundle.id,
            bundle_hash,
            target_block: bundle.target_block,
            transactions: bundle.hashes(),
            signer_nonces: bundle.signer_nonces().into_iter().collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BundleResolution {
    Included,
    BlockPassedWithoutInclusion,
    AccountNonceTooHigh { account: Address, bundle_nonce: u64, chain_nonce: u64 },
}

impl fmt::Display for BundleResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleResolution::Included => write!(f, "Included"),
            BundleResolution::BlockPassedWithoutInclusion => write!(f, "BlockPassedWithoutInclusion"),
            BundleResolution::AccountNonceTooHigh { account, .. } => write!(f, "AccountNonceTooHigh({account})"),
        }
    }
}

/// Private bundle relay as seen by the pipeline.
#[async_trait]
pub trait BundleRelay: Send + Sync {
    /// Simulates `bundle` at its target block on top of the state of `state_block`.
    async fn simulate(&self, bundle: &SignedBundle, state_block: u64) -> Result<SimulationReport, RescueError>;

    async fn submit(&self, bundle: &SignedBundle) -> Result<BundleSubmission, RescueError>;

    /// Returns once the target block of `submission` has been mined.
    async fn await_resolution(&self, submission: &BundleSubmission) -> Result<BundleResolution, RescueError>;
}

/// Decides how a submitted bundle resolved, once the chain is at or past its target block.
pub async fn resolve_submission<C: ChainSource + ?Sized>(chain: &C, submission: &BundleSubmission) -> Result<BundleResolution, RescueError> {
    let mut included = !submission.transactions.is_empty();
    for hash in submission.transactions.iter() {
        if !chain.transaction_included(*hash).await? {
            included = false;
            break;
        }
    }
    if included {
        return Ok(BundleResolution::Included);
    }

    for (account, bundle_nonce) in submission.signer_nonces.iter() {
        let chain_nonce = chain.transaction_count(*account).await?;
        if chain_nonce > *bundle_nonce {
            return Ok(BundleResolution::AccountNonceTooHigh { account: *account, bundle_nonce: *bundle_nonce, chain_nonce });
        }
    }

    Ok(BundleResolution::BlockPassedWithoutInclusion)
}

/// [`BundleRelay`] on top of a Flashbots compatible relay. Resolution is read back from the chain.
pub struct FlashbotsRelay<C: ?Sized> {
    client: FlashbotsClient,
    chain: Arc<C>,
    poll_interval: Duration,
}

impl<C: ChainSource + ?Sized> FlashbotsRelay<C> {
    pub fn new(client: FlashbotsClient, chain: Arc<C>, poll_interval: Duration) -> Self {
        Self { client, chain, poll_interval }
    }

    async fn wait_for_block(&self, target_block: u64) -> Result<(), RescueError> {
        loop {
            let block_number = self.chain.block_number().await?;
            if block_number >= target_block {
                return Ok(());
            }
            debug!("Waiting for block {target_block}, chain is at {block_number}");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn relay_failure(target_block: u64, e: FlashbotsClientError, simulating: bool) -> RescueError {
    match e {
        FlashbotsClientError::RelayError(e) if e.is_transient() => RescueError::RelayUnavailable { target_block, reason: e.to_string() },
        e if simulating => RescueError::SimulationFailure { target_block, reason: e.to_string() },
        e => RescueError::SubmissionFailure { target_block, reason: e.to_string() },
    }
}

#[async_trait]
impl<C: ChainSource + ?Sized> BundleRelay for FlashbotsRelay<C> {
    async fn simulate(&self, bundle: &SignedBundle, state_block: u64) -> Result<SimulationReport, RescueError> {
        let request = bundle.to_request(Some(state_block));
        let simulated = self.client.simulate_bundle(&request).await.map_err(|e| relay_failure(bundle.target_block, e, true))?;

        for tx in simulated.transactions.iter() {
            debug!("{tx}");
        }

        if let Some(failed) = simulated.first_failure() {
            error!("Simulation error for bundle {} : {}", bundle.id, failed);
            return Err(RescueError::SimulationFailure {
                target_block: bundle.target_block,
                reason: failed.failure_reason().unwrap_or_default(),
            });
        }

        match serde_json::to_string_pretty(&simulated) {
            Ok(json) => info!("Simulation success for bundle {} : {json}", bundle.id),
            Err(_) => info!("Simulation success for bundle {} : gas used {}", bundle.id, simulated.gas_used),
        }

        Ok(SimulationReport {
            gas_used: simulated.gas_used,
            coinbase_diff: simulated.coinbase_diff,
            effective_gas_price: simulated.effective_gas_price(),
        })
    }

    async fn submit(&self, bundle: &SignedBundle) -> Result<BundleSubmission, RescueError> {
        let request = bundle.to_request(None);
        let bundle_hash = self.client.send_bundle(&request).await.map_err(|e| relay_failure(bundle.target_block, e, false))?;
        Ok(BundleSubmission::new(bundle, bundle_hash))
    }

    async fn await_resolution(&self, submission: &BundleSubmission) -> Result<BundleResolution, RescueError> {
        self.wait_for_block(submission.target_block).await?;
        resolve_submission(self.chain.as_ref(), submission).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use alloy_primitives::{address, B256};
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct StaticChain {
        included: HashSet<TxHash>,
        nonces: HashMap<Address, u64>,
        block_calls: Mutex<u64>,
    }

    #[async_trait]
    impl ChainSource for StaticChain {
        async fn block_number(&self) -> Result<u64, RescueError> {
            let mut calls = self.block_calls.lock().await;
            *calls += 1;
            Ok(100 + *calls)
        }

        async fn transaction_count(&self, address: Address) -> Result<u64, RescueError> {
            Ok(self.nonces.get(&address).copied().unwrap_or_default())
        }

        async fn balance(&self, _address: Address) -> Result<U256, RescueError> {
            Ok(U256::ZERO)
        }

        async fn transaction_included(&self, hash: TxHash) -> Result<bool, RescueError> {
            Ok(self.included.contains(&hash))
        }
    }

    const RECOVERY: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
    const COMPROMISED: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");

    fn submission() -> BundleSubmission {
        BundleSubmission {
            bundle_id: 1,
            bundle_hash: None,
            target_block: 102,
            transactions: vec![B256::with_last_byte(1), B256::with_last_byte(2)],
            signer_nonces: vec![(RECOVERY, 3), (COMPROMISED, 10)],
        }
    }

    #[tokio::test]
    async fn test_included() {
        let chain = StaticChain {
            included: [B256::with_last_byte(1), B256::with_last_byte(2)].into_iter().collect(),
            nonces: [(RECOVERY, 4), (COMPROMISED, 12)].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(resolve_submission(&chain, &submission()).await.unwrap(), BundleResolution::Included);
    }

    #[tokio::test]
    async fn test_not_included() {
        let chain = StaticChain { nonces: [(RECOVERY, 3), (COMPROMISED, 10)].into_iter().collect(), ..Default::default() };
        assert_eq!(resolve_submission(&chain, &submission()).await.unwrap(), BundleResolution::BlockPassedWithoutInclusion);
    }

    #[tokio::test]
    async fn test_nonce_too_high() {
        let chain = StaticChain {
            included: [B256::with_last_byte(1)].into_iter().collect(),
            nonces: [(RECOVERY, 3), (COMPROMISED, 11)].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(
            resolve_submission(&chain, &submission()).await.unwrap(),
            BundleResolution::AccountNonceTooHigh { account: COMPROMISED, bundle_nonce: 10, chain_nonce: 11 }
        );
    }

    #[tokio::test]
    async fn test_waits_for_target_block() {
        let chain = Arc::new(StaticChain::default());
        let client = FlashbotsClient::new_no_sign("http://127.0.0.1:1".parse().unwrap());
        let relay = FlashbotsRelay::new(client, chain.clone(), Duration::from_millis(1));

        assert_eq!(relay.await_resolution(&submission()).await.unwrap(), BundleResolution::BlockPassedWithoutInclusion);
        assert_eq!(*chain.block_calls.lock().await, 2);
    }
}

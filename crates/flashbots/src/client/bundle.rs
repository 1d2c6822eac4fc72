use std::fmt::{Display, Formatter};

use alloy_primitives::{Address, Bytes, TxHash, U256, U64};
use serde::{Deserialize, Serialize};

use crate::client::utils::{deserialize_optional_address, deserialize_u256, deserialize_u64};

/// A bundle hash.
pub type BundleHash = TxHash;

/// A bundle of raw signed transactions for a Flashbots-compatible relay.
///
/// The relay executes the transactions atomically and in order, in the target
/// block only. A request without transactions or without a target block is
/// rejected by [`FlashbotsClient`](crate::FlashbotsClient) before it reaches the relay.
///
/// Simulation through `eth_callBundle` additionally needs the block whose state
/// the simulation starts from ([`BundleRequest::set_simulation_block`]).
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRequest {
    #[serde(rename = "txs")]
    transactions: Vec<Bytes>,

    #[serde(rename = "blockNumber")]
    #[serde(skip_serializing_if = "Option::is_none")]
    target_block: Option<U64>,

    #[serde(rename = "stateBlockNumber")]
    #[serde(skip_serializing_if = "Option::is_none")]
    simulation_block: Option<U64>,
}

impl BundleRequest {
    /// Creates an empty bundle request.
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends an EIP-2718 encoded signed transaction.
    pub fn push_transaction<T: Into<Bytes>>(mut self, tx: T) -> Self {
        self.transactions.push(tx.into());
        self
    }

    pub fn transactions(&self) -> &[Bytes] {
        &self.transactions
    }

    pub fn target_block(&self) -> Option<U64> {
        self.target_block
    }

    /// Set the only block the bundle may be included in.
    pub fn set_target_block(mut self, target_block: U64) -> Self {
        self.target_block = Some(target_block);
        self
    }

    pub fn simulation_block(&self) -> Option<U64> {
        self.simulation_block
    }

    /// Set the block that determines the state for bundle simulation.
    pub fn set_simulation_block(mut self, block: U64) -> Self {
        self.simulation_block = Some(block);
        self
    }
}

/// Details of a transaction simulated as part of a bundle.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatedTransaction {
    #[serde(rename = "txHash")]
    pub hash: TxHash,
    /// Change of the coinbase balance caused by this transaction, gas fees included.
    #[serde(rename = "coinbaseDiff")]
    #[serde(deserialize_with = "deserialize_u256")]
    pub coinbase_diff: U256,
    #[serde(rename = "ethSentToCoinbase")]
    #[serde(deserialize_with = "deserialize_u256")]
    pub coinbase_tip: U256,
    #[serde(rename = "gasPrice")]
    #[serde(deserialize_with = "deserialize_u256")]
    pub gas_price: U256,
    #[serde(rename = "gasUsed")]
    #[serde(deserialize_with = "deserialize_u256")]
    pub gas_used: U256,
    #[serde(rename = "gasFees")]
    #[serde(deserialize_with = "deserialize_u256")]
    pub gas_fees: U256,
    #[serde(rename = "fromAddress")]
    pub from: Address,
    #[serde(rename = "toAddress")]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_optional_address")]
    pub to: Option<Address>,
    /// Return data of the call.
    pub value: Option<Bytes>,
    pub error: Option<String>,
    pub revert: Option<String>,
}

impl SimulatedTransaction {
    pub fn failed(&self) -> bool {
        self.error.is_some() || self.revert.is_some()
    }

    /// Human readable failure reason, revert reason preferred.
    pub fn failure_reason(&self) -> Option<String> {
        match (&self.error, &self.revert) {
            (Some(error), Some(revert)) => Some(format!("{error}: {revert}")),
            (Some(error), None) => Some(error.clone()),
            (None, Some(revert)) => Some(revert.clone()),
            (None, None) => None,
        }
    }
}

impl Display for SimulatedTransaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}->{:#x} {} Gas : {} CB : {}", self.from, self.to.unwrap_or_default(), self.hash, self.gas_used, self.coinbase_diff)?;
        if let Some(reason) = self.failure_reason() {
            write!(f, " FAILED : {reason}")?;
        }
        Ok(())
    }
}

/// Result of `eth_callBundle`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatedBundle {
    #[serde(rename = "bundleHash")]
    pub hash: BundleHash,
    #[serde(rename = "coinbaseDiff")]
    #[serde(deserialize_with = "deserialize_u256")]
    pub coinbase_diff: U256,
    #[serde(rename = "ethSentToCoinbase")]
    #[serde(deserialize_with = "deserialize_u256")]
    pub coinbase_tip: U256,
    #[serde(rename = "bundleGasPrice")]
    #[serde(deserialize_with = "deserialize_u256")]
    pub gas_price: U256,
    #[serde(rename = "totalGasUsed")]
    #[serde(deserialize_with = "deserialize_u256")]
    pub gas_used: U256,
    #[serde(rename = "gasFees")]
    #[serde(deserialize_with = "deserialize_u256")]
    pub gas_fees: U256,
    #[serde(rename = "stateBlockNumber")]
    #[serde(deserialize_with = "deserialize_u64")]
    pub simulation_block: U64,
    #[serde(rename = "results")]
    pub transactions: Vec<SimulatedTransaction>,
}

impl SimulatedBundle {
    /// The effective gas price of the bundle, `coinbase_diff / gas_used`.
    pub fn effective_gas_price(&self) -> U256 {
        self.coinbase_diff.checked_div(self.gas_used).unwrap_or_default()
    }

    /// First transaction that reverted or errored during simulation.
    pub fn first_failure(&self) -> Option<&SimulatedTransaction> {
        self.transactions.iter().find(|tx| tx.failed())
    }
}

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, Bytes, TxHash, U64};
use flashbots::BundleRequest;

use crate::account::{Account, SignedTransaction};
use crate::error::RescueError;
use crate::transaction::RescueTransaction;

/// An ordered set of signed transactions for exactly one target block. Single use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedBundle {
    pub id: u64,
    pub target_block: u64,
    pub transactions: Vec<SignedTransaction>,
}

impl SignedBundle {
    pub fn raw_transactions(&self) -> Vec<Bytes> {
        self.transactions.iter().map(|tx| tx.raw.clone()).collect()
    }

    pub fn hashes(&self) -> Vec<TxHash> {
        self.transactions.iter().map(|tx| tx.hash).collect()
    }

    /// Lowest nonce each signer uses in the bundle.
    pub fn signer_nonces(&self) -> BTreeMap<Address, u64> {
        let mut nonces = BTreeMap::new();
        for tx in self.transactions.iter() {
            nonces.entry(tx.from).and_modify(|nonce: &mut u64| *nonce = (*nonce).min(tx.nonce)).or_insert(tx.nonce);
        }
        nonces
    }

    /// Relay request for this bundle, simulated on top of `state_block`.
    pub fn to_request(&self, state_block: Option<u64>) -> BundleRequest {
        let mut request = BundleRequest::new().set_target_block(U64::from(self.target_block));
        if let Some(state_block) = state_block {
            request = request.set_simulation_block(U64::from(state_block));
        }
        self.transactions.iter().fold(request, |request, tx| request.push_transaction(tx.raw.clone()))
    }
}

/// Validates and signs rescue transactions into bundles.
#[derive(Debug)]
pub struct BundleAssembler {
    chain_id: u64,
    next_id: AtomicU64,
}

impl BundleAssembler {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id, next_id: AtomicU64::new(1) }
    }

    /// Checks per-sender nonce contiguity and chain id, then signs every entry in order.
    pub fn assemble(&self, entries: &[(&Account, RescueTransaction)], target_block: u64) -> Result<SignedBundle, RescueError> {
        self.validate(entries)?;

        let transactions = entries.iter().map(|(account, tx)| account.sign(tx)).collect::<Result<Vec<_>, _>>()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        Ok(SignedBundle { id, target_block, transactions })
    }

    fn validate(&self, entries: &[(&Account, RescueTransaction)]) -> Result<(), RescueError> {
        if entries.is_empty() {
            return Err(RescueError::malformed("bundle has no transactions"));
        }

        let mut expected_nonces: BTreeMap<Address, u64> = BTreeMap::new();
        for (idx, (account, tx)) in entries.iter().enumerate() {
            if tx.chain_id() != self.chain_id {
                return Err(RescueError::malformed(format!("transaction {idx} is for chain {} instead of {}", tx.chain_id(), self.chain_id)));
            }
            if account.address() != tx.from {
                return Err(RescueError::malformed(format!("transaction {idx} from {} is assigned to signer {}", tx.from, account.address())));
            }
            if let Some(expected) = expected_nonces.get(&tx.from) {
                if tx.nonce() != *expected {
                    return Err(RescueError::malformed(format!(
                        "transaction {idx} from {} has nonce {}, expected {expected}",
                        tx.from,
                        tx.nonce()
                    )));
                }
            }
            let next = tx.nonce().checked_add(1).ok_or_else(|| RescueError::malformed(format!("transaction {idx} has the last possible nonce")))?;
            expected_nonces.insert(tx.from, next);
        }
        Ok(())
    }
}

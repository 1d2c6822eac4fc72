use std::sync::Arc;

use alloy_primitives::{Address, U256};

use crate::account::Account;
use crate::asset::{AssetCallEncoder, Erc721TransferEncoder};
use crate::config::{PipelineConfig, SweepAmount};
use crate::error::RescueError;
use crate::fee::FeeBounds;
use crate::transaction::{RescueTransaction, TransactionBuilder, NATIVE_TRANSFER_GAS_LIMIT};

/// Next nonce of one account within a single bundle construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NonceCursor {
    next: u64,
}

impl NonceCursor {
    pub fn new(chain_nonce: u64) -> Self {
        Self { next: chain_nonce }
    }

    pub fn peek(&self) -> u64 {
        self.next
    }

    pub fn advance(&mut self) -> Result<u64, RescueError> {
        let nonce = self.next;
        self.next = nonce.checked_add(1).ok_or_else(|| RescueError::malformed(format!("nonce {nonce} cannot be followed")))?;
        Ok(nonce)
    }
}

/// Chain state a bundle is built from, read fresh for every attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub recovery_nonce: u64,
    pub compromised_nonce: u64,
    /// Only needed when the sweep is sized from the live balance.
    pub compromised_balance: Option<U256>,
}

/// Rescue transaction order: fund the compromised account, move every asset unit, sweep the rest back.
pub struct RescuePlan {
    builder: TransactionBuilder,
    encoder: Arc<dyn AssetCallEncoder>,
    asset_contract: Address,
    asset_units: Vec<U256>,
    funding_amount: U256,
    sweep: SweepAmount,
}

impl RescuePlan {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_encoder(config, Arc::new(Erc721TransferEncoder))
    }

    pub fn with_encoder(config: &PipelineConfig, encoder: Arc<dyn AssetCallEncoder>) -> Self {
        Self {
            builder: TransactionBuilder::new(config.chain_id, config.token_gas_limit),
            encoder,
            asset_contract: config.asset_contract,
            asset_units: config.asset_units.clone(),
            funding_amount: config.funding_amount,
            sweep: config.sweep.clone(),
        }
    }

    pub fn needs_balance(&self) -> bool {
        self.sweep == SweepAmount::Balance
    }

    pub fn build<'a>(
        &self,
        recovery: &'a Account,
        compromised: &'a Account,
        snapshot: &AccountSnapshot,
        fees: &FeeBounds,
    ) -> Result<Vec<(&'a Account, RescueTransaction)>, RescueError> {
        let mut recovery_nonce = NonceCursor::new(snapshot.recovery_nonce);
        let mut compromised_nonce = NonceCursor::new(snapshot.compromised_nonce);
        let mut entries = Vec::with_capacity(self.asset_units.len() + 2);

        let funding =
            self.builder.native_transfer(recovery.address(), compromised.address(), recovery_nonce.advance()?, self.funding_amount, fees);
        entries.push((recovery, funding));

        for unit in self.asset_units.iter() {
            let input = self.encoder.transfer_call(compromised.address(), recovery.address(), *unit);
            let transfer = self.builder.token_transfer(compromised.address(), self.asset_contract, compromised_nonce.advance()?, input, fees);
            entries.push((compromised, transfer));
        }

        let sweep_value = self.sweep_value(compromised.address(), &entries, snapshot.compromised_balance, fees)?;
        let sweep = self.builder.native_transfer(compromised.address(), recovery.address(), compromised_nonce.advance()?, sweep_value, fees);
        entries.push((compromised, sweep));

        Ok(entries)
    }

    fn sweep_value(
        &self,
        compromised: Address,
        entries: &[(&Account, RescueTransaction)],
        compromised_balance: Option<U256>,
        fees: &FeeBounds,
    ) -> Result<U256, RescueError> {
        match &self.sweep {
            SweepAmount::Fixed(amount) => Ok(*amount),
            SweepAmount::Balance => {
                let balance = compromised_balance.ok_or_else(|| RescueError::configuration("balance sweep requires the compromised balance"))?;
                let sweep_gas_cost = U256::from(NATIVE_TRANSFER_GAS_LIMIT) * U256::from(fees.max_fee_per_gas);
                let reserved = entries
                    .iter()
                    .filter(|(_, tx)| tx.from == compromised)
                    .fold(sweep_gas_cost, |acc, (_, tx)| acc.saturating_add(tx.max_gas_cost()));

                let available = balance.saturating_add(self.funding_amount);
                match available.checked_sub(reserved) {
                    Some(value) if !value.is_zero() => Ok(value),
                    _ => Err(RescueError::configuration(format!(
                        "nothing left to sweep : balance {balance} plus funding {} does not cover {reserved} of fees",
                        self.funding_amount
                    ))),
                }
            }
        }
    }
}

use alloy_consensus::TxEip1559;
use alloy_primitives::{Address, Bytes, TxKind, U256};

use crate::fee::FeeBounds;

/// Intrinsic gas of a plain value transfer.
pub const NATIVE_TRANSFER_GAS_LIMIT: u64 = 21_000;
/// Upper bound for one asset transfer call. Not estimated, so it has to cover the costliest transfer.
pub const DEFAULT_TOKEN_TRANSFER_GAS_LIMIT: u64 = 150_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionKind {
    NativeTransfer,
    TokenTransfer,
}

/// An unsigned, fully specified EIP-1559 transaction together with its sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RescueTransaction {
    pub kind: TransactionKind,
    pub from: Address,
    pub tx: TxEip1559,
}

impl RescueTransaction {
    pub fn nonce(&self) -> u64 {
        self.tx.nonce
    }

    pub fn chain_id(&self) -> u64 {
        self.tx.chain_id
    }

    pub fn to(&self) -> Option<Address> {
        self.tx.to.to().copied()
    }

    pub fn value(&self) -> U256 {
        self.tx.value
    }

    /// Most the sender can pay for gas: `gas_limit * max_fee_per_gas`.
    pub fn max_gas_cost(&self) -> U256 {
        U256::from(self.tx.gas_limit) * U256::from(self.tx.max_fee_per_gas)
    }
}

/// Builds transactions with caller supplied nonces and fees; never signs or sends.
#[derive(Clone, Copy, Debug)]
pub struct TransactionBuilder {
    chain_id: u64,
    token_gas_limit: u64,
}

impl TransactionBuilder {
    pub fn new(chain_id: u64, token_gas_limit: u64) -> Self {
        Self { chain_id, token_gas_limit }
    }

    pub fn native_transfer(&self, from: Address, to: Address, nonce: u64, value: U256, fees: &FeeBounds) -> RescueTransaction {
        RescueTransaction {
            kind: TransactionKind::NativeTransfer,
            from,
            tx: self.eip1559(TxKind::Call(to), nonce, NATIVE_TRANSFER_GAS_LIMIT, value, Bytes::new(), fees),
        }
    }

    pub fn token_transfer(&self, from: Address, contract: Address, nonce: u64, input: Bytes, fees: &FeeBounds) -> RescueTransaction {
        RescueTransaction {
            kind: TransactionKind::TokenTransfer,
            from,
            tx: self.eip1559(TxKind::Call(contract), nonce, self.token_gas_limit, U256::ZERO, input, fees),
        }
    }

    fn eip1559(&self, to: TxKind, nonce: u64, gas_limit: u64, value: U256, input: Bytes, fees: &FeeBounds) -> TxEip1559 {
        TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            to,
            value,
            input,
            ..Default::default()
        }
    }
}

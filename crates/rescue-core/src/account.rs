use std::fmt;
use std::str::FromStr;

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_eips::eip2718::{Decodable2718, Encodable2718};
use alloy_network::TxSignerSync;
use alloy_primitives::{Address, Bytes, TxHash};
use alloy_signer_local::PrivateKeySigner;

use crate::error::RescueError;
use crate::transaction::RescueTransaction;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccountRole {
    /// Trusted account paying for the rescue and receiving the assets.
    Recovery,
    /// Account whose key leaked; holds the assets.
    Compromised,
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRole::Recovery => write!(f, "recovery"),
            AccountRole::Compromised => write!(f, "compromised"),
        }
    }
}

/// An address with the ability to sign for it. The key never leaves the account.
#[derive(Clone)]
pub struct Account {
    role: AccountRole,
    address: Address,
    wallet: PrivateKeySigner,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Account").field("role", &self.role).field("address", &self.address.to_string()).finish()
    }
}

impl Account {
    pub fn new(role: AccountRole, wallet: PrivateKeySigner) -> Account {
        Account { role, address: wallet.address(), wallet }
    }

    /// Parses a hex private key, with or without `0x` prefix.
    pub fn from_private_key(role: AccountRole, private_key: &str) -> Result<Account, RescueError> {
        let wallet = PrivateKeySigner::from_str(private_key.trim())
            .map_err(|e| RescueError::configuration(format!("invalid {role} private key : {e}")))?;
        Ok(Account::new(role, wallet))
    }

    pub fn role(&self) -> AccountRole {
        self.role
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sign(&self, transaction: &RescueTransaction) -> Result<SignedTransaction, RescueError> {
        if transaction.from != self.address {
            return Err(RescueError::malformed(format!(
                "{} account {} cannot sign a transaction from {}",
                self.role, self.address, transaction.from
            )));
        }

        let mut tx = transaction.tx.clone();
        let signature =
            self.wallet.sign_transaction_sync(&mut tx).map_err(|e| RescueError::malformed(format!("signing failed : {e}")))?;
        let signed = tx.into_signed(signature);
        let hash = *signed.hash();
        let envelope = TxEnvelope::from(signed);

        Ok(SignedTransaction { hash, from: self.address, nonce: transaction.nonce(), raw: Bytes::from(envelope.encoded_2718()) })
    }
}

/// A signed transaction in its EIP-2718 wire encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hash: TxHash,
    pub from: Address,
    pub nonce: u64,
    pub raw: Bytes,
}

impl SignedTransaction {
    /// Decodes the wire encoding and recovers the signer.
    pub fn decode(&self) -> Result<(Address, TxEip1559), RescueError> {
        let envelope = TxEnvelope::decode_2718(&mut self.raw.as_ref())
            .map_err(|e| RescueError::malformed(format!("cannot decode transaction {} : {e}", self.hash)))?;

        match envelope {
            TxEnvelope::Eip1559(signed) => {
                let signer =
                    signed.recover_signer().map_err(|e| RescueError::malformed(format!("cannot recover signer of {} : {e}", self.hash)))?;
                Ok((signer, signed.tx().clone()))
            }
            _ => Err(RescueError::malformed(format!("transaction {} is not EIP-1559", self.hash))),
        }
    }
}

use std::marker::PhantomData;

use alloy_eips::{BlockId, BlockNumberOrTag};
use alloy_network::{Ethereum, Network};
use alloy_primitives::{Address, TxHash, U256};
use alloy_provider::Provider;
use alloy_rpc_types::Block;
use alloy_transport::Transport;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::RescueError;

/// A newly observed block, as much of it as the rescue needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockNotification {
    pub number: u64,
    pub base_fee_per_gas: u128,
}

impl BlockNotification {
    pub fn new(number: u64, base_fee_per_gas: u128) -> Self {
        Self { number, base_fee_per_gas }
    }
}

/// Read access to chain state.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn block_number(&self) -> Result<u64, RescueError>;

    async fn transaction_count(&self, address: Address) -> Result<u64, RescueError>;

    async fn balance(&self, address: Address) -> Result<U256, RescueError>;

    /// Whether the transaction has a receipt.
    async fn transaction_included(&self, hash: TxHash) -> Result<bool, RescueError>;
}

/// [`ChainSource`] backed by an alloy provider, reading at the latest block.
#[derive(Clone)]
pub struct ProviderChainSource<P, T, N> {
    client: P,
    _t: PhantomData<T>,
    _n: PhantomData<N>,
}

impl<P, T, N> ProviderChainSource<P, T, N>
where
    T: Transport + Clone,
    N: Network,
    P: Provider<T, N> + Send + Sync + Clone + 'static,
{
    pub fn new(client: P) -> Self {
        Self { client, _t: PhantomData, _n: PhantomData }
    }
}

#[async_trait]
impl<P, T, N> ChainSource for ProviderChainSource<P, T, N>
where
    T: Transport + Clone,
    N: Network,
    P: Provider<T, N> + Send + Sync + Clone + 'static,
{
    async fn block_number(&self) -> Result<u64, RescueError> {
        self.client.get_block_number().await.map_err(|e| RescueError::ChainSource(format!("get_block_number : {e}")))
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, RescueError> {
        self.client
            .get_transaction_count(address)
            .block_id(BlockId::Number(BlockNumberOrTag::Latest))
            .await
            .map_err(|e| RescueError::ChainSource(format!("get_transaction_count {address} : {e}")))
    }

    async fn balance(&self, address: Address) -> Result<U256, RescueError> {
        self.client
            .get_balance(address)
            .block_id(BlockId::Number(BlockNumberOrTag::Latest))
            .await
            .map_err(|e| RescueError::ChainSource(format!("get_balance {address} : {e}")))
    }

    async fn transaction_included(&self, hash: TxHash) -> Result<bool, RescueError> {
        let receipt = self
            .client
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| RescueError::ChainSource(format!("get_transaction_receipt {hash} : {e}")))?;
        Ok(receipt.is_some())
    }
}

fn notification_from_block(block: &Block) -> Option<BlockNotification> {
    match block.header.base_fee_per_gas.map(u128::from) {
        Some(base_fee) => Some(BlockNotification::new(block.header.number, base_fee)),
        None => {
            warn!("Block {} has no base fee, skipped", block.header.number);
            None
        }
    }
}

/// Subscribes to new blocks. Blocks without a base fee are dropped.
pub async fn subscribe_block_notifications<P, T>(client: &P) -> Result<BoxStream<'static, BlockNotification>, RescueError>
where
    T: Transport + Clone,
    P: Provider<T, Ethereum> + Send + Sync + Clone + 'static,
{
    let sub = client.subscribe_blocks().await.map_err(|e| RescueError::ChainSource(format!("subscribe_blocks : {e}")))?;
    debug!("Subscribed to new blocks");

    let stream = sub.into_stream().filter_map(|block: Block| futures::future::ready(notification_from_block(&block)));
    Ok(stream.boxed())
}

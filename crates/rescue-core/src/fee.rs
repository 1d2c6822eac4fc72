use crate::config::PipelineConfig;

/// Fee fields shared by every transaction of one bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeBounds {
    /// Worst-case base fee at the target block.
    pub projected_base_fee: u128,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Highest base fee the chain can reach `blocks_in_future` blocks after a block with `base_fee`.
///
/// Every block is assumed to be completely full, the EIP-1559 worst case:
/// `next = base + max(1, base / max_change_denominator)`.
pub fn max_base_fee_in_future_block(base_fee: u128, blocks_in_future: u64, max_change_denominator: u128) -> u128 {
    let denominator = max_change_denominator.max(1);
    (0..blocks_in_future).fold(base_fee, |fee, _| fee.saturating_add((fee / denominator).max(1)))
}

/// Derives fee bounds for the target block from the base fee of the latest block.
#[derive(Clone, Copy, Debug)]
pub struct FeeEstimator {
    priority_fee_per_gas: u128,
    blocks_in_future: u64,
    max_change_denominator: u128,
}

impl FeeEstimator {
    pub fn new(priority_fee_per_gas: u128, blocks_in_future: u64, max_change_denominator: u128) -> Self {
        Self { priority_fee_per_gas, blocks_in_future, max_change_denominator }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.priority_fee_per_gas, config.blocks_in_future, config.base_fee_max_change_denominator)
    }

    pub fn blocks_in_future(&self) -> u64 {
        self.blocks_in_future
    }

    pub fn estimate(&self, base_fee: u128) -> FeeBounds {
        let projected_base_fee = max_base_fee_in_future_block(base_fee, self.blocks_in_future, self.max_change_denominator);
        FeeBounds {
            projected_base_fee,
            max_fee_per_gas: projected_base_fee.saturating_add(self.priority_fee_per_gas),
            max_priority_fee_per_gas: self.priority_fee_per_gas,
        }
    }
}

use alloy_primitives::Address;
use thiserror::Error;

/// Failures of a rescue attempt.
///
/// Only [`RescueError::ChainSource`], [`RescueError::RelayUnavailable`] and, when enabled,
/// [`RescueError::SimulationFailure`] let the pipeline wait for the next block. Everything else stops it.
#[derive(Debug, Error)]
pub enum RescueError {
    /// Missing or invalid signing material, endpoints or rescue parameters.
    #[error("Configuration error : {0}")]
    Configuration(String),
    /// The bundle violates nonce or ordering invariants. Indicates a builder bug.
    #[error("Malformed bundle : {0}")]
    MalformedBundle(String),
    /// The relay predicts the bundle reverts or is invalid at the target block.
    #[error("Simulation failed for block {target_block} : {reason}")]
    SimulationFailure { target_block: u64, reason: String },
    /// The relay rejected the bundle or could not be reached.
    #[error("Submission failed for block {target_block} : {reason}")]
    SubmissionFailure { target_block: u64, reason: String },
    /// A signer nonce advanced past the one used in the bundle; this bundle shape can never land.
    #[error("Nonce too high for {account} : bundle used {bundle_nonce}, chain is at {chain_nonce}")]
    AccountNonceTooHigh { account: Address, bundle_nonce: u64, chain_nonce: u64 },
    /// The relay could not be reached or failed internally; the bundle itself was not judged.
    #[error("Relay unavailable for block {target_block} : {reason}")]
    RelayUnavailable { target_block: u64, reason: String },
    /// Reading chain state failed.
    #[error("Chain source error : {0}")]
    ChainSource(String),
}

impl RescueError {
    pub fn configuration(message: impl Into<String>) -> Self {
        RescueError::Configuration(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        RescueError::MalformedBundle(message.into())
    }

    /// Whether the pipeline may try again on the next block after this error.
    pub fn is_retryable(&self, retry_on_simulation_failure: bool) -> bool {
        match self {
            RescueError::ChainSource(_) | RescueError::RelayUnavailable { .. } => true,
            RescueError::SimulationFailure { .. } => retry_on_simulation_failure,
            _ => false,
        }
    }
}

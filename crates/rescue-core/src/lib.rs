pub use account::{Account, AccountRole, SignedTransaction};
pub use assembler::{BundleAssembler, SignedBundle};
pub use asset::{AssetCallEncoder, Erc721TransferEncoder};
pub use chain::{subscribe_block_notifications, BlockNotification, ChainSource, ProviderChainSource};
pub use config::{Endpoints, NetworkPreset, PipelineConfig, RescueConfig, SweepAmount};
pub use error::RescueError;
pub use fee::{max_base_fee_in_future_block, FeeBounds, FeeEstimator};
pub use pipeline::{PipelineState, RescuePipeline, Termination};
pub use plan::{AccountSnapshot, NonceCursor, RescuePlan};
pub use relay::{resolve_submission, BundleRelay, BundleResolution, BundleSubmission, FlashbotsRelay, SimulationReport};
pub use transaction::{RescueTransaction, TransactionBuilder, TransactionKind};

mod account;
mod assembler;
mod asset;
mod chain;
pub mod config;
mod error;
mod fee;
mod pipeline;
mod plan;
mod relay;
mod transaction;

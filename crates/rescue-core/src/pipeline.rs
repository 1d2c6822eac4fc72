use std::fmt;
use std::sync::Arc;

use futures::{FutureExt, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::account::{Account, AccountRole};
use crate::assembler::BundleAssembler;
use crate::chain::{BlockNotification, ChainSource};
use crate::config::PipelineConfig;
use crate::error::RescueError;
use crate::fee::FeeEstimator;
use crate::plan::{AccountSnapshot, RescuePlan};
use crate::relay::{BundleRelay, BundleResolution};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Building { target_block: u64 },
    Simulating { bundle_id: u64, target_block: u64 },
    Submitting { bundle_id: u64, target_block: u64 },
    AwaitingResolution { bundle_id: u64, target_block: u64 },
    Terminated,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Idle"),
            PipelineState::Building { target_block } => write!(f, "Building({target_block})"),
            PipelineState::Simulating { bundle_id, target_block } => write!(f, "Simulating({bundle_id}@{target_block})"),
            PipelineState::Submitting { bundle_id, target_block } => write!(f, "Submitting({bundle_id}@{target_block})"),
            PipelineState::AwaitingResolution { bundle_id, target_block } => write!(f, "AwaitingResolution({bundle_id}@{target_block})"),
            PipelineState::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Final status of a pipeline run. The caller decides what happens to the process.
#[derive(Debug)]
pub enum Termination {
    /// The bundle landed in `block`.
    Included { block: u64, bundle_id: u64 },
    /// Dry run: the bundle simulated successfully and was not submitted.
    Simulated { target_block: u64, bundle_id: u64 },
    /// Stopped through the cancellation token.
    Stopped,
    Fatal(RescueError),
}

impl Termination {
    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Included { .. } | Termination::Simulated { .. })
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Included { block, bundle_id } => write!(f, "bundle {bundle_id} included in block {block}"),
            Termination::Simulated { target_block, bundle_id } => write!(f, "bundle {bundle_id} simulated for block {target_block}"),
            Termination::Stopped => write!(f, "stopped"),
            Termination::Fatal(e) => write!(f, "fatal : {e}"),
        }
    }
}

enum AttemptOutcome {
    Included { block: u64, bundle_id: u64 },
    Simulated { target_block: u64, bundle_id: u64 },
    NotIncluded,
}

/// Drives rescue attempts from block notifications, one attempt at a time.
pub struct RescuePipeline<C: ?Sized, R: ?Sized> {
    config: PipelineConfig,
    chain: Arc<C>,
    relay: Arc<R>,
    recovery: Account,
    compromised: Account,
    fees: FeeEstimator,
    plan: RescuePlan,
    assembler: BundleAssembler,
    state: PipelineState,
    last_block: Option<u64>,
    dry_run: bool,
    cancel: CancellationToken,
}

impl<C, R> RescuePipeline<C, R>
where
    C: ChainSource + ?Sized,
    R: BundleRelay + ?Sized,
{
    pub fn new(config: PipelineConfig, chain: Arc<C>, relay: Arc<R>, recovery: Account, compromised: Account) -> Result<Self, RescueError> {
        config.validate()?;
        if recovery.role() != AccountRole::Recovery || compromised.role() != AccountRole::Compromised {
            return Err(RescueError::configuration("pipeline needs one recovery and one compromised account"));
        }
        if recovery.address() == compromised.address() {
            return Err(RescueError::configuration("recovery and compromised accounts are the same"));
        }

        Ok(Self {
            fees: FeeEstimator::from_config(&config),
            plan: RescuePlan::new(&config),
            assembler: BundleAssembler::new(config.chain_id),
            config,
            chain,
            relay,
            recovery,
            compromised,
            state: PipelineState::Idle,
            last_block: None,
            dry_run: false,
            cancel: CancellationToken::new(),
        })
    }

    /// Simulate only; the first successful simulation ends the run.
    pub fn with_dry_run(self, dry_run: bool) -> Self {
        Self { dry_run, ..self }
    }

    pub fn with_plan(self, plan: RescuePlan) -> Self {
        Self { plan, ..self }
    }

    /// Cancelling the token stops the pipeline between or during attempts.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn set_state(&mut self, state: PipelineState) {
        debug!("Pipeline {} -> {}", self.state, state);
        self.state = state;
    }

    /// Handles one block. Returns the termination once the pipeline reached a terminal state.
    ///
    /// Blocks at or below the last handled one are ignored, as is everything after termination.
    pub async fn on_block(&mut self, block: BlockNotification) -> Option<Termination> {
        if self.state == PipelineState::Terminated {
            debug!("Pipeline terminated, block {} ignored", block.number);
            return None;
        }
        if self.last_block.is_some_and(|last| block.number <= last) {
            debug!("Stale block {} ignored, last handled {:?}", block.number, self.last_block);
            return None;
        }
        self.last_block = Some(block.number);

        info!("New block {} base fee {}", block.number, block.base_fee_per_gas);

        let termination = match self.attempt(block).await {
            Ok(AttemptOutcome::Included { block, bundle_id }) => Termination::Included { block, bundle_id },
            Ok(AttemptOutcome::Simulated { target_block, bundle_id }) => Termination::Simulated { target_block, bundle_id },
            Ok(AttemptOutcome::NotIncluded) => {
                self.set_state(PipelineState::Idle);
                return None;
            }
            Err(e) if e.is_retryable(self.config.retry_on_simulation_failure) => {
                warn!("Attempt for block {} failed, retrying on next block : {e}", block.number);
                self.set_state(PipelineState::Idle);
                return None;
            }
            Err(e) => {
                error!("{e}");
                Termination::Fatal(e)
            }
        };

        self.set_state(PipelineState::Terminated);
        Some(termination)
    }

    async fn attempt(&mut self, block: BlockNotification) -> Result<AttemptOutcome, RescueError> {
        let target_block = block.number + self.fees.blocks_in_future();
        self.set_state(PipelineState::Building { target_block });

        let compromised_balance =
            if self.plan.needs_balance() { Some(self.chain.balance(self.compromised.address()).await?) } else { None };
        let snapshot = AccountSnapshot {
            recovery_nonce: self.chain.transaction_count(self.recovery.address()).await?,
            compromised_nonce: self.chain.transaction_count(self.compromised.address()).await?,
            compromised_balance,
        };
        let fees = self.fees.estimate(block.base_fee_per_gas);
        debug!(
            "Building for block {target_block} : recovery nonce {} compromised nonce {} max fee {} priority fee {}",
            snapshot.recovery_nonce, snapshot.compromised_nonce, fees.max_fee_per_gas, fees.max_priority_fee_per_gas
        );

        let entries = self.plan.build(&self.recovery, &self.compromised, &snapshot, &fees)?;
        let bundle = self.assembler.assemble(&entries, target_block)?;
        let bundle_id = bundle.id;

        self.set_state(PipelineState::Simulating { bundle_id, target_block });
        let report = self.relay.simulate(&bundle, block.number).await?;
        debug!(
            "Bundle {bundle_id} simulated : gas used {} coinbase diff {} effective gas price {}",
            report.gas_used, report.coinbase_diff, report.effective_gas_price
        );

        if self.dry_run {
            info!("Dry run, bundle {bundle_id} not submitted");
            return Ok(AttemptOutcome::Simulated { target_block, bundle_id });
        }

        self.set_state(PipelineState::Submitting { bundle_id, target_block });
        let submission = self.relay.submit(&bundle).await?;
        info!("Bundle {bundle_id} submitted for block {target_block}, waiting");

        self.set_state(PipelineState::AwaitingResolution { bundle_id, target_block });
        match self.relay.await_resolution(&submission).await? {
            BundleResolution::Included => {
                info!("Bundle {bundle_id} included in block {target_block}");
                Ok(AttemptOutcome::Included { block: target_block, bundle_id })
            }
            BundleResolution::BlockPassedWithoutInclusion => {
                info!("Bundle {bundle_id} not included in block {target_block}");
                Ok(AttemptOutcome::NotIncluded)
            }
            BundleResolution::AccountNonceTooHigh { account, bundle_nonce, chain_nonce } => {
                error!("Nonce too high for {account}, bailing");
                Err(RescueError::AccountNonceTooHigh { account, bundle_nonce, chain_nonce })
            }
        }
    }

    /// Consumes block notifications until a terminal state, the end of the stream or cancellation.
    ///
    /// Notifications that queue up while an attempt is in flight collapse into the latest one.
    pub async fn run<S>(&mut self, mut blocks: S) -> Termination
    where
        S: Stream<Item = BlockNotification> + Unpin,
    {
        let cancel = self.cancel.clone();
        info!("Rescue pipeline started : recovery {} compromised {}", self.recovery.address(), self.compromised.address());

        loop {
            let block = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                block = blocks.next() => match block {
                    Some(block) => Some(block),
                    None => {
                        self.set_state(PipelineState::Terminated);
                        return Termination::Fatal(RescueError::ChainSource("block stream closed".to_string()));
                    }
                },
            };

            let Some(mut block) = block else {
                info!("Rescue pipeline stopped");
                self.set_state(PipelineState::Terminated);
                return Termination::Stopped;
            };

            while let Some(Some(next)) = blocks.next().now_or_never() {
                debug!("Skipping queued block {}", block.number);
                block = next;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Rescue pipeline stopped during attempt");
                    self.set_state(PipelineState::Terminated);
                    return Termination::Stopped;
                }
                termination = self.on_block(block) => {
                    if let Some(termination) = termination {
                        return termination;
                    }
                }
            }
        }
    }
}

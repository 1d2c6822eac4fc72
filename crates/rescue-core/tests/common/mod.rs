#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use alloy_primitives::{address, Address, TxHash, U256};
use async_trait::async_trait;
use tokio::sync::Mutex;

use rescue_core::{
    Account, AccountRole, BlockNotification, BundleRelay, BundleResolution, BundleSubmission, ChainSource, PipelineConfig, RescueError,
    RescuePipeline, SignedBundle, SimulationReport,
};

pub const RECOVERY_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const COMPROMISED_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const ASSET_CONTRACT: Address = address!("2dd35b4da6534230ff53048f7477f17f7f4e7a70");

pub fn recovery() -> Account {
    Account::from_private_key(AccountRole::Recovery, RECOVERY_KEY).unwrap()
}

pub fn compromised() -> Account {
    Account::from_private_key(AccountRole::Compromised, COMPROMISED_KEY).unwrap()
}

pub fn config() -> PipelineConfig {
    PipelineConfig::new(1, ASSET_CONTRACT, vec![U256::from(5019), U256::from(5419)])
}

pub fn block(number: u64) -> BlockNotification {
    BlockNotification::new(number, 30_000_000_000)
}

#[derive(Default)]
pub struct ChainState {
    pub block_number: u64,
    pub nonces: HashMap<Address, u64>,
    pub balances: HashMap<Address, U256>,
    pub included: HashSet<TxHash>,
    pub fail_reads: bool,
}

/// In-memory chain state.
#[derive(Default)]
pub struct MockChain {
    pub state: Mutex<ChainState>,
}

impl MockChain {
    pub fn with_nonces(nonces: &[(Address, u64)]) -> Arc<Self> {
        let chain = MockChain::default();
        chain.state.try_lock().unwrap().nonces = nonces.iter().copied().collect();
        Arc::new(chain)
    }

    pub async fn set_nonce(&self, address: Address, nonce: u64) {
        self.state.lock().await.nonces.insert(address, nonce);
    }

    pub async fn set_fail_reads(&self, fail: bool) {
        self.state.lock().await.fail_reads = fail;
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn block_number(&self) -> Result<u64, RescueError> {
        Ok(self.state.lock().await.block_number)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, RescueError> {
        let state = self.state.lock().await;
        if state.fail_reads {
            return Err(RescueError::ChainSource("connection reset".to_string()));
        }
        Ok(state.nonces.get(&address).copied().unwrap_or_default())
    }

    async fn balance(&self, address: Address) -> Result<U256, RescueError> {
        Ok(self.state.lock().await.balances.get(&address).copied().unwrap_or_default())
    }

    async fn transaction_included(&self, hash: TxHash) -> Result<bool, RescueError> {
        Ok(self.state.lock().await.included.contains(&hash))
    }
}

pub enum SimulationScript {
    Success,
    Failure(String),
}

#[derive(Default)]
pub struct RelayLog {
    pub simulated: Vec<(SignedBundle, u64)>,
    pub submitted: Vec<SignedBundle>,
}

/// Relay answering from scripted queues. Empty queues mean success and `BlockPassedWithoutInclusion`.
#[derive(Default)]
pub struct ScriptedRelay {
    pub simulations: Mutex<VecDeque<SimulationScript>>,
    pub resolutions: Mutex<VecDeque<BundleResolution>>,
    pub log: Mutex<RelayLog>,
}

impl ScriptedRelay {
    pub fn with_resolutions(resolutions: Vec<BundleResolution>) -> Arc<Self> {
        let relay = ScriptedRelay::default();
        *relay.resolutions.try_lock().unwrap() = resolutions.into_iter().collect();
        Arc::new(relay)
    }

    pub async fn push_simulation(&self, script: SimulationScript) {
        self.simulations.lock().await.push_back(script);
    }

    pub async fn submitted(&self) -> Vec<SignedBundle> {
        self.log.lock().await.submitted.clone()
    }

    pub async fn simulated(&self) -> Vec<(SignedBundle, u64)> {
        self.log.lock().await.simulated.clone()
    }
}

#[async_trait]
impl BundleRelay for ScriptedRelay {
    async fn simulate(&self, bundle: &SignedBundle, state_block: u64) -> Result<SimulationReport, RescueError> {
        self.log.lock().await.simulated.push((bundle.clone(), state_block));
        match self.simulations.lock().await.pop_front() {
            Some(SimulationScript::Failure(reason)) => Err(RescueError::SimulationFailure { target_block: bundle.target_block, reason }),
            Some(SimulationScript::Success) | None => Ok(SimulationReport::default()),
        }
    }

    async fn submit(&self, bundle: &SignedBundle) -> Result<BundleSubmission, RescueError> {
        self.log.lock().await.submitted.push(bundle.clone());
        Ok(BundleSubmission::new(bundle, None))
    }

    async fn await_resolution(&self, _submission: &BundleSubmission) -> Result<BundleResolution, RescueError> {
        Ok(self.resolutions.lock().await.pop_front().unwrap_or(BundleResolution::BlockPassedWithoutInclusion))
    }
}

pub fn pipeline(chain: Arc<MockChain>, relay: Arc<ScriptedRelay>, config: PipelineConfig) -> RescuePipeline<MockChain, ScriptedRelay> {
    let _ = env_logger::try_init_from_env(env_logger::Env::default().default_filter_or("debug"));
    RescuePipeline::new(config, chain, relay, recovery(), compromised()).unwrap()
}

/// Nonces of a bundle in order, as signed.
pub fn nonces(bundle: &SignedBundle) -> Vec<u64> {
    bundle.transactions.iter().map(|tx| tx.decode().unwrap().1.nonce).collect()
}

use std::fs;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::utils::parse_ether;
use alloy_primitives::{Address, U256};
use eyre::Result;
use serde::Deserialize;
use url::Url;

use crate::error::RescueError;
use crate::transaction::DEFAULT_TOKEN_TRANSFER_GAS_LIMIT;

pub const GWEI: u128 = 1_000_000_000;
pub const DEFAULT_PRIORITY_FEE_GWEI: u64 = 20;
pub const DEFAULT_BLOCKS_IN_FUTURE: u64 = 2;
/// EIP-1559 `BASE_FEE_MAX_CHANGE_DENOMINATOR`: the base fee moves at most 1/8 per block.
pub const DEFAULT_BASE_FEE_MAX_CHANGE_DENOMINATOR: u128 = 8;
pub const DEFAULT_FUNDING_AMOUNT: &str = "0.02";
pub const DEFAULT_SWEEP_AMOUNT: &str = "0.004";
pub const DEFAULT_RESOLUTION_POLL_MS: u64 = 1000;

/// Known relay deployments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkPreset {
    Mainnet,
    Goerli,
}

impl NetworkPreset {
    pub fn chain_id(&self) -> u64 {
        match self {
            NetworkPreset::Mainnet => 1,
            NetworkPreset::Goerli => 5,
        }
    }

    pub fn relay_url(&self) -> &'static str {
        match self {
            NetworkPreset::Mainnet => "https://relay.flashbots.net/",
            NetworkPreset::Goerli => "https://relay-goerli.flashbots.net/",
        }
    }
}

impl FromStr for NetworkPreset {
    type Err = RescueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(NetworkPreset::Mainnet),
            "goerli" => Ok(NetworkPreset::Goerli),
            other => Err(RescueError::configuration(format!("unknown network {other}"))),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChainConfig {
    pub chain_id: Option<u64>,
    pub relay_url: Option<String>,
    /// Separate `eth_callBundle` endpoint, the relay itself when unset.
    pub simulation_url: Option<String>,
    /// Websocket endpoint of the node providing blocks and account state.
    pub node_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FeesConfig {
    #[serde(default = "default_priority_fee_gwei")]
    pub priority_fee_gwei: u64,
    #[serde(default = "default_blocks_in_future")]
    pub blocks_in_future: u64,
    #[serde(default = "default_base_fee_max_change_denominator")]
    pub base_fee_max_change_denominator: u128,
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            priority_fee_gwei: DEFAULT_PRIORITY_FEE_GWEI,
            blocks_in_future: DEFAULT_BLOCKS_IN_FUTURE,
            base_fee_max_change_denominator: DEFAULT_BASE_FEE_MAX_CHANGE_DENOMINATOR,
        }
    }
}

fn default_priority_fee_gwei() -> u64 {
    DEFAULT_PRIORITY_FEE_GWEI
}

fn default_blocks_in_future() -> u64 {
    DEFAULT_BLOCKS_IN_FUTURE
}

fn default_base_fee_max_change_denominator() -> u128 {
    DEFAULT_BASE_FEE_MAX_CHANGE_DENOMINATOR
}

/// Asset unit identifier as written in the config file, either an integer or a decimal/hex string.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum AssetUnitConfig {
    Number(u64),
    Text(String),
}

impl AssetUnitConfig {
    fn to_u256(&self) -> Result<U256, RescueError> {
        match self {
            AssetUnitConfig::Number(n) => Ok(U256::from(*n)),
            AssetUnitConfig::Text(s) => {
                let parsed = match s.strip_prefix("0x") {
                    Some(hex) => U256::from_str_radix(hex, 16),
                    None => U256::from_str_radix(s, 10),
                };
                parsed.map_err(|e| RescueError::configuration(format!("invalid asset unit {s} : {e}")))
            }
        }
    }
}

/// How much native currency the compromised account returns at the end of the bundle.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SweepConfig {
    /// Fixed amount in ether.
    Fixed(String),
    /// Everything left after the bundle's own fees.
    Balance,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig::Fixed(DEFAULT_SWEEP_AMOUNT.to_string())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RescuePlanConfig {
    pub asset_contract: Address,
    #[serde(default)]
    pub asset_units: Vec<AssetUnitConfig>,
    #[serde(default = "default_funding_amount")]
    pub funding_amount: String,
    #[serde(default)]
    pub sweep: SweepConfig,
    pub token_gas_limit: Option<u64>,
    #[serde(default)]
    pub retry_on_simulation_failure: bool,
    pub resolution_poll_ms: Option<u64>,
}

fn default_funding_amount() -> String {
    DEFAULT_FUNDING_AMOUNT.to_string()
}

/// The rescue config file.
#[derive(Clone, Debug, Deserialize)]
pub struct RescueConfig {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub fees: FeesConfig,
    pub rescue: RescuePlanConfig,
}

impl RescueConfig {
    pub fn load_from_file(file_name: String) -> Result<RescueConfig> {
        let contents = fs::read_to_string(file_name)?;
        let config: RescueConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Fills chain id and relay endpoint from `preset` where the file leaves them out.
    pub fn with_preset(mut self, preset: NetworkPreset) -> Self {
        self.chain.chain_id = self.chain.chain_id.or(Some(preset.chain_id()));
        self.chain.relay_url = self.chain.relay_url.or_else(|| Some(preset.relay_url().to_string()));
        self
    }

    pub fn with_priority_fee_gwei(mut self, priority_fee_gwei: u64) -> Self {
        self.fees.priority_fee_gwei = priority_fee_gwei;
        self
    }

    pub fn endpoints(&self) -> Result<Endpoints, RescueError> {
        let relay_url = self.chain.relay_url.as_deref().ok_or_else(|| RescueError::configuration("relay_url is not set"))?;
        let node_url = self.chain.node_url.clone().ok_or_else(|| RescueError::configuration("node_url is not set"))?;
        let simulation_url = self.chain.simulation_url.as_deref().map(parse_url).transpose()?;

        Ok(Endpoints { relay_url: parse_url(relay_url)?, simulation_url, node_url })
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig, RescueError> {
        let chain_id = self.chain.chain_id.ok_or_else(|| RescueError::configuration("chain_id is not set"))?;
        let asset_units = self.rescue.asset_units.iter().map(AssetUnitConfig::to_u256).collect::<Result<Vec<_>, _>>()?;

        let sweep = match &self.rescue.sweep {
            SweepConfig::Fixed(amount) => SweepAmount::Fixed(parse_ether_amount("sweep", amount)?),
            SweepConfig::Balance => SweepAmount::Balance,
        };

        let config = PipelineConfig {
            chain_id,
            priority_fee_per_gas: u128::from(self.fees.priority_fee_gwei) * GWEI,
            blocks_in_future: self.fees.blocks_in_future,
            base_fee_max_change_denominator: self.fees.base_fee_max_change_denominator,
            asset_contract: self.rescue.asset_contract,
            asset_units,
            funding_amount: parse_ether_amount("funding_amount", &self.rescue.funding_amount)?,
            sweep,
            token_gas_limit: self.rescue.token_gas_limit.unwrap_or(DEFAULT_TOKEN_TRANSFER_GAS_LIMIT),
            retry_on_simulation_failure: self.rescue.retry_on_simulation_failure,
            resolution_poll_interval: Duration::from_millis(self.rescue.resolution_poll_ms.unwrap_or(DEFAULT_RESOLUTION_POLL_MS)),
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_url(url: &str) -> Result<Url, RescueError> {
    Url::parse(url).map_err(|e| RescueError::configuration(format!("invalid url {url} : {e}")))
}

fn parse_ether_amount(field: &str, amount: &str) -> Result<U256, RescueError> {
    parse_ether(amount).map_err(|e| RescueError::configuration(format!("invalid {field} {amount} : {e}")))
}

#[derive(Clone, Debug)]
pub struct Endpoints {
    pub relay_url: Url,
    pub simulation_url: Option<Url>,
    pub node_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SweepAmount {
    Fixed(U256),
    Balance,
}

/// Everything a rescue pipeline needs to know, resolved and validated.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub chain_id: u64,
    pub priority_fee_per_gas: u128,
    pub blocks_in_future: u64,
    pub base_fee_max_change_denominator: u128,
    pub asset_contract: Address,
    pub asset_units: Vec<U256>,
    pub funding_amount: U256,
    pub sweep: SweepAmount,
    pub token_gas_limit: u64,
    pub retry_on_simulation_failure: bool,
    pub resolution_poll_interval: Duration,
}

impl PipelineConfig {
    /// Config with the default fee policy, funding and sweep amounts.
    pub fn new(chain_id: u64, asset_contract: Address, asset_units: Vec<U256>) -> Self {
        Self {
            chain_id,
            priority_fee_per_gas: u128::from(DEFAULT_PRIORITY_FEE_GWEI) * GWEI,
            blocks_in_future: DEFAULT_BLOCKS_IN_FUTURE,
            base_fee_max_change_denominator: DEFAULT_BASE_FEE_MAX_CHANGE_DENOMINATOR,
            asset_contract,
            asset_units,
            funding_amount: U256::from(20_000_000_000_000_000u64),
            sweep: SweepAmount::Fixed(U256::from(4_000_000_000_000_000u64)),
            token_gas_limit: DEFAULT_TOKEN_TRANSFER_GAS_LIMIT,
            retry_on_simulation_failure: false,
            resolution_poll_interval: Duration::from_millis(DEFAULT_RESOLUTION_POLL_MS),
        }
    }

    pub fn validate(&self) -> Result<(), RescueError> {
        if self.blocks_in_future < 1 {
            return Err(RescueError::configuration("blocks_in_future must be at least 1"));
        }
        if self.base_fee_max_change_denominator < 1 {
            return Err(RescueError::configuration("base_fee_max_change_denominator must be at least 1"));
        }
        if self.token_gas_limit < crate::transaction::NATIVE_TRANSFER_GAS_LIMIT {
            return Err(RescueError::configuration("token_gas_limit is below the intrinsic transaction gas"));
        }
        if self.resolution_poll_interval.is_zero() {
            return Err(RescueError::configuration("resolution_poll_ms must be positive"));
        }
        Ok(())
    }
}

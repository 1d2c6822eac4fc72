use std::env;
use std::str::FromStr;
use std::sync::Arc;

use alloy_network::Ethereum;
use alloy_provider::{Provider, ProviderBuilder};
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::BoxTransport;
use clap::Parser;
use eyre::Result;
use tracing::{error, info};

use flashbots::FlashbotsClient;
use rescue_core::{
    subscribe_block_notifications, Account, AccountRole, FlashbotsRelay, NetworkPreset, ProviderChainSource, RescueConfig, RescueError,
    RescuePipeline, Termination,
};

use crate::arguments::AppArgs;

mod arguments;

const RECOVERY_KEY_ENV: &str = "USER_KEY";
const COMPROMISED_KEY_ENV: &str = "HACKED_KEY";
const AUTH_KEY_ENV: &str = "FLASHBOTS_AUTH_KEY";
const PRIORITY_FEE_ENV: &str = "PRIORITY_GWEI";

fn account_from_env(role: AccountRole, var: &str) -> Result<Account, RescueError> {
    let key = env::var(var).map_err(|_| RescueError::configuration(format!("{var} is not set")))?;
    Account::from_private_key(role, &key)
}

fn auth_signer_from_env() -> Result<Option<PrivateKeySigner>, RescueError> {
    match env::var(AUTH_KEY_ENV) {
        Ok(key) => PrivateKeySigner::from_str(key.trim())
            .map(Some)
            .map_err(|e| RescueError::configuration(format!("invalid {AUTH_KEY_ENV} : {e}"))),
        Err(_) => Ok(None),
    }
}

fn load_config(args: &AppArgs) -> Result<RescueConfig> {
    let mut config = RescueConfig::load_from_file(args.config.clone())?;

    if let Some(network) = args.network.as_deref() {
        config = config.with_preset(NetworkPreset::from_str(network)?);
    }

    if let Ok(priority_fee) = env::var(PRIORITY_FEE_ENV) {
        let priority_fee = priority_fee
            .trim()
            .parse::<u64>()
            .map_err(|e| RescueError::configuration(format!("invalid {PRIORITY_FEE_ENV} {priority_fee} : {e}")))?;
        config = config.with_priority_fee_gwei(priority_fee);
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info,alloy_rpc_client=off,tokio_tungstenite=off,tungstenite=off"),
    )
    .format_timestamp_micros()
    .init();

    let args = AppArgs::parse();
    let config = load_config(&args)?;
    let endpoints = config.endpoints()?;
    let pipeline_config = config.pipeline_config()?;

    let recovery = account_from_env(AccountRole::Recovery, RECOVERY_KEY_ENV)?;
    let compromised = account_from_env(AccountRole::Compromised, COMPROMISED_KEY_ENV)?;
    info!("Recovery account : {} compromised account : {}", recovery.address(), compromised.address());

    let client = ProviderBuilder::new().on_builtin(endpoints.node_url.as_str()).await?;
    let block_nr = client.get_block_number().await?;
    info!("Connected to node, block : {}", block_nr);

    let mut flashbots_client = FlashbotsClient::new(endpoints.relay_url.clone(), auth_signer_from_env()?);
    if let Some(simulation_url) = endpoints.simulation_url.clone() {
        flashbots_client = flashbots_client.with_simulation_relay(simulation_url);
    }
    info!("Relay : {} auth address : {:?}", flashbots_client.relay().url(), flashbots_client.relay().auth_address());

    let chain = Arc::new(ProviderChainSource::<_, BoxTransport, Ethereum>::new(client.clone()));
    let relay = Arc::new(FlashbotsRelay::new(flashbots_client, chain.clone(), pipeline_config.resolution_poll_interval));

    let mut pipeline = RescuePipeline::new(pipeline_config, chain, relay, recovery, compromised)?.with_dry_run(args.dry_run);

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping");
            cancel.cancel();
        }
    });

    let blocks = subscribe_block_notifications::<_, BoxTransport>(&client).await?;
    let termination = pipeline.run(blocks).await;

    match termination {
        Termination::Fatal(e) => {
            error!("Rescue failed : {e}");
            Err(e.into())
        }
        termination => {
            info!("Rescue finished : {termination}");
            Ok(())
        }
    }
}

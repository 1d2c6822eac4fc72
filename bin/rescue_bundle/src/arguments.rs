use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "rescue_bundle", version, about = "Moves assets out of a compromised account with a private relay bundle", long_about = None)]
pub struct AppArgs {
    #[arg(long, default_value = "rescue.toml")]
    pub config: String,

    /// Network preset filling chain id and relay url: mainnet or goerli.
    #[arg(long)]
    pub network: Option<String>,

    /// Simulate the first bundle and exit without submitting.
    #[arg(long)]
    pub dry_run: bool,
}

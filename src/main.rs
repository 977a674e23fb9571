use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use swapdesk::agent::Agent;
use swapdesk::chain::JsonRpcChain;
use swapdesk::channels::ReplChannel;
use swapdesk::config::Settings;
use swapdesk::market::AggregatorClient;
use swapdesk::profile::InMemoryProfileStore;
use swapdesk::wallet::HkdfWalletVault;

#[derive(Debug, Parser)]
#[command(name = "swapdesk", version, about = "Conversational custodial swap agent")]
struct Cli {
    /// Default log filter when RUST_LOG is not set.
    #[arg(long, env = "SWAPDESK_LOG", default_value = "swapdesk=info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log)),
        )
        .with_target(false)
        .init();

    let settings = Settings::from_env()?;

    let profiles = Arc::new(InMemoryProfileStore::new(settings.trade.default_slippage_pct));
    let market = Arc::new(AggregatorClient::new(&settings.aggregator));
    let chain = Arc::new(JsonRpcChain::new(&settings.rpc));
    let vault = Arc::new(HkdfWalletVault::new(settings.wallet.master_seed.clone())?);

    let agent = Arc::new(Agent::new(
        profiles,
        market,
        chain,
        vault,
        settings.trade.clone(),
    ));

    tracing::info!("swapdesk starting");
    ReplChannel::new(agent).run().await?;
    Ok(())
}

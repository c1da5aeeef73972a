use clap::{Parser, Subcommand};
use eyre::Result;
use log::info;
use url::Url;

use ouro::arb::pipeline::{Pipeline, PipelineSettings};
use ouro::bot::{load_market, Bot};
use ouro::chain::relay::Route;
use ouro::chain::rpc::http_provider;
use ouro::chain::{RelayBroadcaster, RpcLedger};
use ouro::config::Config;
use ouro::server::start_server;
use ouro::utils::constants::RELAYS;
use ouro::utils::logger::setup_logger;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port of the status endpoint, overrides STATUS_PORT
    #[arg(long)]
    status_port: Option<u16>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the caches and run the bot (default)
    Run,
    /// Rescan every exchange and rewrite the caches
    Scan,
}

async fn scan(config: &Config) -> Result<()> {
    let provider = http_provider(&config.rpc_url)?;
    let market = load_market(&provider, config, true).await?;
    info!(
        "Scanned {} pools, {} tokens, {} starters",
        market.pools.len(),
        market.tokens.len(),
        market.starters.len()
    );
    Ok(())
}

async fn run(config: &Config) -> Result<()> {
    let provider = http_provider(&config.rpc_url)?;

    let route = if config.use_relays {
        Route::Relays(RELAYS.iter().map(|relay| Url::parse(relay)).collect::<Result<_, _>>()?)
    } else {
        let url = config.execution_rpc_url.as_deref().unwrap_or(&config.rpc_url);
        Route::Direct(http_provider(url)?)
    };
    let broadcaster = RelayBroadcaster::new(provider.clone(), route, &config.private_key, config.flash_contract).await?;
    let ledger = RpcLedger::new(provider.clone(), broadcaster.address(), config.flash_contract);
    info!(
        "Running on {} as {} with flash contract {}",
        config.network.name,
        broadcaster.address(),
        config.flash_contract
    );

    let market = load_market(&provider, config, false).await?;
    info!("Found {} starters", market.starters.len());

    let (pipeline, status) = Pipeline::new(PipelineSettings {
        min_liquidity_usd: config.min_liquidity,
        eth_price: config.eth_price,
        flash_contract: config.flash_contract,
    });
    start_server(status, config.status_port).await?;

    Bot::new(ledger, broadcaster, pipeline, market).run().await
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logger()?;

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(port) = cli.status_port {
        config.status_port = port;
    }

    match cli.command {
        Some(Commands::Scan) => scan(&config).await,
        Some(Commands::Run) | None => run(&config).await,
    }
}

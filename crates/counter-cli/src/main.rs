//! ER Counter
//!
//! Command line driver for the counter account: reads its status and both
//! ledgers' copies, and runs initialize / increment / delegate / commit /
//! undelegate through the delegation controller. With `--simulate` it runs
//! against an in-memory base ledger and rollup that live for one invocation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use er_client::{
    Confirmation, DelegationController, KeypairWallet, OperationError, Wallet,
};
use ledger_sim::SimulatedCluster;
use serde::Serialize;
use solana_sdk::{pubkey::Pubkey, signature::Keypair};
use std::{sync::Arc, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::Overrides;

/// Counter with ephemeral rollup delegation
#[derive(Parser, Debug)]
#[command(name = "er-counter")]
#[command(about = "Counter on a base ledger with ephemeral rollup delegation", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    overrides: Overrides,

    /// Run against an in-memory base ledger and rollup
    #[arg(long, global = true)]
    simulate: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Show whether the counter is absent, resident or delegated
    Status,
    /// Show the base and ephemeral copies of the counter
    View,
    /// Create the counter on the base ledger
    Init,
    /// Increment on whichever ledger currently has authority
    Increment {
        /// Number of increments to send
        #[arg(long, default_value = "1")]
        times: u32,
    },
    /// Hand the counter to the ephemeral rollup
    Delegate,
    /// Checkpoint the rollup's value to the base ledger
    Commit,
    /// Checkpoint and return the counter to the base ledger
    Undelegate,
    /// Walk the counter through a full delegation cycle
    Demo,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(args).await {
        report(&e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.overrides.resolve()?;

    let controller = if args.simulate {
        let wallet = Arc::new(KeypairWallet::new(Keypair::new()));
        tracing::info!("Simulated cluster, throwaway wallet {}", wallet.pubkey());

        let cluster = SimulatedCluster::new(config.program()?);
        let mut router_config = config.router_config()?;
        router_config.poll_interval = Duration::from_millis(10);
        DelegationController::new(cluster.ledgers(), wallet, cluster.program(), router_config)
    } else {
        let path = config::wallet_path(&config).context("no keypair given and HOME is not set")?;
        let wallet = KeypairWallet::from_file(&path)?;
        tracing::info!("Wallet {} from {}", wallet.pubkey(), path.display());
        DelegationController::connect(&config, Arc::new(wallet))?
    };

    let address = controller.counter_address();
    tracing::info!("Counter account {}", address);

    match args.command {
        Command::Status => {
            let status = controller.status(&address).await?;
            print_json(&serde_json::json!({
                "address": address.to_string(),
                "status": status,
            }))?;
        }
        Command::View => print_json(&controller.dual_view(&address).await?)?,
        Command::Init => print_json(&controller.initialize(&address).await?)?,
        Command::Increment { times } => {
            for _ in 0..times {
                print_json(&controller.increment(&address).await?)?;
            }
        }
        Command::Delegate => print_json(&controller.delegate(&address).await?)?,
        Command::Commit => print_json(&controller.commit(&address).await?)?,
        Command::Undelegate => print_json(&controller.undelegate(&address).await?)?,
        Command::Demo => demo(&controller, &address).await?,
    }

    Ok(())
}

/// initialize, increment (base), delegate, increment (ephemeral) x2, commit, undelegate
async fn demo(controller: &DelegationController, address: &Pubkey) -> Result<()> {
    step(controller, address, "initialize", controller.initialize(address).await?).await?;
    step(controller, address, "increment", controller.increment(address).await?).await?;
    step(controller, address, "delegate", controller.delegate(address).await?).await?;
    for _ in 0..2 {
        step(controller, address, "increment", controller.increment(address).await?).await?;
    }
    step(controller, address, "commit", controller.commit(address).await?).await?;
    step(controller, address, "undelegate", controller.undelegate(address).await?).await?;
    Ok(())
}

async fn step(
    controller: &DelegationController,
    address: &Pubkey,
    name: &str,
    confirmation: Confirmation,
) -> Result<()> {
    let view = controller.dual_view(address).await?;
    tracing::info!(
        "{}: base={:?} ephemeral={:?}",
        name,
        view.base.map(|a| a.counter_value),
        view.ephemeral.map(|a| a.counter_value)
    );
    print_json(&serde_json::json!({
        "step": name,
        "confirmation": confirmation,
        "view": view,
    }))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print the failure kind and ledger text; ambiguous outcomes get a hint
fn report(error: &anyhow::Error) {
    match error.downcast_ref::<OperationError>() {
        Some(op) => {
            let body = serde_json::json!({
                "error": op.kind(),
                "message": op.to_string(),
            });
            eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_else(|_| op.to_string()));
            if op.is_ambiguous() {
                eprintln!("The transaction may still land. Run `er-counter status` before retrying.");
            }
        }
        None => eprintln!("Error: {:#}", error),
    }
}

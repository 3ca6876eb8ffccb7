//! TalonLRU hardware-leaf binary: power fan-out and board provisioning
//! for one LRU (spec §3, §4.7).
//!
//! SlimLink nodes live under the same process but are not addressed by
//! this binary's CLI yet — `mcs-sim` constructs them directly for the
//! scenario suite.

mod config;

use anyhow::Result;
use clap::Parser;
use config::Config;
use mcs_core::{Fqdn, LruNode, MemoStore, Registry};
use mcs_driver::{SimBoardProvisioner, SimPowerDriver};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "mcs-hardware")]
#[command(about = "Master Control System TalonLRU node", long_about = None)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "mid_csp_cbf/talon_lru/001")]
    fqdn: String,

    #[arg(long, default_value = "./var/mcs-hardware-memo.json")]
    memo_path: String,

    #[arg(long)]
    simulation_mode: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::builder()
            .fqdn(&args.fqdn)
            .memo_path(&args.memo_path)
            .simulation_mode(args.simulation_mode)
            .build(),
    };

    tracing::info!(fqdn = %config.fqdn, "mcs-hardware starting");

    let memo = Arc::new(MemoStore::open(&config.memo_path)?);
    let registry = Registry::new(memo.clone());

    // A real deployment selects the power driver at runtime by
    // `simulationMode`; only the simulator ships unconditionally, the
    // HTTP driver requires building with `--features production`.
    #[cfg(feature = "production")]
    let power_driver: Arc<dyn mcs_driver::PowerDriver> = if config.simulation_mode {
        Arc::new(SimPowerDriver::new([config.outlet_a, config.outlet_b]))
    } else {
        Arc::new(mcs_driver::HttpPowerDriver::new(&config.board_target_ip)?)
    };
    #[cfg(not(feature = "production"))]
    let power_driver: Arc<dyn mcs_driver::PowerDriver> =
        Arc::new(SimPowerDriver::new([config.outlet_a, config.outlet_b]));

    let board_driver = Arc::new(SimBoardProvisioner::new());

    let lru = LruNode::new(
        Fqdn::from(config.fqdn.as_str()),
        config.outlet_a,
        config.outlet_b,
        config.board_target_ip.clone(),
        config.bitstream_path.clone(),
        config.device_server_list.clone(),
        config.master_fqdn.clone(),
        power_driver,
        board_driver,
        memo,
    );
    lru.set_simulation_mode(config.simulation_mode);
    lru.spawn_poll_loop();
    registry.register_lru(lru.clone());

    tracing::info!(admin = ?lru.admin.get(), op = ?lru.op.get(), "LRU ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    Ok(())
}

//! Controller node binary: sys-param ownership, power fan-out, and
//! bringing subarrays on/offline (spec §4.3).
//!
//! Node-to-node calls in a full deployment cross the distributed-object
//! middleware spec §1 externalizes; this binary only wires the
//! Controller into the in-process registry, so its LRU/Subarray peers
//! resolve only if this process also registers them (as `mcs-sim` does).
//! A standalone deployment needs a `Transport` implementation bound to
//! that middleware in place of `Registry`.

mod config;

use anyhow::Result;
use clap::Parser;
use config::Config;
use mcs_core::{ControllerNode, Fqdn, MemoStore, Registry};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "mcs-controller")]
#[command(about = "Master Control System controller node", long_about = None)]
struct Args {
    /// Path to a JSON config file; CLI flags below are used when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "mid_csp_cbf/sub_elt/controller")]
    fqdn: String,

    #[arg(long, default_value = "./var/mcs-controller-memo.json")]
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

    tracing::info!(fqdn = %config.fqdn, "mcs-controller starting");

    let memo = Arc::new(MemoStore::open(&config.memo_path)?);
    let registry = Registry::new(memo);

    let lru_fqdns: Vec<Fqdn> = config.lru_fqdns.iter().map(|s| Fqdn::from(s.as_str())).collect();
    let subarray_fqdns: Vec<Fqdn> = config
        .subarray_fqdns
        .iter()
        .map(|s| Fqdn::from(s.as_str()))
        .collect();

    let controller = ControllerNode::new(
        Fqdn::from(config.fqdn.as_str()),
        lru_fqdns,
        subarray_fqdns,
        registry.clone(),
    );
    registry.register_controller(controller.clone());

    tracing::info!(admin = ?controller.admin.get(), op = ?controller.op.get(), "controller ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    Ok(())
}

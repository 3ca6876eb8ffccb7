//! Subarray node binary: the observation-state machine and
//! `ConfigureScan` orchestrator (spec §4.4).
//!
//! Depends on the VCCs and FSPs it fans out to being resolvable through
//! the same `Registry`; standalone, this binary registers only itself.

mod config;

use anyhow::Result;
use clap::Parser;
use config::Config;
use mcs_core::{Fqdn, MemoStore, Registry, SubarrayNode};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "mcs-subarray")]
#[command(about = "Master Control System subarray node", long_about = None)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "mid_csp_cbf/sub_elt/subarray_01")]
    fqdn: String,

    #[arg(long, default_value_t = 1)]
    subarray_id: u16,

    #[arg(long, default_value = "./var/mcs-subarray-memo.json")]
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
            .subarray_id(args.subarray_id)
            .memo_path(&args.memo_path)
            .simulation_mode(args.simulation_mode)
            .build(),
    };

    tracing::info!(fqdn = %config.fqdn, subarray_id = config.subarray_id, "mcs-subarray starting");

    let memo = Arc::new(MemoStore::open(&config.memo_path)?);
    let registry = Registry::new(memo);

    let subarray = SubarrayNode::new(Fqdn::from(config.fqdn.as_str()), config.subarray_id, registry.clone());
    registry.register_subarray(subarray.clone());

    tracing::info!(admin = ?subarray.admin.get(), obs = ?subarray.obs.get(), "subarray ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    Ok(())
}

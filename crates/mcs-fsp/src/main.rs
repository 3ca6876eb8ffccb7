//! FSP node binary: the shared frequency-slice-processor parent, one
//! function-mode sub-node per subarray that has it assigned (spec §4.5).

mod config;

use anyhow::Result;
use clap::Parser;
use config::Config;
use mcs_core::{Fqdn, MemoStore, Registry, FspNode};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "mcs-fsp")]
#[command(about = "Master Control System FSP node", long_about = None)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "mid_csp_cbf/fsp/01")]
    fqdn: String,

    #[arg(long, default_value_t = 1)]
    fsp_id: u32,

    #[arg(long, default_value = "./var/mcs-fsp-memo.json")]
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
            .fsp_id(args.fsp_id)
            .memo_path(&args.memo_path)
            .simulation_mode(args.simulation_mode)
            .build(),
    };

    tracing::info!(fqdn = %config.fqdn, fsp_id = config.fsp_id, "mcs-fsp starting");

    let memo = Arc::new(MemoStore::open(&config.memo_path)?);
    let registry = Registry::new(memo);

    let fsp = FspNode::new(Fqdn::from(config.fqdn.as_str()), config.fsp_id);
    registry.register_fsp(fsp.clone());

    tracing::info!(admin = ?fsp.admin.get(), function_mode = ?fsp.function_mode(), "FSP ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    Ok(())
}

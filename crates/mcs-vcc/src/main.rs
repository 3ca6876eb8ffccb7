//! VCC node binary: band selection and delay tracking for one
//! receptor's digitized signal path (spec §4.3).

mod config;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use config::Config;
use mcs_core::{DishType, Fqdn, MemoStore, Registry, VccNode};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DishTypeArg {
    Ska,
    MeerKatExtension,
}

impl From<DishTypeArg> for DishType {
    fn from(arg: DishTypeArg) -> Self {
        match arg {
            DishTypeArg::Ska => DishType::Ska,
            DishTypeArg::MeerKatExtension => DishType::MeerKatExtension,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mcs-vcc")]
#[command(about = "Master Control System VCC node", long_about = None)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "mid_csp_cbf/vcc/001")]
    fqdn: String,

    #[arg(long, default_value_t = 1)]
    vcc_id: u32,

    #[arg(long, default_value = "./var/mcs-vcc-memo.json")]
    memo_path: String,

    #[arg(long)]
    simulation_mode: bool,

    #[arg(long, value_enum, default_value = "ska")]
    dish_type: DishTypeArg,
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
            .vcc_id(args.vcc_id)
            .memo_path(&args.memo_path)
            .simulation_mode(args.simulation_mode)
            .dish_type(args.dish_type.into())
            .build(),
    };

    tracing::info!(fqdn = %config.fqdn, vcc_id = config.vcc_id, "mcs-vcc starting");

    let memo = Arc::new(MemoStore::open(&config.memo_path)?);
    let registry = Registry::new(memo);

    let vcc = VccNode::new(Fqdn::from(config.fqdn.as_str()), config.vcc_id, config.dish_type);
    registry.register_vcc(vcc.clone());

    tracing::info!(admin = ?vcc.admin.get(), obs = ?vcc.obs.get(), "VCC ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    Ok(())
}

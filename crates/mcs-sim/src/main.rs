//! Scenario runner: exercises the full device tree in one process and
//! prints the outcome of each named scenario from spec §8.

use clap::{Parser, ValueEnum};
use mcs_sim::{build, scenario_s1, scenario_s2, scenario_s3, scenario_s4, scenario_s5, scenario_s6};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Scenario {
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
}

#[derive(Parser, Debug)]
#[command(name = "mcs-sim")]
#[command(about = "Master Control System scenario runner", long_about = None)]
struct Args {
    /// Scenario to run; omit to run the full suite in order.
    scenario: Option<Scenario>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let scenarios = match args.scenario {
        Some(s) => vec![s],
        None => vec![Scenario::S1, Scenario::S2, Scenario::S3, Scenario::S4, Scenario::S5, Scenario::S6],
    };

    for scenario in scenarios {
        let topo = build();
        let label = format!("{scenario:?}");
        let result = match scenario {
            Scenario::S1 => scenario_s1(&topo).await,
            Scenario::S2 => scenario_s2(&topo).await,
            Scenario::S3 => scenario_s3(&topo).await,
            Scenario::S4 => scenario_s4(&topo).await,
            Scenario::S5 => scenario_s5(&topo).await,
            Scenario::S6 => scenario_s6(&topo).await,
        };
        match result {
            Ok(msg) => tracing::info!(scenario = %label, "PASS: {msg}"),
            Err(msg) => {
                tracing::error!(scenario = %label, "FAIL: {msg}");
                anyhow::bail!("scenario {label} failed: {msg}");
            }
        }
    }

    Ok(())
}

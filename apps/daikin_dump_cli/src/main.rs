use std::sync::Arc;

use clap::Parser;
use daikin_dump_adapters::configuration;
use daikin_dump_adapters::telemetry;
use daikin_dump_adapters::{DaikinCloud, FileSnapshotWriter, FileTokenStore};
use daikin_dump_core::config::absolute_data_dir;
use daikin_dump_core::entities::{RunState, SnapshotReport};
use daikin_dump_core::login_strategy::LoginStrategy;
use daikin_dump_core::use_cases::{DumpEvent, DumpUseCase};
use tracing::{error, info};

/// Log in to Daikin Cloud, save the token set and dump every device's data
/// to `<device id>.json`.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// EMAIL PASSWORD for a direct login. Anything else starts the
    /// interactive login through the local web interface.
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn summary_line(report: &SnapshotReport) -> String {
    if report.failed.is_empty() {
        format!("Done: {} device snapshot(s) written", report.written.len())
    } else {
        format!(
            "Done: {} device snapshot(s) written, {} failed",
            report.written.len(),
            report.failed.len()
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let settings = configuration::get_configuration();
    let log_level = settings
        .as_ref()
        .map(|s| s.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    let _guard = telemetry::init_subscriber("daikin_dump", &log_level);

    println!("{}", DumpEvent::State(RunState::Configuring));

    let mut settings = match settings {
        Ok(s) => s,
        Err(e) => {
            error!(?e, "failed to load configuration");
            println!("{}", DumpEvent::State(RunState::Fatal));
            return Err(anyhow::anyhow!("configuration loading failed: {}", e));
        }
    };
    if let Err(e) = settings.validate() {
        error!(error = %e, "invalid configuration");
        println!("{}", DumpEvent::State(RunState::Fatal));
        return Err(e.into());
    }
    settings.data_dir = absolute_data_dir(&settings.data_dir, &std::env::current_dir()?);

    info!(data_dir = %settings.data_dir.display(), "configuration loaded");

    let cloud = Arc::new(DaikinCloud::new(None, &settings)?);
    let token_store = Arc::new(FileTokenStore::new(&settings.data_dir));
    let snapshot_writer = Arc::new(FileSnapshotWriter::new(&settings.data_dir));

    let dump = DumpUseCase::new(cloud, token_store, snapshot_writer, settings.proxy.clone());
    let strategy = LoginStrategy::from_args(&cli.args);

    let report = dump
        .execute(&strategy, |event| println!("{}", event))
        .await?;

    println!("{}", summary_line(&report));
    Ok(())
}

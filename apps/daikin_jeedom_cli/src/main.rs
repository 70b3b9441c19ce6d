use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use daikin_dump_adapters::configuration;
use daikin_dump_adapters::network::build_cloud_client;
use daikin_dump_adapters::telemetry;
use daikin_dump_adapters::{DaikinCloud, FileSnapshotWriter, FileTokenStore, JeedomClient};
use daikin_dump_core::config::absolute_data_dir;
use daikin_dump_core::entities::{Credentials, DeviceId};
use daikin_dump_core::login_strategy::LoginStrategy;
use daikin_dump_core::use_cases::{DumpUseCase, PublishConsumptionUseCase, PublishReport};
use tracing::{debug, info};

/// Dump every Daikin device and publish its electrical consumption as
/// Jeedom variables.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, default_value = "conf.json")]
    conf: PathBuf,

    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn log_level<'a>(&self, configured: &'a str) -> &'a str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            configured
        }
    }
}

fn summary_line(report: &PublishReport) -> String {
    if report.failed.is_empty() {
        format!("Done: consumption published for {} device(s)", report.published.len())
    } else {
        format!(
            "Done: consumption published for {} device(s), {} skipped",
            report.published.len(),
            report.failed.len()
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut settings = configuration::get_configuration()
        .map_err(|e| anyhow::anyhow!("configuration loading failed: {}", e))?;
    let _guard = telemetry::init_subscriber("daikin_to_jeedom", cli.log_level(&settings.log_level));

    debug!(conf = %cli.conf.display(), "reading configuration file");
    let conf = configuration::load_jeedom_conf(&cli.conf)?;

    settings.data_dir = absolute_data_dir(&conf.conf.data_dir, &std::env::current_dir()?);
    settings.validate()?;
    info!(data_dir = %settings.data_dir.display(), "configuration loaded");

    let cloud = Arc::new(DaikinCloud::new(None, &settings)?);
    let token_store = Arc::new(FileTokenStore::new(&settings.data_dir));
    let snapshots = Arc::new(FileSnapshotWriter::new(&settings.data_dir));

    let dump = DumpUseCase::new(cloud, token_store, snapshots.clone(), settings.proxy.clone());
    let strategy = LoginStrategy::DirectCredentials(Credentials::new(
        conf.daikin.username.clone(),
        conf.daikin.password.clone(),
    ));
    let dumped = dump.execute(&strategy, |event| debug!("{}", event)).await?;

    let device_ids: Vec<DeviceId> = dumped.written.iter().map(|(id, _)| id.clone()).collect();

    let client = build_cloud_client(settings.cloud.communication_timeout())?;
    let jeedom = Arc::new(JeedomClient::new(
        client,
        &conf.jeedom,
        settings.cloud.communication_retries,
    ));

    let publish = PublishConsumptionUseCase::new(snapshots, jeedom);
    let report = publish
        .execute(&device_ids, chrono::Local::now().naive_local())
        .await?;

    println!("{}", summary_line(&report));
    Ok(())
}

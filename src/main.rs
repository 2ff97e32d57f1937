use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use tracing::Instrument;
use uuid::Uuid;

use auto_justify::config::AppConfig;
use auto_justify::gateway::{Gateway, HttpGateway};
use auto_justify::pipeline::JustificationRun;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; variables may come from the process environment.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;

    eprintln!("Auto Justify v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Whitelisted portfolios: {}", config.whitelist.len());
    eprintln!("   Email recipients: {}", config.notification.recipients);
    if config.dry_run {
        eprintln!("   Dry run: nothing will be submitted or emailed");
    }

    let gateway: Arc<dyn Gateway> =
        Arc::new(HttpGateway::new(config.gateway.clone()).context("building HTTP gateway")?);

    let run_id = Uuid::new_v4();
    let run = JustificationRun::new(gateway, config, Local::now().date_naive());
    let report = run
        .execute()
        .instrument(tracing::info_span!("justification_run", %run_id))
        .await
        .context("justification run failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

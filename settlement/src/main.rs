use merchant_settlement::{Config, SettlementPipeline};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Merchant settlement starting...");

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    info!(
        "Configuration loaded - directory: {}, output: {}, policy: {:?}",
        config.directory.base_url,
        config.export.output_dir.display(),
        config.pipeline.error_policy
    );

    let pipeline = SettlementPipeline::from_config(&config)?;

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling settlement run");
            cancel.cancel();
        }
    });

    let report = pipeline.run().await?;

    for failure in &report.failures {
        warn!(
            "Merchant {} not settled ({}): {}",
            failure.merchant_id, failure.kind, failure.message
        );
    }

    if let Some(path) = &report.export_path {
        info!(
            "Exported {} merchants to {} ({} skipped)",
            report.results.len(),
            path.display(),
            report.failures.len()
        );
    }

    Ok(())
}

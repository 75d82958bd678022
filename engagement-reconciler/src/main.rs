//! Engagement Reconciler Main Entry Point
//!
//! Repairs the denormalized vote and comment counters of stories and
//! comments. Runs on a schedule by default, or once in repair or diagnose
//! mode for operators.
use dotenv::dotenv;
use engagement_reconciler::config::{LogFormat, RunMode};
use engagement_reconciler::{
    Dependencies, PassKind, ReconcilerConfig, ReconcilerError, Scheduler,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("engagement_reconciler=info,engagement_core=info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_ids(true),
                )
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
                .init();
        }
    }

    info!(
        service_name = "engagement-reconciler",
        service_version = env!("CARGO_PKG_VERSION"),
        log_format = ?format,
        "Tracing initialized"
    );
}

#[tokio::main]
async fn main() -> Result<(), ReconcilerError> {
    // Load environment variables from .env file
    dotenv().ok();

    init_tracing(LogFormat::from_env());

    let config = match ReconcilerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e);
        }
    };

    let deps = match Dependencies::new(&config).await {
        Ok(deps) => {
            info!("Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    let scheduler = Scheduler::new(deps.service, config.targets.clone(), config.reconcile_interval);

    match config.mode {
        RunMode::Schedule => {
            let passes = scheduler.run().await;
            info!(passes, "Reconciler stopped");
            Ok(())
        }
        RunMode::Once => scheduler.run_pass(PassKind::Reconcile).await.map(|_| ()),
        RunMode::Diagnose => {
            let reports = scheduler.run_pass(PassKind::Diagnose).await?;
            let mismatches: usize = reports.iter().map(|report| report.corrections.len()).sum();
            info!(mismatches, "Diagnose finished");
            Ok(())
        }
    }
}

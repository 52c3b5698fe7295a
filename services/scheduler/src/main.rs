//! Mesos HTTP scheduler
//!
//! Runs `--max-tasks` copies of a command (or custom executor) on a Mesos
//! cluster and exits once they have finished. The exit status is non-zero if
//! a task failed under the fail-fast policy or the master stayed unreachable.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mesos_scheduler::config::{Config, LogFormat};
use mesos_scheduler::Driver;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(&config);

    info!("Starting mesos scheduler");

    let framework = config.framework_info()?;
    info!(
        master = %config.master,
        user = %framework.user,
        name = %framework.name,
        max_tasks = config.max_tasks,
        cpu_per_task = config.cpu_per_task,
        mem_per_task = config.mem_per_task,
        "Configuration loaded"
    );

    let driver = Driver::with_options(
        &config.master,
        framework,
        config.resource_policy(),
        config.driver_options(),
    )
    .context("Failed to create scheduler driver")?;

    let completion = driver
        .start()
        .await
        .context("Failed to subscribe to master")?;
    tokio::pin!(completion);

    let reason = tokio::select! {
        reason = &mut completion => reason,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            driver.stop();
            completion.await
        }
    };

    let counters = driver.counters();
    if reason.is_failure() {
        error!(
            reason = %reason,
            launched = counters.launched,
            finished = counters.finished,
            "Scheduler failed"
        );
        std::process::exit(1);
    }

    if counters.failed > 0 {
        warn!(failed = counters.failed, "Some tasks did not succeed");
    }
    info!(
        reason = %reason,
        launched = counters.launched,
        finished = counters.finished,
        "Scheduler shutdown complete"
    );
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}

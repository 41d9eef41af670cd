//! leadsweep daemon
//!
//! Opens the persistent lead store and runs the duplicate sweeper on a
//! schedule until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use leadsweep::storage::open_store;
use leadsweep::{KeepPolicy, LeadStore, SweepScheduler, Sweeper, SweeperConfig};

/// Scheduled duplicate-lead sweeper.
///
/// Flags override the matching `LEADSWEEP_*` environment variables.
#[derive(Debug, Parser)]
#[command(name = "leadsweep-daemon", version, about)]
struct Cli {
    /// Lead store directory [env: LEADSWEEP_DATA_DIR] [default: ./leads.db]
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Cron expression, `every <n><s|m|h|d>`, or `manual`
    /// [env: LEADSWEEP_SCHEDULE] [default: "0 */8 * * *"]
    #[arg(short, long)]
    schedule: Option<String>,

    /// Which lead of a duplicate group survives: oldest or store-order
    /// [env: LEADSWEEP_KEEP] [default: oldest]
    #[arg(short, long)]
    keep: Option<KeepPolicy>,

    /// Run one sweep at startup, then follow the schedule
    #[arg(long)]
    run_now: bool,

    /// Run one sweep and exit
    #[arg(long, conflicts_with = "run_now")]
    once: bool,
}

impl Cli {
    fn apply(&self, mut config: SweeperConfig) -> SweeperConfig {
        if let Some(dir) = &self.data_dir {
            config.data_dir.clone_from(dir);
        }
        if let Some(schedule) = &self.schedule {
            config.schedule.clone_from(schedule);
        }
        if let Some(keep) = self.keep {
            config.keep = keep;
        }
        config.run_on_start |= self.run_now;
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.apply(SweeperConfig::from_env()?);
    let schedule = config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        schedule = %schedule,
        keep = %config.keep,
        "starting leadsweep daemon"
    );

    // Holds an exclusive lock on the directory for the process lifetime.
    let store: Arc<dyn LeadStore> = Arc::new(open_store(&config.data_dir, None)?);
    info!(leads = store.count()?, "lead store opened");

    let sweeper = Sweeper::with_policy(store, config.keep);

    if cli.once {
        sweeper.run()?;
        return Ok(());
    }

    let scheduler = SweepScheduler::start(sweeper, schedule)?;
    if let Some(next) = scheduler.stats().next_run {
        info!(next_run = %next, "waiting for next sweep");
    }
    if config.run_on_start {
        // The worker logs the outcome; nobody waits on the handle.
        drop(scheduler.trigger()?);
    }

    shutdown_signal().await;

    tokio::task::spawn_blocking(move || scheduler.stop()).await?;
    info!("leadsweep daemon shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

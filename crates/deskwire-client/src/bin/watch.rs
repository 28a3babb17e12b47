//! Deskwire Watch
//!
//! Follows a helpdesk collection from the terminal and logs every refresh,
//! toast and transport switch. Press Enter to force a refresh.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use deskwire_client::{
    spawn_http_watcher, Notices, PollProfile, ReconcileHandler, Resource, Tickets, Toast,
    TransportChoice, TransportMode, Update, WatchConfig, WatchHandle,
};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResourceArg {
    Tickets,
    Notices,
}

#[derive(Parser, Debug)]
#[command(name = "deskwire-watch")]
#[command(author, version, about = "Watch helpdesk tickets or notices in real time")]
struct Cli {
    /// Server base URL
    #[arg(short, long, env = "DESKWIRE_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Collection to watch
    #[arg(short, long, value_enum, default_value_t = ResourceArg::Tickets)]
    resource: ResourceArg,

    /// Polling interval in seconds (defaults to the resource's profile)
    #[arg(short, long)]
    interval: Option<u64>,

    /// Push transport to use
    #[arg(short, long, value_enum, default_value_t = TransportChoice::Push)]
    transport: TransportChoice,

    /// Seconds push may stay disconnected before polling takes over
    #[arg(short, long, default_value_t = 15)]
    grace: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Logs reconciled output
struct LogHandler<R> {
    _resource: PhantomData<R>,
}

impl<R: Resource> ReconcileHandler<R::Item> for LogHandler<R> {
    fn on_update(&self, update: &Update, items: &[R::Item]) {
        info!(
            resource = R::NAME,
            kind = %update.kind,
            count = items.len(),
            fingerprint = &update.fingerprint[..12usize.min(update.fingerprint.len())],
            "Collection refreshed"
        );
    }

    fn on_toast(&self, toast: &Toast) {
        if toast.suppressed > 0 {
            info!("{} (+{} more)", toast.message, toast.suppressed);
        } else {
            info!("{}", toast.message);
        }
    }

    fn on_mode_change(&self, mode: TransportMode) {
        match mode {
            TransportMode::Polling => warn!("Realtime unavailable, polling for changes"),
            TransportMode::Push => info!("Realtime connection restored"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let handle = match cli.resource {
        ResourceArg::Tickets => start::<Tickets>(&cli, PollProfile::List)?,
        ResourceArg::Notices => start::<Notices>(&cli, PollProfile::Notices)?,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(_)) => {
                    handle.force_refresh();
                }
                // stdin closed or unreadable; keep watching until Ctrl+C
                _ => {
                    tokio::signal::ctrl_c().await?;
                    break;
                }
            },
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    info!(mode = %handle.mode(), connection = %handle.connection(), "Stopping watcher");
    Ok(())
}

fn start<R: Resource>(cli: &Cli, profile: PollProfile) -> Result<WatchHandle> {
    let mut config = WatchConfig::new(cli.server.clone(), cli.transport).with_profile(profile);
    if let Some(secs) = cli.interval {
        config.interval = Duration::from_secs(secs.max(1));
    }
    config.grace = Duration::from_secs(cli.grace);

    let handler = Arc::new(LogHandler::<R> {
        _resource: PhantomData,
    });
    Ok(spawn_http_watcher::<R>(config, handler)?)
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("deskwire_client=debug,deskwire_watch=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("deskwire_client=info,deskwire_watch=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

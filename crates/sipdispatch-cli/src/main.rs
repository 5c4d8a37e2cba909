//! sipdispatch demo host: a UDP echo service driven by the event dispatcher
//!
//! Shows the wiring a host process performs: build the runtime for the
//! selected backend, construct one explicit dispatcher, register a UDP
//! transport and a self-rescheduling stats timer against it, and run the
//! loop until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use sipdispatch_core::{DispatcherConfig, RuntimeBackend, UdpTransportConfig};
use sipdispatch_runtime::{EventDispatcher, TimerDeadline};
use sipdispatch_udp::{DataCallback, UdpOptions, UdpTransport, UdpTransportHandle};

#[derive(Parser)]
#[command(
    name = "sipdispatch",
    about = "UDP echo host driven by the sipdispatch scheduling core"
)]
struct Cli {
    /// Local address to bind the UDP socket to
    #[arg(long, default_value = "127.0.0.1:5060")]
    listen: SocketAddr,

    /// Seconds between transport statistics reports
    #[arg(long, default_value_t = 10)]
    stats_interval: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let backend = RuntimeBackend::from_env();
    info!(%backend, "selected concurrency backend");
    let runtime = backend.build_runtime()?;
    runtime.block_on(serve(cli))
}

async fn serve(cli: Cli) -> anyhow::Result<()> {
    let dispatcher = Arc::new(EventDispatcher::new(DispatcherConfig::default())?);

    let echo: DataCallback = Arc::new(|payload, source, handle, _received_at| {
        info!(%source, len = payload.len(), "echoing datagram");
        handle.send_to(payload.to_vec(), (source.host.as_str(), source.port))?;
        Ok(())
    });
    let handle = UdpTransport::register(
        dispatcher.as_ref(),
        UdpTransportConfig::default(),
        UdpOptions::new(cli.listen, echo),
    )?;

    schedule_stats_report(
        &dispatcher,
        handle,
        Duration::from_secs(cli.stats_interval),
    );

    let stopper = Arc::clone(&dispatcher);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            stopper.stop();
        }
    });

    dispatcher.run().await?;
    Ok(())
}

/// One-shot timer that re-registers itself, giving a periodic stats report
fn schedule_stats_report(
    dispatcher: &Arc<EventDispatcher>,
    handle: UdpTransportHandle,
    interval: Duration,
) {
    let rescheduler = Arc::clone(dispatcher);
    let timer = dispatcher.register_timer(
        TimerDeadline::Relative(interval),
        Box::new(move || {
            let stats = handle.stats();
            info!(
                sent = stats.sent(),
                received = stats.received(),
                dropped = stats.dropped(),
                "transport stats"
            );
            schedule_stats_report(&rescheduler, handle.clone(), interval);
            Ok(())
        }),
    );
    if let Err(err) = timer.start() {
        warn!(error = %err, "failed to arm stats timer");
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();
}

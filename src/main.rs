//! # Sailwatch — Ferry Availability Monitor & Auto-Booking Daemon
//!
//! Watches a specific sailing until a slot opens, then drives an
//! external booking runner step by step. Can run in the foreground or
//! as a detached daemon with durable, cross-process-visible state.
//!
//! Usage:
//!   sailwatch monitor --from tsawwassen --to swartz_bay --date 2025-10-15 --time "1:20 pm"
//!   sailwatch monitor-and-book --from departure_bay --to horseshoe_bay \
//!       --date 2025-10-15 --time 13:20 --adults 2 --daemon
//!   sailwatch status | logs -f | stop

use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use sailwatch_api::client::ApiClient;
use sailwatch_api::poller::AvailabilityPoller;
use sailwatch_core::config::SailwatchConfig;
use sailwatch_core::error::SailwatchError;
use sailwatch_core::types::{PollRequest, WorkflowStatus};
use sailwatch_daemon::booking;
use sailwatch_daemon::{CommandAutomator, DaemonSupervisor, StateStore, WorkflowRunner};

#[derive(Parser)]
#[command(
    name = "sailwatch",
    version,
    about = "⛴️ Sailwatch — ferry availability monitor and auto-booking daemon"
)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Route, passengers, and polling cadence shared by the watch commands.
#[derive(Args)]
struct RouteArgs {
    /// Departure terminal name or code (e.g. "tsawwassen", "TSA")
    #[arg(long)]
    from: String,

    /// Arrival terminal name or code
    #[arg(long)]
    to: String,

    /// Travel date (YYYY-MM-DD)
    #[arg(long)]
    date: String,

    /// Target sailing time (e.g. "1:20 pm" or "13:20")
    #[arg(long)]
    time: String,

    /// Adult passengers
    #[arg(long, default_value_t = 1)]
    adults: u32,

    /// Child passengers
    #[arg(long, default_value_t = 0)]
    children: u32,

    /// Senior passengers
    #[arg(long, default_value_t = 0)]
    seniors: u32,

    /// Infant passengers
    #[arg(long, default_value_t = 0)]
    infants: u32,

    /// Travel as walk-on (no vehicle)
    #[arg(long)]
    no_vehicle: bool,

    /// Seconds between availability checks (default from config)
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Monitoring ceiling in seconds (default from config)
    #[arg(long)]
    timeout: Option<u64>,
}

impl RouteArgs {
    fn into_request(self, config: &SailwatchConfig) -> PollRequest {
        PollRequest {
            departure: self.from,
            arrival: self.to,
            date: self.date,
            time: self.time,
            adults: self.adults,
            children: self.children,
            seniors: self.seniors,
            infants: self.infants,
            vehicle: !self.no_vehicle,
            poll_interval_secs: self
                .poll_interval
                .unwrap_or(config.monitor.poll_interval_secs),
            timeout_secs: self.timeout.unwrap_or(config.monitor.timeout_secs),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Watch a sailing until a slot opens, then exit
    Monitor {
        #[command(flatten)]
        route: RouteArgs,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,

        /// Only log warnings and the final outcome
        #[arg(long)]
        quiet: bool,
    },

    /// Run the booking steps right now, without monitoring first
    Book {
        #[command(flatten)]
        route: RouteArgs,
    },

    /// Monitor, then book the moment the slot opens
    MonitorAndBook {
        #[command(flatten)]
        route: RouteArgs,

        /// Detach and run in the background
        #[arg(long)]
        daemon: bool,

        /// Internal: this process is the detached child
        #[arg(long, hide = true)]
        daemon_child: bool,
    },

    /// Show the background run's state
    Status,

    /// Print the daemon log
    Logs {
        /// Keep streaming appended output
        #[arg(short, long)]
        follow: bool,

        /// Number of trailing lines to print first
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },

    /// Stop the background run
    Stop,
}

/// Stop channel flipped by Ctrl-C or SIGTERM. The poll loop observes it
/// between checks, so an in-flight request always finishes first.
fn stop_on_signals() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        let term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());
        match term {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("⏹ Interrupt received"),
                    _ = term.recv() => tracing::info!("⏹ Termination requested"),
                }
            }
            Err(e) => {
                tracing::warn!("⚠️ SIGTERM handler unavailable: {e}");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        tx.send(true).ok();
    });
    rx
}

fn exit_code_for(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<SailwatchError>() {
        Some(SailwatchError::Argument(_)) => 2,
        _ => 1,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match (&cli.command, cli.verbose) {
        (_, true) => "debug",
        (Command::Monitor { quiet: true, .. }, _) => "warn",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let code = match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("❌ {e}");
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

async fn run(command: Command) -> anyhow::Result<i32> {
    let config = SailwatchConfig::load()?;

    match command {
        Command::Monitor { route, json, .. } => {
            let req = route.into_request(&config);
            req.validate()?;

            let mut poller = AvailabilityPoller::new(ApiClient::new(config.api.clone()));
            let outcome = poller.wait_for_availability(&req, stop_on_signals()).await;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "available": outcome.available,
                        "checks": outcome.checks,
                        "elapsed_secs": outcome.elapsed.as_secs(),
                        "price": outcome.record.as_ref().and_then(|r| r.price.clone()),
                        "departure_time": outcome.record.as_ref().map(|r| r.departure_time.clone()),
                    }))?
                );
            } else if outcome.available {
                let price = outcome
                    .record
                    .as_ref()
                    .and_then(|r| r.price.as_deref())
                    .unwrap_or("n/a");
                println!(
                    "✅ {} → {} on {} at {} is available (price: {price})",
                    req.departure, req.arrival, req.date, req.time
                );
            } else {
                println!(
                    "⏳ Not available within {}s ({} checks)",
                    outcome.elapsed.as_secs(),
                    outcome.checks
                );
            }
            Ok(if outcome.available { 0 } else { 1 })
        }

        Command::Book { route } => {
            let req = route.into_request(&config);
            req.validate()?;
            if config.booking.runner_cmd.trim().is_empty() {
                return Err(SailwatchError::argument(
                    "no booking runner configured (set booking.runner_cmd or SAILWATCH_BOOKING_CMD)",
                )
                .into());
            }

            let mut automator = CommandAutomator::new(&config.booking, &req);
            match booking::run_all(&mut automator).await {
                None => {
                    println!("🎉 Booking completed");
                    Ok(0)
                }
                Some((step, result)) => {
                    println!("❌ Booking failed at [{step}]: {}", result.message);
                    Ok(1)
                }
            }
        }

        Command::MonitorAndBook {
            route,
            daemon,
            daemon_child,
        } => {
            let req = route.into_request(&config);
            req.validate()?;
            if config.booking.runner_cmd.trim().is_empty() {
                return Err(SailwatchError::argument(
                    "no booking runner configured (set booking.runner_cmd or SAILWATCH_BOOKING_CMD)",
                )
                .into());
            }

            let store = StateStore::with_defaults();
            let supervisor = DaemonSupervisor::new(store.clone());

            if daemon && !daemon_child {
                let pid = supervisor.start(&req)?;
                println!("🚀 Daemon started (pid {pid})");
                println!("   📄 State: {}", store.state_path().display());
                println!("   📜 Logs:  sailwatch logs -f");
                println!("   🛑 Stop:  sailwatch stop");
                return Ok(0);
            }

            // Foreground runs take the same exclusive pid-slot claim as
            // the daemon path. The detached child skips this: its
            // parent already holds the slot on its behalf, and the
            // workflow overwrites the record with the real owner pid.
            if !daemon_child {
                supervisor.claim_run_slot(std::process::id())?;
            }

            let runner = WorkflowRunner::new(store);
            let mut poller = AvailabilityPoller::new(ApiClient::new(config.api.clone()));
            let mut automator = CommandAutomator::new(&config.booking, &req);
            let state = runner
                .execute(&req, &mut poller, &mut automator, stop_on_signals())
                .await?;

            Ok(match state.status {
                WorkflowStatus::Completed => 0,
                WorkflowStatus::Stopped => 0,
                _ => 1,
            })
        }

        Command::Status => {
            let supervisor = DaemonSupervisor::new(StateStore::with_defaults());
            let status = supervisor.status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(0)
        }

        Command::Logs { follow, lines } => {
            let supervisor = DaemonSupervisor::new(StateStore::with_defaults());
            supervisor.logs(follow, lines)?;
            Ok(0)
        }

        Command::Stop => {
            let supervisor = DaemonSupervisor::new(StateStore::with_defaults());
            if supervisor.stop()? {
                println!("✅ Daemon stopped");
            } else {
                println!("No running daemon found");
            }
            Ok(0)
        }
    }
}

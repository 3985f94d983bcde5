//! Primus - launch coordinator for single-instance applications.
//!
//! Runs the coordination engine for an application name and reports what the
//! engine surfaces on stdout, one `KEY=value` line per event, for a wrapping
//! process to read. Logs go to stderr.
//!
//! The first launch stays running as the primary instance. Later launches
//! forward their arguments to it and exit once it has handled them.

use anyhow::Result;
use clap::Parser;
use primus_core::{
    AppIdentity, CommandKind, CoordinationEngine, EngineConfig, InstanceState, Notification,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "primus")]
#[command(about = "Coordinate launches of a single-instance application")]
struct Args {
    /// Application name used for the coordination identity
    #[arg(long, default_value = "primus")]
    app: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Ask the primary for the list of running instances once connected
    #[arg(long)]
    roster: bool,

    /// Arguments forwarded to the primary instance. `--replace`/`-r`,
    /// `--abort`/`-q`, `--no-server`, `--server-host` and `--server-port`
    /// are interpreted along the way.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    forward: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging; RUST_LOG overrides --debug
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = EngineConfig::from_env()?;
    let identity = AppIdentity::current(&args.app);
    info!("Starting {}", identity);

    let (mut engine, mut notes) = CoordinationEngine::new(identity, config)?;
    engine.initialize(&args.forward).await;

    let handle = engine.handle();
    if args.roster && !engine.is_standalone() {
        handle.request_roster()?;
    }

    let shutdown = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown.shutdown();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(note) = notes.recv().await {
            report(&note);
        }
    });

    let state = engine.run().await;
    // Dropping the engine closes the notification channel; wait until the
    // printer has written everything the engine emitted.
    drop(engine);
    if let Err(e) = printer.await {
        warn!("Notification printer failed: {}", e);
    }

    match state {
        InstanceState::Dead => {
            info!("Another instance handled this launch, exiting");
        }
        state => info!("Coordination stopped in state {}", state),
    }

    Ok(())
}

/// Print a notification for the wrapping process.
fn report(note: &Notification) {
    // Intentional stdout: this is the interface to the wrapping process.
    match note {
        Notification::Initialized { standalone } => println!("INITIALIZED={}", standalone),
        Notification::StateChanged(state) => println!("STATE={}", state),
        Notification::Raised { arguments } => println!("RAISED={:?}", arguments),
        Notification::Command(command) => match command.kind {
            CommandKind::IdentifyServer => println!("SERVER={}", command.id),
            CommandKind::Identify => println!("INSTANCE={}", command.id),
            CommandKind::Killed => println!("KILLED={}", command.id),
            kind => println!("COMMAND={} {}", kind, command.id),
        },
    }
}

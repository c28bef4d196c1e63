//! calltap CLI - runs the interception engine against a demo host.
//!
//! This is the main binary entry point. See the `calltap` library for the
//! engine itself.

mod demo;

use anyhow::Result;
use calltap::{Config, Engine};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Global flag for signal-triggered shutdown (as Arc for signal-hook compatibility)
static SHUTDOWN_FLAG: std::sync::LazyLock<Arc<AtomicBool>> =
    std::sync::LazyLock::new(|| Arc::new(AtomicBool::new(false)));

/// Runs the engine with the demo host until SIGINT/SIGTERM.
fn run_serve(port: Option<u16>, timeout_ms: Option<u64>, sampler: bool) -> Result<()> {
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    use signal_hook::flag;
    flag::register(SIGINT, Arc::clone(&SHUTDOWN_FLAG))?;
    flag::register(SIGTERM, Arc::clone(&SHUTDOWN_FLAG))?;

    let mut config = Config::load()?;
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(timeout_ms) = timeout_ms {
        config.interception_timeout_ms = timeout_ms;
    }
    if sampler {
        config.sampler.enabled = true;
    }

    let mut engine = Engine::start_with_probe(config, Arc::new(demo::DemoProbe))?;
    let host = demo::host();
    engine.install(host.as_ref());

    if let Some(addr) = engine.local_addr() {
        println!("calltap v{} listening on {addr}", env!("CARGO_PKG_VERSION"));
    }

    let driver = demo::spawn_driver(host, Arc::clone(&SHUTDOWN_FLAG))?;

    while !SHUTDOWN_FLAG.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    println!("Shutting down...");
    // Releases a driver call blocked on an interception before joining it.
    engine.shutdown();
    if driver.join().is_err() {
        log::error!("[Demo] Driver thread panicked");
    }

    Ok(())
}

// CLI
#[derive(Parser)]
#[command(name = "calltap")]
#[command(version)]
#[command(about = "Call interception engine with a loopback control channel")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against the built-in demo host
    Serve {
        /// Control channel port (overrides config and CALLTAP_PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Milliseconds an interception waits for a reply
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Publish periodic lifecycle messages
        #[arg(long)]
        sampler: bool,
    },
    /// Print the effective configuration as JSON
    Config,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            timeout_ms,
            sampler,
        } => {
            run_serve(port, timeout_ms, sampler)?;
        }
        Commands::Config => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

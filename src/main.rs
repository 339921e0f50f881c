//! remapd - remap keyboard, mouse and pad events on Linux
//!
//! Runs in the foreground until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use remapd::config::Config;
use remapd::event::{KEY_DOWN, KEY_REPEAT, RawEvent};
use remapd::{SessionHandle, device, session};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Time each session gets to tear down on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "remapd")]
#[command(version, about = "Remap input device events through a virtual uinput device", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/remapd/config.toml)
    #[arg(short = 'f', long)]
    config_file: Option<PathBuf>,

    /// List input devices and exit
    #[arg(short, long)]
    list_devices: bool,

    /// Print key events from DEVICE (path, event number, name or phys) until interrupted
    #[arg(short = 'e', long, value_name = "DEVICE")]
    read_events: Option<String>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("remapd={level},warn")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Route SIGINT/SIGTERM to `notify`
fn install_signal_handler() -> Result<Arc<Notify>> {
    let notify = Arc::new(Notify::new());
    let handler = notify.clone();
    ctrlc::set_handler(move || handler.notify_one()).context("Failed to install signal handler")?;
    Ok(notify)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.list_devices {
        list_devices();
        return Ok(());
    }

    let stop = install_signal_handler()?;

    if let Some(arg) = &args.read_events {
        return read_events(arg, &stop).await;
    }

    let config = Config::load(args.config_file.as_deref()).context("Failed to load configuration")?;
    if config.devices.is_empty() {
        warn!("No devices configured");
    }

    info!("remapd v{} starting", env!("CARGO_PKG_VERSION"));
    let mut sessions: Vec<SessionHandle> = Vec::new();
    for device_config in &config.devices {
        match session::start(device_config) {
            Ok(handle) => sessions.push(handle),
            Err(e) => error!("Skipping device {}: {e}", device_config.selector),
        }
    }
    info!("{} of {} devices registered", sessions.len(), config.devices.len());

    if let Some(command) = &config.run_shell_on_start {
        info!("Running start command: {command}");
        match Command::new("sh").arg("-c").arg(command).status() {
            Ok(status) if !status.success() => warn!("Start command exited with {status}"),
            Ok(_) => {}
            Err(e) => warn!("Failed to run start command: {e}"),
        }
    }

    stop.notified().await;
    info!("Shutting down...");
    for handle in sessions {
        if handle.is_finished() {
            info!("Session for {} had already ended", handle.label());
        } else {
            info!("Stopping {}", handle.label());
        }
        handle.shutdown(SHUTDOWN_GRACE).await;
    }
    info!("remapd stopped");
    Ok(())
}

fn list_devices() {
    let devices = device::list_input_devices();
    if devices.is_empty() {
        println!("No readable input devices found (are you in the 'input' group?)");
        return;
    }
    for dev in devices {
        println!("{:<20} {:<40} {}", dev.path.display(), dev.phys, dev.name);
    }
}

async fn read_events(arg: &str, stop: &Notify) -> Result<()> {
    let selector = device::resolve_device_arg(arg);
    let (path, input) = device::find_input(&selector)?;
    println!("Reading key events from {} ('{}'), Ctrl-C to stop", path.display(), input.name().unwrap_or_default());
    let mut stream = input
        .into_event_stream()
        .with_context(|| format!("Failed to read from {}", path.display()))?;

    loop {
        tokio::select! {
            _ = stop.notified() => return Ok(()),
            event = stream.next_event() => {
                let event = RawEvent::from(event.context("Failed to read input event")?);
                if event.code.is_key() && event.value != KEY_REPEAT {
                    let state = if event.value == KEY_DOWN { "down" } else { "up" };
                    let stamp = event.time.duration_since(UNIX_EPOCH).unwrap_or_default();
                    println!("{}.{:06} {:?} {state}", stamp.as_secs(), stamp.subsec_micros(), event.code);
                }
            }
        }
    }
}

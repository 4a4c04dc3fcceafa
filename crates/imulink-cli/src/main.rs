//! `imulink` – Wearable IMU Link CLI
//!
//! This binary is the operator's entry point for the sensor side of the
//! relay.  It:
//!
//! 1. Checks for `~/.imulink/config.toml`; runs a **First-Run Wizard** when
//!    the file is absent.
//! 2. Brings up the simulated radio, advertising every allow-listed address
//!    with a synthetic telemetry feed behind it.
//! 3. Drops the operator into the numbered **console menus** (scan and
//!    connect, start readings, stop, exit).
//! 4. Intercepts **Ctrl-C** to disconnect every device and exit cleanly.

mod config;
mod console;
mod demo;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use imulink_device::{SessionManager, SimRadio};
use imulink_hub::ProducerClient;
use tracing::warn;

#[tokio::main]
async fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // Initialise tracing-subscriber using RUST_LOG (defaults to "info").
    // Set IMULINK_LOG_FORMAT=json to emit newline-delimited JSON logs
    // suitable for log aggregators.  The console's operator-facing output
    // still uses println! for UX consistency.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("IMULINK_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!(
            "{}",
            "⚠  Ctrl-C received – disconnecting devices …".yellow().bold()
        );
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── First-Run Wizard ──────────────────────────────────────────────────
    match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(_)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
        }
    }

    let cfg = config::load().ok().flatten().unwrap_or_default();

    // ── Simulated radio ───────────────────────────────────────────────────
    // Every allow-listed address is advertised under the configured prefix
    // and fed by a synthetic telemetry task.
    let radio = SimRadio::new();
    for (seat, address) in cfg.allowed_addresses.iter().enumerate() {
        radio.advertise(address, &format!("{}-{}", cfg.name_prefix, seat + 1));
    }
    demo::spawn_feeds(&radio, &cfg.allowed_addresses);

    if cfg.allowed_addresses.is_empty() {
        println!(
            "  {}  Add addresses to {} to see devices.",
            "Allow-list is empty; scans will find nothing.".dimmed(),
            config::config_path().display().to_string().bold()
        );
    }

    println!(
        "  Relaying frames to {}\n",
        format!("ws://{}:{}/ble", cfg.hub_host, cfg.hub_port).bold()
    );

    // ── Operator console ──────────────────────────────────────────────────
    let mut manager = SessionManager::new(Arc::new(radio), cfg.to_link_config());
    let mut sink = console::EchoSink::new(ProducerClient::new(&cfg.hub_host, cfg.hub_port));
    let mut lines = console::spawn_input_thread();

    console::run(&mut manager, &mut sink, &mut lines, &shutdown).await;

    println!("{}", "Exited cleanly.".green());
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       imulink First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up imulink.\n");

    let mut cfg = config::Config::default();

    // Relay hub endpoint
    let host = prompt_line(
        &format!("  Relay hub host [{}]: ", cfg.hub_host),
        &cfg.hub_host,
    );
    cfg.hub_host = host.trim().to_string();

    let port_str = prompt_line(
        &format!("  Relay hub WebSocket port [{}]: ", cfg.hub_port),
        &cfg.hub_port.to_string(),
    );
    if let Ok(p) = port_str.trim().parse::<u16>() {
        cfg.hub_port = p;
    }

    // Device discovery
    let prefix = prompt_line(
        &format!("  Device name prefix [{}]: ", cfg.name_prefix),
        &cfg.name_prefix,
    );
    cfg.name_prefix = prefix.trim().to_string();

    let list = prompt_line(
        "  Device addresses to allow (comma-separated, blank for none): ",
        "",
    );
    cfg.allowed_addresses = list
        .split(',')
        .map(|a| a.trim().to_uppercase())
        .filter(|a| !a.is_empty())
        .collect();

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    _                 ___       __  "#.bold().cyan());
    println!("{}", r#"   (_)___ ___  __  __/ (_)___  / /__"#.bold().cyan());
    println!("{}", r#"  / / __ `__ \/ / / / / / __ \/ //_/"#.bold().cyan());
    println!("{}", r#" / / / / / / / /_/ / / / / / / ,<   "#.bold().cyan());
    println!("{}", r#"/_/_/ /_/ /_/\__,_/_/_/_/ /_/_/|_|  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "imulink".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Wearable IMU Telemetry Bridge");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}

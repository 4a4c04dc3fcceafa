//! Operator console – numbered menus driving the session manager.
//!
//! The menu offered depends on how many devices are active:
//!
//!   0 devices – scan and connect, or exit
//!   1 device  – scan for the second device, start readings, or exit
//!   2 devices – start readings, or exit
//!
//! Stdin is read on a dedicated OS thread feeding a line channel, so the
//! streaming loop keeps its cadence while the operator types.  During
//! streaming, entered choices are forwarded into a single-slot
//! last-writer-wins command cell (`1` stops streaming, `2` exits and
//! disconnects).

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;
use imulink_device::{FrameSink, SessionManager, StreamCommand, StreamEnd};
use imulink_types::LinkError;
use tokio::sync::{mpsc, watch};

/// How often menu prompts re-check the interrupt flag while waiting for
/// input.
const INPUT_POLL: Duration = Duration::from_millis(200);

// ─────────────────────────────────────────────────────────────────────────────
// Stdin plumbing
// ─────────────────────────────────────────────────────────────────────────────

/// Spawn the detached stdin reader thread.
///
/// Every line the operator enters is pushed into the returned channel.  The
/// thread ends when stdin closes or the console side goes away; it is never
/// joined, so a read blocked on a quiet terminal cannot stall process exit.
pub fn spawn_input_thread() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(line.trim().to_string()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

/// Wait for the next operator line, returning `None` on interrupt or when
/// stdin is gone.
async fn next_line(
    lines: &mut mpsc::UnboundedReceiver<String>,
    shutdown: &AtomicBool,
) -> Option<String> {
    loop {
        tokio::select! {
            line = lines.recv() => return line,
            _ = tokio::time::sleep(INPUT_POLL) => {
                if shutdown.load(Ordering::SeqCst) {
                    return None;
                }
            }
        }
    }
}

/// Forward streaming-phase choices into the command cell.
///
/// Keeps reading so a later choice overrides an earlier one before the
/// polling loop observes it.  Never completes; the caller races it against
/// the streaming loop and drops it when streaming returns.
async fn forward_commands(
    lines: &mut mpsc::UnboundedReceiver<String>,
    commands: &watch::Sender<StreamCommand>,
) {
    while let Some(line) = lines.recv().await {
        match line.trim() {
            "1" => {
                let _ = commands.send(StreamCommand::StopStreaming);
            }
            "2" => {
                let _ = commands.send(StreamCommand::ExitAndDisconnect);
            }
            _ => {}
        }
    }
    // Stdin is gone; streaming still ends via the interrupt flag.
    std::future::pending::<()>().await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame echo
// ─────────────────────────────────────────────────────────────────────────────

/// Sink decorator that prints every frame to the console before forwarding
/// it, so the operator sees exactly what the hub receives.
pub struct EchoSink<S> {
    inner: S,
}

impl<S> EchoSink<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: FrameSink> FrameSink for EchoSink<S> {
    async fn deliver(&mut self, frame: &str) -> Result<(), LinkError> {
        println!("{frame}");
        self.inner.deliver(frame).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Console loop
// ─────────────────────────────────────────────────────────────────────────────

/// Run the operator console until a terminal choice, interrupt, or stdin
/// EOF.  Every exit path leaves the active set disconnected.
pub async fn run<S: FrameSink>(
    manager: &mut SessionManager,
    sink: &mut S,
    lines: &mut mpsc::UnboundedReceiver<String>,
    shutdown: &AtomicBool,
) {
    let prefix = manager.config().name_prefix.clone();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            manager.disconnect_all().await;
            return;
        }

        match manager.active_count() {
            0 => print_menu_empty(&prefix),
            1 => print_menu_single(&prefix),
            _ => print_menu_full(),
        }

        let Some(choice) = next_line(lines, shutdown).await else {
            manager.disconnect_all().await;
            return;
        };

        match manager.active_count() {
            0 => match choice.as_str() {
                "1" => run_discover(manager, &prefix).await,
                "2" => {
                    manager.disconnect_all().await;
                    return;
                }
                other => unknown_choice(other),
            },
            1 => match choice.as_str() {
                "1" => run_discover(manager, &prefix).await,
                "2" => {
                    if streaming_flow(manager, sink, lines, shutdown).await {
                        return;
                    }
                }
                "3" => {
                    manager.disconnect_all().await;
                    return;
                }
                other => unknown_choice(other),
            },
            _ => match choice.as_str() {
                "1" => {
                    if streaming_flow(manager, sink, lines, shutdown).await {
                        return;
                    }
                }
                "2" => {
                    manager.disconnect_all().await;
                    return;
                }
                other => unknown_choice(other),
            },
        }
    }
}

async fn run_discover(manager: &mut SessionManager, prefix: &str) {
    match manager.discover_and_connect().await {
        Ok(0) => println!("No {prefix} device found."),
        Ok(n) => println!(
            "{} Connected {} device(s); {} active.",
            "✓".green().bold(),
            n,
            manager.active_count()
        ),
        Err(e) => println!("{}: {e}", "Scan failed".red()),
    }
}

/// One streaming round.  Returns `true` when the console should exit
/// (operator interrupt observed mid-stream).
async fn streaming_flow<S: FrameSink>(
    manager: &mut SessionManager,
    sink: &mut S,
    lines: &mut mpsc::UnboundedReceiver<String>,
    shutdown: &AtomicBool,
) -> bool {
    println!();
    println!("option {}: stop", "1".bold().cyan());
    println!("option {}: exit", "2".bold().cyan());
    println!("(Type your choice and press Enter)");
    println!();

    let (cmd_tx, cmd_rx) = watch::channel(StreamCommand::Run);
    let end = tokio::select! {
        end = manager.begin_streaming(sink, &cmd_rx, shutdown) => end,
        _ = forward_commands(lines, &cmd_tx) => Ok(StreamEnd::Interrupted),
    };

    match end {
        Ok(StreamEnd::Stopped) => {
            println!("{}", "Streaming stopped. Devices remain connected.".green());
            false
        }
        Ok(StreamEnd::Disconnected) => {
            println!("{}", "All devices disconnected.".green());
            false
        }
        Ok(StreamEnd::Interrupted) => true,
        Err(e) => {
            println!("{}: {e}", "Streaming failed".red());
            false
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Menus
// ─────────────────────────────────────────────────────────────────────────────

fn print_menu_empty(prefix: &str) {
    println!();
    println!("option {}: scan and connect {} devices", "1".bold().cyan(), prefix);
    println!("option {}: exit", "2".bold().cyan());
}

fn print_menu_single(prefix: &str) {
    println!();
    println!(
        "option {}: scan and connect to 2nd {} device",
        "1".bold().cyan(),
        prefix
    );
    println!("option {}: Start readings", "2".bold().cyan());
    println!("option {}: exit", "3".bold().cyan());
}

fn print_menu_full() {
    println!();
    println!("{}", "Both devices are connected".green());
    println!("option {}: Start readings", "1".bold().cyan());
    println!("option {}: exit", "2".bold().cyan());
}

fn unknown_choice(choice: &str) {
    println!(
        "{} '{}'. Type one of the listed options.",
        "Unknown option:".red(),
        choice.yellow()
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use imulink_device::{LinkConfig, SimRadio};
    use std::sync::{Arc, Mutex};

    const ADDR: &str = "00:18:80:72:47:91";

    fn make_config(addresses: &[&str]) -> LinkConfig {
        LinkConfig {
            allowed_addresses: addresses.iter().map(|a| a.to_string()).collect(),
            poll_interval: Duration::from_millis(10),
            scan_timeout: Duration::from_millis(10),
            ..LinkConfig::default()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        frames: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn deliver(&mut self, frame: &str) -> Result<(), LinkError> {
            self.frames.lock().unwrap().push(frame.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn echo_sink_forwards_frames() {
        let inner = RecordingSink::default();
        let frames = Arc::clone(&inner.frames);
        let mut sink = EchoSink::new(inner);

        sink.deliver("Data from AA (NU7-L):").await.unwrap();

        assert_eq!(frames.lock().unwrap().as_slice(), ["Data from AA (NU7-L):"]);
    }

    #[tokio::test]
    async fn forward_commands_applies_last_writer_wins() {
        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = watch::channel(StreamCommand::Run);
        line_tx.send("7".to_string()).unwrap();
        line_tx.send("1".to_string()).unwrap();
        line_tx.send("2".to_string()).unwrap();
        drop(line_tx);

        tokio::select! {
            _ = forward_commands(&mut line_rx, &cmd_tx) => {}
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }

        assert_eq!(*cmd_rx.borrow(), StreamCommand::ExitAndDisconnect);
    }

    #[tokio::test]
    async fn next_line_returns_none_on_shutdown() {
        let (_tx, mut rx) = mpsc::unbounded_channel::<String>();
        let shutdown = AtomicBool::new(true);

        assert!(next_line(&mut rx, &shutdown).await.is_none());
    }

    #[tokio::test]
    async fn console_connects_streams_and_exits() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        let mut manager =
            SessionManager::new(Arc::new(radio.clone()), make_config(&[ADDR]));
        let mut sink = RecordingSink::default();
        let shutdown = AtomicBool::new(false);

        let (tx, mut lines) = mpsc::unbounded_channel();
        tx.send("1".to_string()).unwrap(); // scan and connect
        tx.send("2".to_string()).unwrap(); // start readings
        tx.send("2".to_string()).unwrap(); // exit streaming, disconnect all
        drop(tx); // stdin gone, the empty menu then exits

        run(&mut manager, &mut sink, &mut lines, &shutdown).await;

        assert_eq!(manager.active_count(), 0);
        assert!(!radio.is_connected(ADDR));
        assert_eq!(radio.connect_attempts(ADDR), 1);
    }

    #[tokio::test]
    async fn console_reports_nothing_when_scan_is_empty() {
        let radio = SimRadio::new();
        let mut manager = SessionManager::new(Arc::new(radio), make_config(&[ADDR]));
        let mut sink = RecordingSink::default();
        let shutdown = AtomicBool::new(false);

        let (tx, mut lines) = mpsc::unbounded_channel();
        tx.send("1".to_string()).unwrap(); // scan finds nothing
        tx.send("2".to_string()).unwrap(); // exit
        drop(tx);

        run(&mut manager, &mut sink, &mut lines, &shutdown).await;

        assert_eq!(manager.active_count(), 0);
    }
}

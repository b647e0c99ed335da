//! unitransmit - bridge stdin/stdout to a transport
//!
//! Loads a TOML config, opens the configured link, sends every stdin line
//! with the link's delimiter and prints every received line to stdout.
//! Stops on Ctrl-C or when the link ends.

use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use unitransmit::{AppConfig, Error, Link, Result, Transport};

/// Parse config path from command line arguments.
///
/// Supports:
/// - `unitransmit <path>` (positional)
/// - `unitransmit --config <path>` (flag-based)
/// - `unitransmit -c <path>` (short flag)
///
/// Defaults to `unitransmit.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "unitransmit.toml".to_string()
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = AppConfig::from_file(&config_path)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("unitransmit v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", config_path);

    let link = Arc::new(Link::open(&config.link, None)?);

    let ctrlc_link = Arc::clone(&link);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        if let Err(e) = ctrlc_link.close() {
            log::warn!("Close failed: {}", e);
        }
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    // Stdin is never joined; it stays blocked on input until the process exits
    let stdin_link = Arc::clone(&link);
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        log::error!("stdin read failed: {}", e);
                        break;
                    }
                };
                if let Err(e) = stdin_link.write_text(&line) {
                    log::error!("Send failed: {}", e);
                    break;
                }
            }
            log::debug!("stdin closed");
        })
        .map_err(|e| Error::Other(format!("Failed to spawn stdin thread: {}", e)))?;

    let mut stdout = io::stdout();
    loop {
        let line = link.read_line();
        if !line.is_empty() {
            stdout.write_all(&line)?;
            stdout.flush()?;
        }
        if !link.state().is_open() && link.available() == 0 {
            break;
        }
    }

    log::info!("Link ended ({:?})", link.state());
    link.close()?;
    Ok(())
}

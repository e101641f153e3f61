//! termlink - A line-editing terminal client for remote sessions
//!
//! termlink attaches the local terminal to a command-execution session on a
//! terminal backend over WebSocket. Keystrokes are edited and echoed locally;
//! completed lines, signals and special keys are sent as structured frames,
//! and backend output is written back verbatim.
//!
//! # Quick Start
//!
//! ```text
//! termlink 42                                   # Session 42 on the configured origin
//! TERMLINK_BACKEND_HOST=10.0.0.5:8000 termlink 42
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | Enter | Send the current line |
//! | Ctrl+C | Interrupt (SIGINT) |
//! | Ctrl+D | End of input |
//! | Up/Down | Command history |
//! | Ctrl+] | Quit |
//! | F5 | Reconnect |
//! | F12 | Clear screen |

mod core;
mod ui;
mod history;
mod config;

use std::env;
use std::fs::OpenOptions;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{Config, HOST_ENV};
use crate::core::session::{DisplaySurface, SessionOptions, TerminalSession};
use crate::core::transport::{Connector, SessionTransport};
use crate::core::ws::WsConnector;
use crate::ui::{Console, KeyMapper};

type Session = TerminalSession<Console, WsConnector>;

/// Command line arguments
#[derive(Debug, PartialEq)]
struct Args {
    assessment_id: String,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("termlink {}", VERSION);
}

fn print_help() {
    eprintln!("termlink {} - A line-editing terminal client for remote sessions", VERSION);
    eprintln!();
    eprintln!("Usage: termlink [OPTIONS] <ASSESSMENT_ID>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  Enter                 Send the current line");
    eprintln!("  Ctrl+C                Interrupt the running command");
    eprintln!("  Ctrl+D                Send end of input");
    eprintln!("  Up/Down               Browse command history");
    eprintln!("  Ctrl+]                Quit");
    eprintln!("  F5                    Reconnect");
    eprintln!("  F12                   Clear screen");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  {:<21} Backend host override (host[:port])", HOST_ENV);
    eprintln!("  RUST_LOG              Log filter");
    eprintln!();
    eprintln!("Configuration: ~/.termlink/config.toml");
    eprintln!("Log file:      ~/.termlink/termlink.log");
}

/// Action requested on the command line
#[derive(Debug, PartialEq)]
enum Command {
    Run(Args),
    Help,
    Version,
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut assessment_id = None;

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
            arg => {
                if assessment_id.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                assessment_id = Some(arg.to_string());
            }
        }
    }

    assessment_id
        .map(|assessment_id| Command::Run(Args { assessment_id }))
        .ok_or_else(|| "Missing ASSESSMENT_ID".to_string())
}

/// Log to a file so nothing lands in the session's terminal
fn init_logging(config: &Config) {
    let Some(dir) = Config::data_dir() else {
        return;
    };
    let log_path = dir.join("termlink.log");

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let args = match parse_args(&args) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Command::Version) => {
            print_version();
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let config = Config::load();
    init_logging(&config);
    info!("termlink {} starting...", VERSION);

    let origin = config
        .origin_url()
        .with_context(|| format!("invalid origin {:?}", config.origin))?;
    let transport = SessionTransport::new(WsConnector::default(), origin, config.backend_host.clone());
    let mut session: Session = TerminalSession::new(
        transport,
        SessionOptions {
            history_limit: config.history_limit,
            forward_history_keys: config.forward_history_keys,
            banner: config.banner,
        },
    );

    let mut console = Console::new();
    console.init().context("failed to enable raw mode")?;
    session.start(&args.assessment_id, console);

    let result = run_main_loop(&mut session);

    if let Some(mut console) = session.stop() {
        console.cleanup()?;
    }
    info!("termlink exiting");
    result
}

/// Local hotkeys handled before input reaches the session
enum Hotkey {
    Quit,
    Reconnect,
    Clear,
}

fn hotkey(key: &KeyEvent) -> Option<Hotkey> {
    match key.code {
        // Unix terminals report Ctrl+] (0x1D) as Ctrl+5
        KeyCode::Char(']' | '5') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Hotkey::Quit)
        }
        KeyCode::F(5) => Some(Hotkey::Reconnect),
        KeyCode::F(12) => Some(Hotkey::Clear),
        _ => None,
    }
}

/// Main event loop
fn run_main_loop(session: &mut Session) -> anyhow::Result<()> {
    let poll_timeout = Duration::from_millis(10);
    let mut title = String::new();

    loop {
        session.poll();
        update_title(session, &mut title);

        if !event::poll(poll_timeout)? {
            continue;
        }

        if !dispatch(session, event::read()?) {
            info!("Quit requested");
            break;
        }
    }

    Ok(())
}

/// Route one terminal event to the session. Returns `false` to quit.
fn dispatch<S: DisplaySurface, C: Connector>(session: &mut TerminalSession<S, C>, event: Event) -> bool {
    match event {
        Event::Key(key_event) => {
            // Only process key press events
            if key_event.kind != KeyEventKind::Press {
                return true;
            }

            match hotkey(&key_event) {
                Some(Hotkey::Quit) => return false,
                Some(Hotkey::Reconnect) => session.restart(),
                Some(Hotkey::Clear) => session.clear_screen(),
                None => {
                    if let Some(bytes) = KeyMapper::map(&key_event) {
                        session.handle_input(&bytes);
                    }
                }
            }
        }

        // Bracketed paste delivers the whole text at once
        Event::Paste(text) => session.handle_input(text.as_bytes()),

        Event::Resize(cols, rows) => {
            debug!("Resize: {}x{}", cols, rows);
            session.resize(cols, rows);
        }

        _ => {}
    }
    true
}

/// Reflect the connection status and remote path in the window title
fn update_title(session: &mut Session, current: &mut String) {
    let mut title = format!(
        "termlink {} [{}]",
        session.assessment_id().unwrap_or_default(),
        session.status().label()
    );
    if let Some(path) = session.remote_path() {
        title.push_str(" - ");
        title.push_str(path);
    }

    if title != *current {
        if let Some(console) = session.surface_mut() {
            console.set_title(&title);
        }
        *current = title;
    }
}

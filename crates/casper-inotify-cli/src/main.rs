//! casper-inotify — filesystem event supervisor daemon.
//!
//! Loads the watch rules, opens the event log, installs the shutdown
//! flag, and hands control to the dispatch engine. The engine itself
//! installs no signal handlers; SIGINT/SIGTERM set a flag the loop
//! polls.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;

use casper_inotify_core::{load_config, open_log_file, syslog, Engine, LogLevel, LogSink};

/// Watch files and directories, spawn commands on filesystem events.
#[derive(Parser)]
#[command(name = "casper-inotify", version, about, long_about = None)]
struct Cli {
    /// Configuration file (JSON).
    #[arg(short, long, default_value = "/etc/casper-inotify/conf.json")]
    config: PathBuf,

    /// Event log file; stdout when omitted.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Event log threshold: info, warning, error, event or debug.
    #[arg(long, default_value = "event")]
    log_level: LogLevel,

    /// Enable verbose diagnostics on stderr (repeat for more: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    syslog::open();
    syslog::notice(&format!(
        "starting service (version {})",
        env!("CARGO_PKG_VERSION")
    ));

    let result = run(&cli);
    if let Err(e) = &result {
        syslog::error(&format!("{e}"));
    }

    syslog::notice("stopping service");
    syslog::close();
    result
}

fn run(cli: &Cli) -> Result<()> {
    let sink = match &cli.log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            LogSink::new(Box::new(file) as Box<dyn std::io::Write>, cli.log_level)
        }
        None => LogSink::new(
            Box::new(std::io::stdout()) as Box<dyn std::io::Write>,
            cli.log_level,
        ),
    };

    let cfg = load_config(&cli.config)?;
    let mut engine = Engine::new(sink)?;
    engine.load(&cfg)?;
    tracing::info!(
        config = %cli.config.display(),
        rules = engine.table().len(),
        "configuration loaded"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [
        signal_hook::consts::SIGINT,
        signal_hook::consts::SIGTERM,
    ] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))?;
    }

    engine.watch(&shutdown)?;
    Ok(())
}

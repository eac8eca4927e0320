//! immortal Watchdog Process
//!
//! Started by a protected application (and by nothing else). Watches the
//! process that started it and restarts it when its heartbeats stop.
//!
//! Usage:
//!   watchdog <interval-secs> <max-misses> <application argv...>
//!
//! The watchdog will:
//! 1. Publish its pid under `IMMORTAL_WD_PID` for the applications it starts
//! 2. Heartbeat the parent application with SIGUSR1
//! 3. Restart the application after <max-misses> silent intervals
//! 4. Exit on SIGUSR2
//!
//! Exit status: 0 after a shutdown request, 1 on a fatal error, 2 on a usage
//! error.

use anyhow::Context;

use immortal::core::ProtocolConfig;
use immortal::logging::{LoggingConfig, LoggingSystem};
use immortal::watchdog::discovery::{publish_pid, DiscoveryChannel, EnvDiscovery};
use immortal::watchdog::{signals, CommandLine, NixSignaller, PeerSignaller, Role, SessionReport, Supervisor};

const EXIT_FATAL: i32 = 1;
const EXIT_USAGE: i32 = 2;

/// Command line arguments
#[derive(Debug)]
struct Args {
    /// Heartbeat and check interval
    interval_secs: u64,
    /// Silent intervals tolerated before a restart
    max_misses: u32,
    /// Command line that restarts the application
    app_argv: Vec<String>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let interval = args.next().ok_or("missing <interval-secs>")?;
        if interval == "--help" || interval == "-h" {
            print_help();
            std::process::exit(0);
        }

        let interval_secs: u64 = interval
            .parse()
            .map_err(|_| format!("Invalid interval: {}", interval))?;
        let max_misses: u32 = args
            .next()
            .ok_or("missing <max-misses>")?
            .parse()
            .map_err(|_| "Invalid max-misses value")?;
        let app_argv: Vec<String> = args.collect();

        if interval_secs == 0 || max_misses == 0 {
            return Err("interval and max-misses must be greater than zero".to_string());
        }
        if app_argv.is_empty() {
            return Err("missing application command line".to_string());
        }

        Ok(Self {
            interval_secs,
            max_misses,
            app_argv,
        })
    }
}

fn print_help() {
    println!(
        r#"immortal watchdog - mutual liveness supervisor

USAGE:
    watchdog <INTERVAL_SECS> <MAX_MISSES> <APPLICATION ARGV...>

DESCRIPTION:
    Normally started by an application that protects itself with the
    immortal library; running it by hand is only useful for debugging.

    The watchdog heartbeats its parent process with SIGUSR1 every
    INTERVAL_SECS seconds and expects the same in return. After MAX_MISSES
    consecutive intervals without a heartbeat it restarts the application
    from APPLICATION ARGV. SIGUSR2 shuts it down.

ENVIRONMENT:
    IMMORTAL_LOG    Log level (trace, debug, info, warn, error)
"#
    );
}

fn run_watchdog(args: Args) -> anyhow::Result<SessionReport> {
    let config = ProtocolConfig::from_env()
        .context("reading protocol configuration")?
        .with_interval_secs(args.interval_secs)
        .with_max_misses(args.max_misses);
    config.validate()?;

    let command = CommandLine::for_application(&args.app_argv)?;
    let parent = NixSignaller.parent_pid();

    // Still single-threaded: the environment is safe to write.
    let discovery = EnvDiscovery;
    publish_pid(&discovery, &config.discovery_var, std::process::id());

    tracing::info!(
        pid = std::process::id(),
        parent,
        interval_secs = config.interval_secs,
        max_misses = config.max_misses,
        "Watchdog starting for: {}",
        command
    );

    let result = signals::install_handlers()
        .and_then(|()| signals::unblock_protocol_signals())
        .and_then(|()| {
            Supervisor::from_config(Role::Watchdog, &config, command)
                .with_peer(parent)
                .run()
        });

    discovery.retract(&config.discovery_var);
    result.context("watchdog side failed")
}

fn main() {
    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(EXIT_USAGE);
        }
    };

    let logging_config = LoggingConfig::default().with_process_env();
    let _logging_system = match LoggingSystem::init(logging_config) {
        Ok(system) => Some(system),
        Err(e) => {
            eprintln!("Failed to initialize logging system: {}", e);
            None
        }
    };

    match run_watchdog(args) {
        Ok(report) => {
            tracing::info!(revivals = report.revivals, "Watchdog shut down");
        }
        Err(e) => {
            tracing::error!("Watchdog failed: {:#}", e);
            std::process::exit(EXIT_FATAL);
        }
    }
}

//! immortal demo
//!
//! A small protected application: it makes itself immortal, works for a
//! while, then releases its watchdog and exits. Kill it (SIGKILL) while it
//! works and the watchdog starts it again.
//!
//! The calling thread blocks all signals while protected, so SIGINT and
//! SIGTERM stay pending until the work is done.
//!
//! Environment:
//!   IMMORTAL_DEMO_SECS   how long to work (default 30)
//!   IMMORTAL_INTERVAL    heartbeat interval in seconds (default 1)
//!   IMMORTAL_MAX_MISSES  silent intervals before a restart (default 3)
//!   IMMORTAL_LOG         log level

use std::time::Duration;

use anyhow::Context;

use immortal::core::ProtocolConfig;
use immortal::logging::{LoggingConfig, LoggingSystem};
use immortal::watchdog::Immortal;

fn work_duration() -> anyhow::Result<u64> {
    match std::env::var("IMMORTAL_DEMO_SECS") {
        Ok(value) => value
            .parse()
            .with_context(|| format!("IMMORTAL_DEMO_SECS is not a number: {:?}", value)),
        Err(_) => Ok(30),
    }
}

fn main() -> anyhow::Result<()> {
    let logging_config = if cfg!(debug_assertions) {
        LoggingConfig::development()
    } else {
        LoggingConfig::default()
    };
    let _logging_system = LoggingSystem::init(logging_config.with_process_env())
        .context("initializing logging")?;

    let argv: Vec<String> = std::env::args().collect();
    let work_secs = work_duration()?;
    let config = ProtocolConfig::from_env().context("reading protocol configuration")?;

    let protection = Immortal::new(config);
    protection.protect(&argv).context("becoming immortal")?;

    for second in 1..=work_secs {
        std::thread::sleep(Duration::from_secs(1));
        tracing::info!(pid = std::process::id(), "Working ({}/{})", second, work_secs);
    }

    protection.release().context("releasing the watchdog")?;
    tracing::info!("Done");
    Ok(())
}

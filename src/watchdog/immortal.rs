//! Public entry points
//!
//! [`become_immortal`] starts a supervisor thread inside the calling process
//! and returns once a watchdog process has been confirmed alive.
//! [`do_not_resuscitate`] shuts both sides down again.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use lazy_static::lazy_static;
use parking_lot::Mutex;

use super::process::{CommandLine, GroupSignaller, PeerLauncher, ProcessGroupSignaller};
use super::semaphore::{Latch, Semaphore};
use super::signals;
use super::supervisor::{Role, SessionReport, Supervisor};
use crate::core::config::ProtocolConfig;
use crate::core::error::{ImmortalError, Result};

/// Set while a session is active in this process
static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

lazy_static! {
    /// Posted by the supervisor thread after its scheduler loop exited
    static ref SHUTDOWN_DONE: Semaphore = Semaphore::new(0);
}

/// Protection for the current process, parameterised by a [`ProtocolConfig`]
pub struct Immortal {
    config: ProtocolConfig,
    launcher: Mutex<Option<Box<dyn PeerLauncher>>>,
    group: Arc<dyn GroupSignaller>,
}

impl Immortal {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            config,
            launcher: Mutex::new(None),
            group: Arc::new(ProcessGroupSignaller),
        }
    }

    /// Start the watchdog through `launcher` instead of spawning a child.
    /// Taken by the next call to [`protect`](Self::protect).
    pub fn with_launcher(self, launcher: impl PeerLauncher + 'static) -> Self {
        *self.launcher.lock() = Some(Box::new(launcher));
        self
    }

    /// Deliver the shutdown request through `group` on release
    pub fn with_group_signaller(mut self, group: Arc<dyn GroupSignaller>) -> Self {
        self.group = group;
        self
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Protect the current process; see [`become_immortal`].
    ///
    /// `argv` is the command line that restarts this process; element 0 is
    /// the program.
    pub fn protect(&self, argv: &[String]) -> Result<()> {
        self.config.validate()?;

        if SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ImmortalError::AlreadyImmortal);
        }

        let started = self.start_session(argv);
        if started.is_err() {
            SESSION_ACTIVE.store(false, Ordering::SeqCst);
        }
        started
    }

    /// End protection; see [`do_not_resuscitate`]
    pub fn release(&self) -> Result<()> {
        release_session(self.group.as_ref())
    }

    fn start_session(&self, argv: &[String]) -> Result<()> {
        let watchdog = self.config.resolve_watchdog_binary();
        let command = CommandLine::for_watchdog(
            &watchdog,
            self.config.interval_secs,
            self.config.max_misses,
            argv,
        )?;

        // Threads started from here on, the supervisor included, inherit
        // the full mask.
        signals::block_all_signals()?;

        SHUTDOWN_DONE.reset();
        let connected = Arc::new(Latch::new());
        let failure: Arc<Mutex<Option<ImmortalError>>> = Arc::new(Mutex::new(None));

        let mut supervisor = Supervisor::from_config(Role::Application, &self.config, command)
            .with_connected(Arc::clone(&connected));
        if let Some(launcher) = self.launcher.lock().take() {
            supervisor = supervisor.with_launcher(launcher);
        }
        let thread_connected = Arc::clone(&connected);
        let thread_failure = Arc::clone(&failure);

        thread::Builder::new()
            .name("immortal-supervisor".to_string())
            .spawn(move || supervise(supervisor, thread_connected, thread_failure))
            .map_err(ImmortalError::ThreadSpawn)?;

        match connected.wait() {
            Ok(()) => {
                tracing::info!(pid = std::process::id(), "Process is now protected");
                Ok(())
            }
            Err(e) => Err(failure
                .lock()
                .take()
                .unwrap_or_else(|| ImmortalError::SemaphoreWait(e.to_string()))),
        }
    }
}

impl Default for Immortal {
    fn default() -> Self {
        Self::new(ProtocolConfig::default())
    }
}

impl fmt::Debug for Immortal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Immortal").field("config", &self.config).finish_non_exhaustive()
    }
}

/// How a supervisor loop ended, as seen by the protected process
#[derive(Debug)]
enum SessionEnd {
    Released(SessionReport),
    /// Never connected; the error goes back to the caller of `protect`
    FailedBeforeConnect(ImmortalError),
    /// Was connected; the process can no longer be protected
    LostProtection(ImmortalError),
}

fn session_end(outcome: Result<SessionReport>, was_connected: bool) -> SessionEnd {
    match outcome {
        Ok(report) => SessionEnd::Released(report),
        Err(e) if was_connected => SessionEnd::LostProtection(e),
        Err(e) => SessionEnd::FailedBeforeConnect(e),
    }
}

/// Body of the detached supervisor thread
fn supervise(
    supervisor: Supervisor,
    connected: Arc<Latch>,
    failure: Arc<Mutex<Option<ImmortalError>>>,
) {
    // Handlers first: a signal unblocked without one would terminate the
    // process.
    let setup = signals::install_handlers().and_then(|()| signals::unblock_protocol_signals());
    if let Err(e) = setup {
        tracing::error!("Supervisor setup failed: {}", e);
        *failure.lock() = Some(e);
        connected.abandon();
        SHUTDOWN_DONE.post();
        return;
    }

    let outcome = supervisor.run();
    match session_end(outcome, connected.is_open()) {
        SessionEnd::Released(report) => {
            tracing::debug!(?report, "Supervisor finished");
        }
        SessionEnd::LostProtection(e) => {
            tracing::error!("Lost the ability to protect this process: {}", e);
            std::process::abort();
        }
        SessionEnd::FailedBeforeConnect(e) => {
            *failure.lock() = Some(e);
        }
    }

    // A loop that ended without connecting leaves the caller waiting.
    connected.abandon();
    SHUTDOWN_DONE.post();
}

/// Protect the calling process with a watchdog.
///
/// Blocks every signal on the calling thread, launches the watchdog
/// executable as `<watchdog> <interval_secs> <max_misses> <argv...>` and
/// returns once the watchdog is confirmed alive. From then on each side
/// revives the other after `max_misses` consecutive silent intervals.
///
/// Other parameters come from [`ProtocolConfig::from_env`].
pub fn become_immortal(argv: &[String], interval_secs: u64, max_misses: u32) -> Result<()> {
    let config = ProtocolConfig::from_env()?
        .with_interval_secs(interval_secs)
        .with_max_misses(max_misses);
    Immortal::new(config).protect(argv)
}

/// Stop protecting the calling process.
///
/// Sends the shutdown signal to the whole process group, which reaches both
/// the in-process supervisor and the watchdog, and waits for the supervisor
/// loop to exit.
pub fn do_not_resuscitate() -> Result<()> {
    release_session(&ProcessGroupSignaller)
}

fn release_session(group: &dyn GroupSignaller) -> Result<()> {
    if !SESSION_ACTIVE.load(Ordering::SeqCst) {
        return Err(ImmortalError::NotImmortal);
    }

    group.broadcast_shutdown()?;

    SHUTDOWN_DONE
        .wait()
        .map_err(|e| ImmortalError::SemaphoreWait(e.to_string()))?;
    SHUTDOWN_DONE.reset();
    SESSION_ACTIVE.store(false, Ordering::SeqCst);

    tracing::info!("Protection released");
    Ok(())
}

/// Whether this process currently runs a protection session
pub fn is_immortal() -> bool {
    SESSION_ACTIVE.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::RunStatus;
    use serial_test::serial;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn argv() -> Vec<String> {
        vec!["./protected".to_string()]
    }

    /// Stands in for the watchdog executable by naming this very process
    /// as the peer, so the liveness probe and heartbeats reach a real pid.
    #[derive(Clone, Default)]
    struct SelfLauncher {
        fail: bool,
        launches: Arc<AtomicUsize>,
        collects: Arc<AtomicUsize>,
    }

    impl PeerLauncher for SelfLauncher {
        fn replace_peer_process(&mut self, command: &CommandLine) -> Result<u32> {
            if self.fail {
                return Err(ImmortalError::Revival {
                    program: command.program().to_path_buf(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(std::process::id())
        }

        fn collect_peers(&mut self, _grace: Duration) -> bool {
            self.collects.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    /// Raises the stop flag the way the delivered shutdown signal would
    #[derive(Default)]
    struct InProcessShutdown {
        sent: AtomicUsize,
    }

    impl GroupSignaller for InProcessShutdown {
        fn broadcast_shutdown(&self) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            signals::FLAGS.request_stop();
            Ok(())
        }
    }

    fn quick_config() -> ProtocolConfig {
        ProtocolConfig::new(1, 3)
            .with_connect_probe_ms(10)
            .with_discovery_var("IMMORTAL_TEST_WD_PID")
    }

    #[test]
    #[serial]
    fn test_zero_parameters_are_rejected_before_anything_starts() {
        let result = Immortal::new(ProtocolConfig::new(0, 3)).protect(&argv());
        assert!(matches!(result, Err(ImmortalError::InvalidConfig(_))));

        let result = Immortal::new(ProtocolConfig::new(1, 0)).protect(&argv());
        assert!(matches!(result, Err(ImmortalError::InvalidConfig(_))));

        assert!(!is_immortal());
    }

    #[test]
    #[serial]
    fn test_empty_argv_is_rejected() {
        let result = Immortal::new(ProtocolConfig::default()).protect(&[]);
        assert!(matches!(result, Err(ImmortalError::CommandLine(_))));
        assert!(!is_immortal());
    }

    #[test]
    #[serial]
    fn test_release_without_session() {
        assert!(matches!(do_not_resuscitate(), Err(ImmortalError::NotImmortal)));
    }

    #[test]
    #[serial]
    fn test_protect_then_release() {
        let launcher = SelfLauncher::default();
        let group = Arc::new(InProcessShutdown::default());
        let protection = Immortal::new(quick_config())
            .with_launcher(launcher.clone())
            .with_group_signaller(group.clone());

        protection.protect(&argv()).unwrap();
        assert!(is_immortal());
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        assert!(matches!(
            Immortal::default().protect(&argv()),
            Err(ImmortalError::AlreadyImmortal)
        ));

        protection.release().unwrap();
        assert_eq!(group.sent.load(Ordering::SeqCst), 1);
        assert!(!is_immortal());
        // Both happen only after the supervisor loop has exited.
        assert_eq!(launcher.collects.load(Ordering::SeqCst), 1);
        assert!(!signals::FLAGS.stop_requested());

        assert!(matches!(protection.release(), Err(ImmortalError::NotImmortal)));
    }

    #[test]
    #[serial]
    fn test_failed_first_launch_is_returned_to_caller() {
        let launcher = SelfLauncher {
            fail: true,
            ..Default::default()
        };
        let protection = Immortal::new(quick_config()).with_launcher(launcher.clone());

        let result = protection.protect(&argv());
        assert!(matches!(result, Err(ImmortalError::Revival { .. })));
        assert!(!is_immortal());
        assert_eq!(launcher.collects.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_after_connecting_is_fatal() {
        let failure = || -> Result<SessionReport> {
            Err(ImmortalError::Revival {
                program: "watchdog".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        };

        assert!(matches!(session_end(failure(), true), SessionEnd::LostProtection(_)));
        assert!(matches!(session_end(failure(), false), SessionEnd::FailedBeforeConnect(_)));

        let report = SessionReport {
            role: Role::Application,
            status: RunStatus::Stopped,
            revivals: 0,
            heartbeats_sent: 3,
            heartbeats_failed: 0,
            last_peer: 42,
        };
        assert!(matches!(session_end(Ok(report), true), SessionEnd::Released(_)));
    }

    #[test]
    #[serial]
    fn test_second_session_is_refused() {
        SESSION_ACTIVE.store(true, Ordering::SeqCst);
        let result = Immortal::new(ProtocolConfig::default()).protect(&argv());
        SESSION_ACTIVE.store(false, Ordering::SeqCst);

        assert!(matches!(result, Err(ImmortalError::AlreadyImmortal)));
    }
}

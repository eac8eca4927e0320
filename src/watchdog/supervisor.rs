//! Watchdog Supervisor Module
//!
//! One side of a protected pair. Both the in-process supervisor thread and
//! the watchdog executable run the same code; only the [`Role`] and the
//! initial peer differ.
//!
//! A side runs a private [`Scheduler`] with these tasks:
//! - send-heartbeat: signal the peer once per interval
//! - check-peer: count missed heartbeats and revive the peer when it has
//!   been silent for `max_misses` checks
//! - confirm-connected (application side only): open the connected latch
//!   once the first peer answers a liveness probe

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::discovery::{published_pid, DiscoveryChannel, EnvDiscovery};
use super::heartbeat::HeartbeatSender;
use super::process::{CommandLine, ForkExecLauncher, NixSignaller, PeerLauncher, PeerSignaller};
use super::semaphore::Latch;
use super::signals::{ProtocolFlags, FLAGS};
use crate::core::config::{ProtocolConfig, DISCOVERY_VAR};
use crate::core::error::{ImmortalError, Result};
use crate::scheduler::{RunStatus, Scheduler, TaskId, TaskOutcome};

/// Which process of the pair a side runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The protected application
    Application,
    /// The watchdog executable
    Watchdog,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Application => write!(f, "application"),
            Role::Watchdog => write!(f, "watchdog"),
        }
    }
}

/// Result of one check-peer tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckVerdict {
    /// A shutdown was requested; the side must stop
    Stop,
    /// Peer known; `misses` consecutive checks without a heartbeat so far
    Healthy { misses: usize },
    /// Found the watchdog that spawned this process
    Adopted(u32),
    /// Launched a replacement peer
    Revived(u32),
    /// The replacement could not be launched; the side must stop
    RevivalFailed,
}

impl CheckVerdict {
    pub fn must_stop(&self) -> bool {
        matches!(self, CheckVerdict::Stop | CheckVerdict::RevivalFailed)
    }
}

/// Supervision state of one side, shared by its task closures
pub struct Side {
    role: Role,
    max_misses: usize,
    flags: &'static ProtocolFlags,
    peer_pid: AtomicU32,
    /// The current peer has been known for a full interval
    armed: AtomicBool,
    /// The current peer was launched by this side
    own_peer: AtomicBool,
    peer_command: CommandLine,
    launcher: Mutex<Box<dyn PeerLauncher>>,
    signaller: Arc<dyn PeerSignaller>,
    discovery: Arc<dyn DiscoveryChannel>,
    discovery_var: String,
    heartbeat: HeartbeatSender,
    connected: Arc<Latch>,
    failure: Mutex<Option<ImmortalError>>,
    revivals: AtomicU64,
}

impl Side {
    /// One send-heartbeat tick
    pub fn send_heartbeat(&self) -> bool {
        self.heartbeat.tick(self.peer_pid())
    }

    /// One check-peer tick. Launches at most one replacement.
    pub fn check_peer(&self) -> CheckVerdict {
        if self.flags.stop_requested() {
            tracing::info!(role = %self.role, "Shutdown requested, stopping");
            return CheckVerdict::Stop;
        }

        if self.peer_pid() == 0 {
            if let Some(pid) = self.discover_spawning_watchdog() {
                self.set_peer(pid, false);
                self.connected.open();
                tracing::info!(role = %self.role, peer = pid, "Already connected to the watchdog that started us");
                return CheckVerdict::Adopted(pid);
            }
            return self.revive();
        }

        // A new peer sends its first heartbeat up to one interval after it
        // became known, so the first check only starts the count.
        if !self.armed.swap(true, Ordering::SeqCst) {
            self.flags.reset_misses();
            return CheckVerdict::Healthy { misses: 0 };
        }

        let misses = self.flags.record_check();
        if misses >= self.max_misses {
            tracing::warn!(
                role = %self.role,
                peer = self.peer_pid(),
                "Peer missed {} heartbeats, reviving",
                misses
            );
            return self.revive();
        }
        if misses > 0 {
            tracing::debug!(role = %self.role, peer = self.peer_pid(), misses, "Heartbeat missed");
        }
        CheckVerdict::Healthy { misses }
    }

    /// One confirm-connected tick; true once the peer answered
    pub fn confirm_connected(&self) -> bool {
        let peer = self.peer_pid();
        if peer == 0 || !self.signaller.is_alive(peer) {
            return false;
        }
        if self.connected.open() {
            tracing::info!(role = %self.role, peer, "Connected to peer");
        }
        true
    }

    /// A published watchdog pid counts only if it is our parent
    fn discover_spawning_watchdog(&self) -> Option<u32> {
        let published = published_pid(self.discovery.as_ref(), &self.discovery_var)?;
        let parent = self.signaller.parent_pid();
        if published == parent {
            Some(published)
        } else {
            tracing::debug!(published, parent, "Published watchdog is not our parent");
            None
        }
    }

    fn revive(&self) -> CheckVerdict {
        self.retire_previous_peer();

        let launched = self.launcher.lock().replace_peer_process(&self.peer_command);
        match launched {
            Ok(pid) => {
                self.set_peer(pid, true);
                let count = self.revivals.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::info!(role = %self.role, peer = pid, revivals = count, "Peer revived");
                CheckVerdict::Revived(pid)
            }
            Err(e) => {
                tracing::error!(role = %self.role, "Failed to revive peer: {}", e);
                *self.failure.lock() = Some(e);
                CheckVerdict::RevivalFailed
            }
        }
    }

    /// A replaced peer this side launched may still be running, stopped or
    /// wedged. Ask it to stand down so it does not supervise alongside its
    /// replacement. Until reaped, its pid cannot be reused.
    fn retire_previous_peer(&self) {
        let previous = self.peer_pid();
        if previous == 0 || !self.own_peer.load(Ordering::SeqCst) || !self.signaller.is_alive(previous) {
            return;
        }

        tracing::debug!(role = %self.role, peer = previous, "Asking replaced peer to stand down");
        if let Err(e) = self.signaller.send_shutdown(previous) {
            tracing::debug!(role = %self.role, peer = previous, "Stand-down not delivered: {}", e);
        }
    }

    fn set_peer(&self, pid: u32, launched: bool) {
        self.peer_pid.store(pid, Ordering::SeqCst);
        self.own_peer.store(launched, Ordering::SeqCst);
        self.armed.store(false, Ordering::SeqCst);
        self.flags.reset_misses();
    }

    /// Wait up to `grace` for launched peers to exit and reap them
    pub fn collect_peers(&self, grace: Duration) -> bool {
        self.launcher.lock().collect_peers(grace)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer_pid(&self) -> u32 {
        self.peer_pid.load(Ordering::SeqCst)
    }

    pub fn misses(&self) -> usize {
        self.flags.misses()
    }

    pub fn revivals(&self) -> u64 {
        self.revivals.load(Ordering::SeqCst)
    }

    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeat.sent()
    }

    pub fn heartbeats_failed(&self) -> u64 {
        self.heartbeat.failed()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.is_open()
    }

    /// Take the error that stopped this side, if any
    pub fn take_failure(&self) -> Option<ImmortalError> {
        self.failure.lock().take()
    }
}

/// Summary of a finished supervision session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub role: Role,
    pub status: RunStatus,
    pub revivals: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_failed: u64,
    pub last_peer: u32,
}

/// Builder and runner for one side
pub struct Supervisor {
    role: Role,
    interval: Duration,
    max_misses: u32,
    probe_interval: Duration,
    peer_command: CommandLine,
    initial_peer: u32,
    confirm: bool,
    flags: &'static ProtocolFlags,
    launcher: Box<dyn PeerLauncher>,
    signaller: Arc<dyn PeerSignaller>,
    discovery: Arc<dyn DiscoveryChannel>,
    discovery_var: String,
    connected: Arc<Latch>,
}

impl Supervisor {
    /// A side with the real process glue. The application side confirms
    /// its connection; the watchdog side does not.
    pub fn new(role: Role, interval: Duration, max_misses: u32, peer_command: CommandLine) -> Self {
        Self {
            role,
            interval,
            max_misses,
            probe_interval: Duration::from_millis(250),
            peer_command,
            initial_peer: 0,
            confirm: role == Role::Application,
            flags: &FLAGS,
            launcher: Box::new(ForkExecLauncher::new()),
            signaller: Arc::new(NixSignaller),
            discovery: Arc::new(EnvDiscovery),
            discovery_var: DISCOVERY_VAR.to_string(),
            connected: Arc::new(Latch::new()),
        }
    }

    /// A side parameterised by a [`ProtocolConfig`]
    pub fn from_config(role: Role, config: &ProtocolConfig, peer_command: CommandLine) -> Self {
        Self::new(role, config.interval(), config.max_misses, peer_command)
            .with_probe_interval(config.connect_probe_interval())
            .with_discovery_var(config.discovery_var.clone())
    }

    pub fn with_launcher(mut self, launcher: impl PeerLauncher + 'static) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    pub fn with_signaller(mut self, signaller: Arc<dyn PeerSignaller>) -> Self {
        self.signaller = signaller;
        self
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn DiscoveryChannel>) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_discovery_var(mut self, name: impl Into<String>) -> Self {
        self.discovery_var = name.into();
        self
    }

    /// Use flags other than the ones the signal handlers drive
    pub fn with_flags(mut self, flags: &'static ProtocolFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Start with a known peer (the watchdog's parent)
    pub fn with_peer(mut self, pid: u32) -> Self {
        self.initial_peer = pid;
        self
    }

    pub fn with_connected(mut self, latch: Arc<Latch>) -> Self {
        self.connected = latch;
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn confirm_connection(mut self, confirm: bool) -> Self {
        self.confirm = confirm;
        self
    }

    /// Latch opened once contact with a peer is confirmed
    pub fn connected(&self) -> Arc<Latch> {
        Arc::clone(&self.connected)
    }

    /// Validate and build the shared side state without running it
    pub fn into_side(self) -> Result<Arc<Side>> {
        if self.interval.is_zero() {
            return Err(ImmortalError::InvalidConfig(
                "interval must be greater than zero".to_string(),
            ));
        }
        if self.max_misses == 0 {
            return Err(ImmortalError::InvalidConfig(
                "max_misses must be greater than zero".to_string(),
            ));
        }
        if self.confirm && self.probe_interval.is_zero() {
            return Err(ImmortalError::InvalidConfig(
                "connect probe interval must be greater than zero".to_string(),
            ));
        }

        Ok(Arc::new(Side {
            role: self.role,
            max_misses: self.max_misses as usize,
            flags: self.flags,
            peer_pid: AtomicU32::new(self.initial_peer),
            armed: AtomicBool::new(false),
            own_peer: AtomicBool::new(false),
            peer_command: self.peer_command,
            launcher: Mutex::new(self.launcher),
            heartbeat: HeartbeatSender::new(Arc::clone(&self.signaller), self.flags),
            signaller: self.signaller,
            discovery: self.discovery,
            discovery_var: self.discovery_var,
            connected: self.connected,
            failure: Mutex::new(None),
            revivals: AtomicU64::new(0),
        }))
    }

    /// Run this side until a shutdown is requested or revival fails.
    ///
    /// After a shutdown the application side waits up to two intervals for
    /// its watchdog to exit, so no zombie outlives the session. The protocol
    /// flags are reset once the loop has exited.
    pub fn run(self) -> Result<SessionReport> {
        let interval = self.interval;
        let probe_interval = self.probe_interval;
        let confirm = self.confirm;
        let side = self.into_side()?;

        let mut scheduler = Scheduler::new();
        let stop = scheduler.stop_handle();

        let heartbeat_side = Arc::clone(&side);
        scheduler.add_task(
            interval,
            move || {
                heartbeat_side.send_heartbeat();
                TaskOutcome::Reschedule
            },
            task_dropped("send-heartbeat"),
        )?;

        let check_side = Arc::clone(&side);
        scheduler.add_task(
            interval,
            move || {
                if check_side.check_peer().must_stop() {
                    stop.stop();
                }
                TaskOutcome::Reschedule
            },
            task_dropped("check-peer"),
        )?;

        if confirm {
            let confirm_side = Arc::clone(&side);
            scheduler.add_task(
                probe_interval,
                move || {
                    if confirm_side.confirm_connected() {
                        TaskOutcome::Discard
                    } else {
                        TaskOutcome::Reschedule
                    }
                },
                task_dropped("confirm-connected"),
            )?;
        }

        tracing::info!(
            role = %side.role(),
            peer = side.peer_pid(),
            ?interval,
            max_misses = side.max_misses,
            "Supervision started"
        );

        let status = scheduler.run();
        drop(scheduler);

        // A watchdog exits right after this; init adopts its children.
        if side.flags.stop_requested() && side.role() == Role::Application {
            side.collect_peers(interval * 2);
        }
        side.flags.reset();

        let report = SessionReport {
            role: side.role(),
            status,
            revivals: side.revivals(),
            heartbeats_sent: side.heartbeats_sent(),
            heartbeats_failed: side.heartbeats_failed(),
            last_peer: side.peer_pid(),
        };
        tracing::info!(
            role = %report.role,
            revivals = report.revivals,
            heartbeats_sent = report.heartbeats_sent,
            heartbeats_failed = report.heartbeats_failed,
            "Supervision ended"
        );

        match side.take_failure() {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }
}

fn task_dropped(name: &'static str) -> impl FnOnce(TaskId) + Send + 'static {
    move |id| tracing::trace!(task = %id, "{} task dropped", name)
}

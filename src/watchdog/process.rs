//! Process glue
//!
//! Spawning a replacement peer and signalling a known peer. Both are behind
//! traits so the protocol logic can run against in-memory doubles.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{getpgrp, getppid, Pid};

use super::signals::{protocol_signals, HEARTBEAT_SIGNAL, SHUTDOWN_SIGNAL};
use crate::core::error::{ImmortalError, Result};

// ============================================================================
// Command lines
// ============================================================================

/// Program plus arguments for a peer process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandLine {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let program = program.into();
        if program.as_os_str().is_empty() {
            return Err(ImmortalError::CommandLine("program is empty".to_string()));
        }
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

        for part in std::iter::once(program.as_os_str()).chain(args.iter().map(OsString::as_os_str)) {
            if part.as_bytes().contains(&0) {
                return Err(ImmortalError::CommandLine(format!(
                    "argument {:?} contains a NUL byte",
                    part
                )));
            }
        }

        Ok(Self { program, args })
    }

    /// `<watchdog> <interval> <max_misses> <application argv...>`
    pub fn for_watchdog(
        watchdog: &Path,
        interval_secs: u64,
        max_misses: u32,
        app_argv: &[String],
    ) -> Result<Self> {
        if app_argv.is_empty() {
            return Err(ImmortalError::CommandLine(
                "application argv is empty".to_string(),
            ));
        }

        let mut args: Vec<OsString> = Vec::with_capacity(app_argv.len() + 2);
        args.push(interval_secs.to_string().into());
        args.push(max_misses.to_string().into());
        args.extend(app_argv.iter().map(OsString::from));
        Self::new(watchdog, args)
    }

    /// The application's own argv: element 0 is the program
    pub fn for_application<S: AsRef<OsStr>>(app_argv: &[S]) -> Result<Self> {
        let (program, rest) = app_argv.split_first().ok_or_else(|| {
            ImmortalError::CommandLine("application argv is empty".to_string())
        })?;
        Self::new(
            PathBuf::from(program.as_ref()),
            rest.iter().map(|arg| arg.as_ref().to_os_string()),
        )
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

// ============================================================================
// Launching
// ============================================================================

/// Replaces the peer process
pub trait PeerLauncher: Send {
    /// Start a fresh peer and return its pid once it is running the target
    /// program
    fn replace_peer_process(&mut self, command: &CommandLine) -> Result<u32>;

    /// Wait up to `grace` for every launched peer to exit and reap it.
    /// Returns false if some are still running.
    fn collect_peers(&mut self, grace: Duration) -> bool;
}

impl<L: PeerLauncher + ?Sized> PeerLauncher for Box<L> {
    fn replace_peer_process(&mut self, command: &CommandLine) -> Result<u32> {
        (**self).replace_peer_process(command)
    }

    fn collect_peers(&mut self, grace: Duration) -> bool {
        (**self).collect_peers(grace)
    }
}

const REAP_POLL: Duration = Duration::from_millis(10);

/// Spawns peers as child processes.
///
/// The child starts with the protocol signals blocked so a heartbeat that
/// arrives before its handlers exist stays pending instead of killing it.
/// A replaced child that is still running is kept and reaped once it exits.
#[derive(Debug, Default)]
pub struct ForkExecLauncher {
    child: Option<Child>,
    retired: Vec<Child>,
}

impl ForkExecLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pid of the most recently spawned peer
    pub fn current_pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Children replaced while still running
    pub fn retired_pids(&self) -> Vec<u32> {
        self.retired.iter().map(Child::id).collect()
    }

    fn reap_previous(&mut self) {
        if let Some(previous) = self.child.take() {
            self.retired.push(previous);
        }
        self.retired.retain_mut(|child| !reap(child));

        for child in &self.retired {
            tracing::warn!(pid = child.id(), "Replaced peer still running");
        }
    }
}

/// Non-blocking reap; true once the child is gone
fn reap(child: &mut Child) -> bool {
    match child.try_wait() {
        Ok(Some(status)) => {
            tracing::debug!(pid = child.id(), %status, "Reaped peer");
            true
        }
        Ok(None) => false,
        Err(e) => {
            tracing::debug!(pid = child.id(), "Could not reap peer: {}", e);
            true
        }
    }
}

impl PeerLauncher for ForkExecLauncher {
    fn replace_peer_process(&mut self, command: &CommandLine) -> Result<u32> {
        self.reap_previous();

        tracing::info!("Starting peer process: {}", command);

        let mask = protocol_signals();
        let mut cmd = command.to_command();
        // SAFETY: the closure only calls pthread_sigmask, which is
        // async-signal-safe.
        unsafe {
            cmd.pre_exec(move || mask.thread_block().map_err(std::io::Error::from));
        }

        // spawn returns only after exec succeeded or failed in the child.
        let child = cmd.spawn().map_err(|source| ImmortalError::Revival {
            program: command.program().to_path_buf(),
            source,
        })?;

        let pid = child.id();
        self.child = Some(child);
        Ok(pid)
    }

    fn collect_peers(&mut self, grace: Duration) -> bool {
        if let Some(current) = self.child.take() {
            self.retired.push(current);
        }

        let deadline = Instant::now() + grace;
        loop {
            self.retired.retain_mut(|child| !reap(child));
            if self.retired.is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                tracing::warn!(pids = ?self.retired_pids(), "Peers did not exit within {:?}", grace);
                return false;
            }
            thread::sleep(REAP_POLL);
        }
    }
}

// ============================================================================
// Signalling
// ============================================================================

/// Signals sent to, and facts learned about, other processes
pub trait PeerSignaller: Send + Sync {
    fn send_heartbeat(&self, pid: u32) -> Result<()>;

    /// Ask one peer to stop supervising
    fn send_shutdown(&self, pid: u32) -> Result<()>;

    /// Zero-signal probe
    fn is_alive(&self, pid: u32) -> bool;

    fn parent_pid(&self) -> u32;
}

/// Real signals through `kill(2)`
#[derive(Debug, Default, Clone, Copy)]
pub struct NixSignaller;

impl PeerSignaller for NixSignaller {
    fn send_heartbeat(&self, pid: u32) -> Result<()> {
        signal_peer(pid, HEARTBEAT_SIGNAL)
    }

    fn send_shutdown(&self, pid: u32) -> Result<()> {
        signal_peer(pid, SHUTDOWN_SIGNAL)
    }

    fn is_alive(&self, pid: u32) -> bool {
        is_process_alive(pid)
    }

    fn parent_pid(&self) -> u32 {
        u32::try_from(getppid().as_raw()).unwrap_or(0)
    }
}

fn signal_peer(pid: u32, signal: Signal) -> Result<()> {
    let target = to_pid(pid).ok_or(ImmortalError::SignalSend {
        signal: signal.as_str(),
        target: -1,
        source: Errno::EINVAL,
    })?;
    kill(target, signal).map_err(|source| ImmortalError::SignalSend {
        signal: signal.as_str(),
        target: target.as_raw(),
        source,
    })
}

/// Delivers the shutdown request to every process of the pair at once
pub trait GroupSignaller: Send + Sync {
    fn broadcast_shutdown(&self) -> Result<()>;
}

/// `SIGUSR2` to the caller's whole process group
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessGroupSignaller;

impl GroupSignaller for ProcessGroupSignaller {
    fn broadcast_shutdown(&self) -> Result<()> {
        let group = getpgrp();
        killpg(group, SHUTDOWN_SIGNAL).map_err(|source| ImmortalError::SignalSend {
            signal: SHUTDOWN_SIGNAL.as_str(),
            target: -group.as_raw(),
            source,
        })
    }
}

/// Positive pids only; 0 and values beyond `i32::MAX` would address groups
fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|raw| *raw > 0).map(Pid::from_raw)
}

/// Check whether a process exists, without delivering a signal
pub fn is_process_alive(pid: u32) -> bool {
    let Some(target) = to_pid(pid) else {
        return false;
    };

    match kill(target, None) {
        Ok(()) => true,
        // Exists, but belongs to someone else.
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watchdog_command_line_layout() {
        let argv = vec!["./server".to_string(), "--port".to_string(), "8080".to_string()];
        let command = CommandLine::for_watchdog(Path::new("/usr/bin/watchdog"), 2, 5, &argv).unwrap();

        assert_eq!(command.program(), Path::new("/usr/bin/watchdog"));
        let args: Vec<&OsStr> = command.args().iter().map(OsString::as_os_str).collect();
        assert_eq!(args, ["2", "5", "./server", "--port", "8080"]);
        assert_eq!(command.to_string(), "/usr/bin/watchdog 2 5 ./server --port 8080");
    }

    #[test]
    fn test_application_command_line_uses_argv0() {
        let command = CommandLine::for_application(&["./server", "-v"]).unwrap();
        assert_eq!(command.program(), Path::new("./server"));
        assert_eq!(command.args(), [OsString::from("-v")]);
    }

    #[test]
    fn test_empty_argv_is_rejected() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            CommandLine::for_application(&empty),
            Err(ImmortalError::CommandLine(_))
        ));
        assert!(matches!(
            CommandLine::for_watchdog(Path::new("watchdog"), 1, 1, &[]),
            Err(ImmortalError::CommandLine(_))
        ));
    }

    #[test]
    fn test_nul_bytes_are_rejected() {
        let argv = vec!["./server".to_string(), "bad\0arg".to_string()];
        assert!(matches!(
            CommandLine::for_watchdog(Path::new("watchdog"), 1, 1, &argv),
            Err(ImmortalError::CommandLine(msg)) if msg.contains("NUL")
        ));
    }

    #[test]
    fn test_current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
        assert!(!is_process_alive(0));
        assert!(!is_process_alive(u32::MAX));
    }

    #[test]
    fn test_parent_pid_is_known() {
        assert!(NixSignaller.parent_pid() > 0);
    }

    #[test]
    fn test_launcher_spawns_and_reaps() {
        let mut launcher = ForkExecLauncher::new();
        let command = CommandLine::new("true", Vec::<String>::new()).unwrap();

        let first = launcher.replace_peer_process(&command).unwrap();
        assert!(first > 0);
        assert_eq!(launcher.current_pid(), Some(first));

        std::thread::sleep(std::time::Duration::from_millis(100));
        let second = launcher.replace_peer_process(&command).unwrap();
        assert_ne!(first, second);
        assert_eq!(launcher.current_pid(), Some(second));
    }

    #[test]
    fn test_collect_reaps_exited_peer() {
        let mut launcher = ForkExecLauncher::new();
        let command = CommandLine::new("sleep", ["0.1"]).unwrap();

        let pid = launcher.replace_peer_process(&command).unwrap();
        assert!(launcher.collect_peers(Duration::from_secs(5)));
        assert_eq!(launcher.current_pid(), None);
        // Reaped, so not even a zombie is left.
        assert!(!is_process_alive(pid));
    }

    #[test]
    fn test_collect_gives_up_on_running_peer() {
        let mut launcher = ForkExecLauncher::new();
        let command = CommandLine::new("sleep", ["5"]).unwrap();

        let pid = launcher.replace_peer_process(&command).unwrap();
        assert!(!launcher.collect_peers(Duration::from_millis(50)));
        assert!(is_process_alive(pid));
        assert_eq!(launcher.retired_pids(), vec![pid]);

        kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
        assert!(launcher.collect_peers(Duration::from_secs(5)));
        assert!(!is_process_alive(pid));
    }

    #[test]
    fn test_replaced_running_peer_is_reaped_later() {
        let mut launcher = ForkExecLauncher::new();
        let slow = CommandLine::new("sleep", ["5"]).unwrap();
        let quick = CommandLine::new("true", Vec::<String>::new()).unwrap();

        let first = launcher.replace_peer_process(&slow).unwrap();
        let second = launcher.replace_peer_process(&quick).unwrap();
        assert_eq!(launcher.current_pid(), Some(second));
        assert_eq!(launcher.retired_pids(), vec![first]);

        kill(Pid::from_raw(first as i32), Signal::SIGKILL).unwrap();
        assert!(launcher.collect_peers(Duration::from_secs(5)));
        assert!(launcher.retired_pids().is_empty());
        assert!(!is_process_alive(first));
        assert!(!is_process_alive(second));
    }

    #[test]
    fn test_launcher_reports_exec_failure() {
        let mut launcher = ForkExecLauncher::new();
        let command =
            CommandLine::new("/nonexistent/immortal-peer", Vec::<String>::new()).unwrap();

        let result = launcher.replace_peer_process(&command);
        assert!(matches!(result, Err(ImmortalError::Revival { .. })));
        assert_eq!(launcher.current_pid(), None);
    }
}

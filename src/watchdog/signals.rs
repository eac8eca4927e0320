//! Signal Glue
//!
//! The whole wire protocol between the two processes is two signals:
//! - `SIGUSR1`: heartbeat, clears the receiver's miss counter
//! - `SIGUSR2`: shutdown request, raises the receiver's stop flag
//!
//! Handlers run on whatever thread the kernel picks, preempting arbitrary
//! code, so they only perform single-word atomic stores on
//! [`ProtocolFlags`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use nix::libc::c_int;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::core::error::{ImmortalError, Result};

/// Signal carrying a heartbeat
pub const HEARTBEAT_SIGNAL: Signal = Signal::SIGUSR1;

/// Signal carrying a shutdown request
pub const SHUTDOWN_SIGNAL: Signal = Signal::SIGUSR2;

/// Process-wide protocol state reachable from signal handlers.
///
/// Initialised before the handlers are installed and reset once the owning
/// scheduler loop has exited.
#[derive(Debug)]
pub struct ProtocolFlags {
    misses: AtomicUsize,
    heard: AtomicBool,
    stop: AtomicBool,
}

impl ProtocolFlags {
    pub const fn new() -> Self {
        Self {
            misses: AtomicUsize::new(0),
            heard: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        }
    }

    /// A heartbeat arrived. Async-signal-safe.
    pub fn heartbeat(&self) {
        self.misses.store(0, Ordering::SeqCst);
        self.heard.store(true, Ordering::SeqCst);
    }

    /// A shutdown was requested. Async-signal-safe.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Close one check interval and return the miss count after it: 0 if a
    /// heartbeat arrived since the previous check, otherwise one more than
    /// before.
    pub fn record_check(&self) -> usize {
        if self.heard.swap(false, Ordering::SeqCst) {
            self.misses.store(0, Ordering::SeqCst);
            0
        } else {
            self.misses.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::SeqCst)
    }

    /// Start counting from zero again (after a revival or an adoption)
    pub fn reset_misses(&self) {
        self.heard.store(false, Ordering::SeqCst);
        self.misses.store(0, Ordering::SeqCst);
    }

    /// Return to the initial state
    pub fn reset(&self) {
        self.reset_misses();
        self.stop.store(false, Ordering::SeqCst);
    }
}

impl Default for ProtocolFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Flags driven by the installed signal handlers
pub static FLAGS: ProtocolFlags = ProtocolFlags::new();

extern "C" fn on_heartbeat(_signal: c_int) {
    FLAGS.heartbeat();
}

extern "C" fn on_shutdown(_signal: c_int) {
    FLAGS.request_stop();
}

/// Install the heartbeat and shutdown handlers for the whole process
pub fn install_handlers() -> Result<()> {
    let heartbeat = SigAction::new(
        SigHandler::Handler(on_heartbeat),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let shutdown = SigAction::new(
        SigHandler::Handler(on_shutdown),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );

    // SAFETY: both handlers only perform atomic stores on a static.
    unsafe {
        signal::sigaction(HEARTBEAT_SIGNAL, &heartbeat).map_err(ImmortalError::SignalSetup)?;
        signal::sigaction(SHUTDOWN_SIGNAL, &shutdown).map_err(ImmortalError::SignalSetup)?;
    }

    tracing::debug!("Protocol signal handlers installed");
    Ok(())
}

/// The two protocol signals as a set
pub fn protocol_signals() -> SigSet {
    let mut set = SigSet::empty();
    set.add(HEARTBEAT_SIGNAL);
    set.add(SHUTDOWN_SIGNAL);
    set
}

/// Block every signal on the calling thread. Threads spawned afterwards
/// inherit the mask.
pub fn block_all_signals() -> Result<()> {
    SigSet::all().thread_block().map_err(ImmortalError::SignalMask)
}

/// Let the calling thread receive the protocol signals
pub fn unblock_protocol_signals() -> Result<()> {
    protocol_signals().thread_unblock().map_err(ImmortalError::SignalMask)
}

/// Hold the protocol signals pending on the calling thread
pub fn block_protocol_signals() -> Result<()> {
    protocol_signals().thread_block().map_err(ImmortalError::SignalMask)
}

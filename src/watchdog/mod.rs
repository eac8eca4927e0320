//! Watchdog Module
//!
//! Mutual liveness supervision between an application and a watchdog
//! process. Each side heartbeats the other with `SIGUSR1` and revives it
//! after too many silent intervals; `SIGUSR2` shuts both down.

pub mod discovery;
pub mod heartbeat;
pub mod immortal;
pub mod process;
pub mod semaphore;
pub mod signals;
pub mod supervisor;


pub use discovery::{DiscoveryChannel, EnvDiscovery, MemoryDiscovery};
pub use heartbeat::HeartbeatSender;
pub use immortal::{become_immortal, do_not_resuscitate, is_immortal, Immortal};
pub use process::{
    is_process_alive, CommandLine, ForkExecLauncher, GroupSignaller, NixSignaller, PeerLauncher, PeerSignaller,
    ProcessGroupSignaller,
};
pub use semaphore::{Latch, Semaphore, SemaphoreError};
pub use signals::{ProtocolFlags, HEARTBEAT_SIGNAL, SHUTDOWN_SIGNAL};
pub use supervisor::{CheckVerdict, Role, SessionReport, Side, Supervisor};

//! Switch transports for the fabric adapter.
//!
//! - [`TelnetSession`]: prompt-driven telnet connection to the
//!   C-Fabric controller with bounded-timeout `read_until`/`expect`
//! - [`SshSession`]: PTY shell channel to a FOS switch with
//!   dwell-loop reply reads
//! - [`LockRegistry`]: explicit per-switch operation locks
//!
//! Sessions are lazy: drivers open one per top-level operation and
//! close it on every exit path. Reconnect policy lives in the CLI
//! layers above, which get one reconnect-and-retry per transport
//! fault.

mod locks;
mod ssh;
mod telnet;

pub use locks::{LockRegistry, FABRIC_LOCK};
pub use ssh::{SshSession, RECV_BUFFER_SIZE};
pub use telnet::{TelnetSession, TELNET_PORT};

//! OVSDB client for hardware-VTEP programming.
//!
//! FOS switches expose the hardware_vtep OVSDB schema on TCP/6640.
//! The stream has no length prefix, so frames are recovered by brace
//! balancing ([`FrameBuffer`]); requests and replies correlate by a
//! random 128-bit id, and every write transaction ends with a durable
//! commit op.
//!
//! - [`FrameBuffer`]: byte-split-safe JSON reframer
//! - [`OvsdbClient`]: correlated `transact` transport plus typed
//!   table operations (Logical_Switch, Physical_Port,
//!   Physical_Locator, Ucast_Macs_Local/Remote)

mod framing;
mod rpc;
mod vtep;

pub use framing::FrameBuffer;
pub use rpc::{OvsdbClient, HARDWARE_VTEP_SCHEMA, MAX_RETRIES, OVSDB_PORT};
pub use vtep::VXLAN_ENCAP;

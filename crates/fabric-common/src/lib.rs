//! Shared infrastructure for the fabric control-plane adapter.
//!
//! This crate provides the pieces every switch-facing component needs:
//!
//! - [`FabricError`]: one error taxonomy for transports, CLI drivers,
//!   the OVSDB writer, and configuration loading
//! - [`AdapterConfig`]: YAML configuration with eager validation
//! - Domain types: virtual networks, ports, local-link info, and the
//!   [`BindMode`] classification used to pick a binding strategy

mod config;
mod error;
mod types;

pub use config::{
    AdapterConfig, CfabConfig, FosswConfig, VfabId, DEFAULT_OVSDB_PORT,
    DEFAULT_OVSDB_VLANID_RANGE_MIN, DEFAULT_SSH_PORT, DEFAULT_TIMEOUT_SECS, DEFAULT_UDP_DEST_PORT,
    MAX_SHARED_PREFIX_LEN, MAX_UNSHARED_PREFIX_LEN, MAX_VFAB_ID, OVSDB_VLANID_RANGE_WIDTH,
};
pub use error::{FabricError, FabricResult};
pub use types::{
    classify_links, normalize_mac, BindMode, LocalLink, NetworkKind, PortContext, VirtualNetwork,
    VnicKind,
};

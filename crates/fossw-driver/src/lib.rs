//! FOS switch drivers for the fabric adapter.
//!
//! FOS switches are driven two ways: a line-oriented CLI over SSH for
//! VLAN/LAG/VPC primitives, and the hardware_vtep OVSDB schema for
//! VXLAN overlays.
//!
//! - [`FosSwitchClient`] / [`FosCli`]: SSH CLI wrapper and the seam
//!   the drivers are tested against
//! - [`FosVlanDriver`]: VLAN primitives, LAG allocation, VPC (mLAG)
//!   lifecycle, and the startup fleet probe
//! - [`FosVxlanDriver`]: hardware-VTEP port binding with fleet-wide
//!   MAC fan-out

mod cli;
mod commands;
mod vlan_driver;
mod vxlan_driver;

pub use cli::{save_all_fossw, FosCli, FosConnect, FosSwitchClient, SshConnect};
pub use commands::*;
pub use vlan_driver::{
    clear_lag_on, clear_vlan_on, create_vlan_on, delete_vlan_on, get_free_logical_port_on,
    get_free_vpc_id_on, get_logical_port_of_on, get_peer_ip_on, get_switch_mac_on,
    get_vpc_id_of_on, join_to_logical_port_on, join_to_vpc_on, leave_from_logical_port_on,
    leave_from_vpc_on, set_vlan_on, vpc_id_is_free_on, FleetMap, FosVlanDriver, MAX_VPC_ID,
};
pub use vxlan_driver::{derive_binding_vlan, FosVxlanDriver, TunnelSync};

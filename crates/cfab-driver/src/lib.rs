//! C-Fabric driver for the fabric adapter.
//!
//! The C-Fabric controller exposes a prompt-driven CLI over telnet;
//! all state is carried in free-form configuration text. This crate
//! layers the pieces that turn network intent into committed config:
//!
//! - [`CliManager`]: prompt state machine, login/busy handling,
//!   config fetches, and `configure` batches over a telnet session
//! - `config_text` / `ranges`: pure config-mining and the
//!   range codec for ifgroup membership expressions
//! - [`FabricVlanDriver`]: VLAN and port-profile policy with
//!   batch-to-one-commit discipline under the fabric lock

mod cli;
mod commands;
mod config_text;
mod ranges;
mod vlan_driver;

pub use cli::{CfabCli, CliManager, CliMode, ERROR_MARKER};
pub use commands::*;
pub use config_text::{
    alloc_ifgroup_id, alloc_lag_id, alloc_pprofile_index, find_ifgroup_exact,
    find_ifgroup_for_lag, ifgroups_covering_port, ifgroups_for_lag, lag_of_port,
    pprofile_definitions, select_pprofile_name, used_ifgroup_ids, used_lag_ids,
    used_pprofile_indices, vfab_pprofile_rows, vfab_vlan_rows, PprofileDef, PprofileSelection,
    VfabPprofileRow, VfabVlanRow, IFGROUP_ID_MAX, LAG_ID_MAX, LAG_ID_MIN, PPROFILE_INDEX_MAX,
};
pub use ranges::{contains_val, decode, eliminate_val, encode, insert_val};
pub use vlan_driver::{FabricVlanDriver, PprofilePolicy};

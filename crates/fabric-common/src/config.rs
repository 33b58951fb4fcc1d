//! Adapter configuration loading and validation.
//!
//! The adapter reads a YAML file with two optional groups,
//! `fujitsu_cfab` (CLI-over-telnet fabric) and `fujitsu_fossw`
//! (per-switch SSH + OVSDB). Validation happens eagerly at load so
//! misconfiguration surfaces at startup rather than mid-operation.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{FabricError, FabricResult};

/// Default SSH port for FOS switches.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default I/O timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default VXLAN UDP destination port.
pub const DEFAULT_UDP_DEST_PORT: u16 = 4789;

/// Default OVSDB management port on FOS switches.
pub const DEFAULT_OVSDB_PORT: u16 = 6640;

/// Default first VLAN id of the reserved OVSDB binding range.
pub const DEFAULT_OVSDB_VLANID_RANGE_MIN: u16 = 2;

/// Number of VLAN ids reserved for OVSDB port bindings.
pub const OVSDB_VLANID_RANGE_WIDTH: u16 = 78;

/// Highest numeric VFAB id accepted in `physical_networks` entries.
pub const MAX_VFAB_ID: u16 = 3000;

/// Maximum pprofile prefix length when profiles are shared per VLAN.
pub const MAX_SHARED_PREFIX_LEN: usize = 28;

/// Maximum pprofile prefix length when profiles are per MAC.
pub const MAX_UNSHARED_PREFIX_LEN: usize = 15;

/// A VFAB identifier: either the default VFAB or a numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VfabId {
    /// The switch's default VFAB.
    Default,
    /// A numeric VFAB id in 1..=3000.
    Id(u16),
}

impl VfabId {
    /// Parses a VFAB id from its configuration form.
    pub fn parse(s: &str) -> FabricResult<Self> {
        if s == "default" {
            return Ok(VfabId::Default);
        }
        let id: u16 = s.parse().map_err(|_| {
            FabricError::invalid_config("physical_networks", format!("invalid vfab id '{}'", s))
        })?;
        if !(1..=MAX_VFAB_ID).contains(&id) {
            return Err(FabricError::invalid_config(
                "physical_networks",
                format!("vfab id {} out of range 1..={}", id, MAX_VFAB_ID),
            ));
        }
        Ok(VfabId::Id(id))
    }
}

impl std::fmt::Display for VfabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VfabId::Default => write!(f, "default"),
            VfabId::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Configuration group for the C-Fabric telnet adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct CfabConfig {
    /// Fabric controller address.
    pub address: String,

    /// Login user name.
    #[serde(default)]
    pub username: String,

    /// Login password.
    #[serde(default)]
    pub password: String,

    /// `<physnet>:<vfab-id>` pairs; vfab-id is `default` or 1..=3000.
    #[serde(default)]
    pub physical_networks: Vec<String>,

    /// Share one pprofile per VLAN instead of one per MAC.
    #[serde(default)]
    pub share_pprofile: bool,

    /// Prefix prepended to generated pprofile names.
    #[serde(default)]
    pub pprofile_prefix: String,

    /// Persist the configuration after each commit.
    #[serde(default = "default_true")]
    pub save_config: bool,
}

impl CfabConfig {
    /// Parses `physical_networks` into a physnet → VFAB map.
    pub fn vfab_map(&self) -> FabricResult<HashMap<String, VfabId>> {
        let mut map = HashMap::new();
        for entry in &self.physical_networks {
            let (physnet, vfab) = entry.split_once(':').ok_or_else(|| {
                FabricError::invalid_config(
                    "physical_networks",
                    format!("'{}' is not of the form <physnet>:<vfab-id>", entry),
                )
            })?;
            if physnet.is_empty() {
                return Err(FabricError::invalid_config(
                    "physical_networks",
                    format!("empty physical network name in '{}'", entry),
                ));
            }
            map.insert(physnet.to_string(), VfabId::parse(vfab)?);
        }
        Ok(map)
    }

    /// Validates the configured pprofile prefix against the length and
    /// character restrictions of the fabric CLI.
    pub fn validate_pprofile_prefix(&self) -> FabricResult<()> {
        let max = if self.share_pprofile {
            MAX_SHARED_PREFIX_LEN
        } else {
            MAX_UNSHARED_PREFIX_LEN
        };
        if self.pprofile_prefix.len() > max {
            return Err(FabricError::invalid_config(
                "pprofile_prefix",
                format!(
                    "'{}' exceeds the maximum length of {}",
                    self.pprofile_prefix, max
                ),
            ));
        }
        if let Some(bad) = self
            .pprofile_prefix
            .chars()
            .find(|c| matches!(c, '"' | '|' | '?'))
        {
            return Err(FabricError::invalid_config(
                "pprofile_prefix",
                format!("character '{}' is not allowed", bad),
            ));
        }
        Ok(())
    }

    /// Runs all eager validations for this group.
    pub fn validate(&self) -> FabricResult<()> {
        if self.address.is_empty() {
            return Err(FabricError::invalid_config("address", "must not be empty"));
        }
        self.vfab_map()?;
        self.validate_pprofile_prefix()
    }
}

/// Configuration group for the FOS SSH + OVSDB adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct FosswConfig {
    /// Management IPs of every FOS switch in the fleet.
    pub fossw_ips: Vec<String>,

    /// SSH user name.
    #[serde(default)]
    pub username: String,

    /// SSH password.
    #[serde(default)]
    pub password: String,

    /// SSH port.
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Bounded I/O timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// VXLAN UDP destination port.
    #[serde(default = "default_udp_dest_port")]
    pub udp_dest_port: u16,

    /// First VLAN id of the reserved OVSDB binding range; a 78-id
    /// window is reserved starting here.
    #[serde(default = "default_vlanid_range_min")]
    pub ovsdb_vlanid_range_min: u16,

    /// OVSDB management port.
    #[serde(default = "default_ovsdb_port")]
    pub ovsdb_port: u16,

    /// Persist running-config on every switch after mutations.
    #[serde(default = "default_true")]
    pub save_config: bool,
}

impl FosswConfig {
    /// Runs all eager validations for this group.
    pub fn validate(&self) -> FabricResult<()> {
        if self.fossw_ips.is_empty() {
            return Err(FabricError::invalid_config(
                "fossw_ips",
                "at least one switch IP is required",
            ));
        }
        let range_end = self.ovsdb_vlanid_range_min as u32 + OVSDB_VLANID_RANGE_WIDTH as u32 - 1;
        if self.ovsdb_vlanid_range_min < 2 || range_end > 4094 {
            return Err(FabricError::invalid_config(
                "ovsdb_vlanid_range_min",
                format!(
                    "reserved range {}..={} must lie within 2..=4094",
                    self.ovsdb_vlanid_range_min, range_end
                ),
            ));
        }
        Ok(())
    }
}

/// Top-level adapter configuration: one or both switch families.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// C-Fabric group, if the fabric adapter is enabled.
    #[serde(default)]
    pub fujitsu_cfab: Option<CfabConfig>,

    /// FOS group, if the FOS adapter is enabled.
    #[serde(default)]
    pub fujitsu_fossw: Option<FosswConfig>,
}

impl AdapterConfig {
    /// Loads and validates the configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> FabricResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            FabricError::invalid_config("config", format!("cannot read config file: {}", e))
        })?;
        Self::from_yaml(&text)
    }

    /// Loads and validates the configuration from YAML text.
    pub fn from_yaml(text: &str) -> FabricResult<Self> {
        let cfg: AdapterConfig = serde_yaml::from_str(text)
            .map_err(|e| FabricError::invalid_config("config", e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Runs all eager validations.
    pub fn validate(&self) -> FabricResult<()> {
        if self.fujitsu_cfab.is_none() && self.fujitsu_fossw.is_none() {
            return Err(FabricError::invalid_config(
                "config",
                "neither fujitsu_cfab nor fujitsu_fossw group is present",
            ));
        }
        if let Some(cfab) = &self.fujitsu_cfab {
            cfab.validate()?;
        }
        if let Some(fossw) = &self.fujitsu_fossw {
            fossw.validate()?;
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_udp_dest_port() -> u16 {
    DEFAULT_UDP_DEST_PORT
}

fn default_vlanid_range_min() -> u16 {
    DEFAULT_OVSDB_VLANID_RANGE_MIN
}

fn default_ovsdb_port() -> u16 {
    DEFAULT_OVSDB_PORT
}

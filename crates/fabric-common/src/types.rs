//! Domain types shared by the drivers and the orchestrator.

use serde::{Deserialize, Serialize};

use crate::error::{FabricError, FabricResult};

/// Network segmentation type supplied by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Vlan,
    Vxlan,
    Flat,
}

/// vNIC kind of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VnicKind {
    Baremetal,
    Virtual,
}

/// A virtual network as notified by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualNetwork {
    /// Opaque, globally unique network id.
    pub id: String,

    /// Segmentation type.
    pub kind: NetworkKind,

    /// VLAN id (1..=4094) or VNI.
    pub segmentation_id: Option<u32>,

    /// Physical network tag, required for VLAN networks.
    #[serde(default)]
    pub physical_network: Option<String>,
}

impl VirtualNetwork {
    /// Returns the logical-switch name used on hardware VTEPs: the
    /// network id with separators stripped.
    pub fn logical_switch_name(&self) -> String {
        self.id.replace('-', "")
    }
}

/// One local-link entry of a baremetal port: which switch and which
/// physical port the NIC is cabled to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalLink {
    /// Switch MAC address.
    pub switch_id: String,

    /// Switch-side physical port name (e.g. `1/1/0/1` or `0/2`).
    pub port_id: String,

    /// Switch host name.
    pub switch_info: String,
}

impl LocalLink {
    /// Returns true if all three required fields are present.
    pub fn is_complete(&self) -> bool {
        !self.switch_id.is_empty() && !self.port_id.is_empty() && !self.switch_info.is_empty()
    }
}

/// A port as notified by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortContext {
    /// Opaque port id.
    pub port_id: String,

    /// MAC address of the NIC.
    pub mac_address: String,

    /// Host IP bound to the NIC, when the orchestrator knows it.
    #[serde(default)]
    pub ip_address: Option<String>,

    /// Whether the port belongs to a baremetal host or a VM.
    pub vnic_kind: VnicKind,

    /// Switch cabling of the port; empty for virtual NICs.
    #[serde(default)]
    pub local_link_info: Vec<LocalLink>,
}

/// How a baremetal port attaches to the fabric.
///
/// Replaces dispatch-by-method-name: drivers branch on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// One NIC, one switch port.
    Single,
    /// Multiple NICs bundled on one switch.
    Lag,
    /// Multiple NICs split across two peered switches.
    Mlag,
}

/// Classifies local-link info into a bind mode.
///
/// Every entry must carry switch MAC, port id, and switch name;
/// two or more entries with distinct switch MACs form an mLAG.
pub fn classify_links(links: &[LocalLink]) -> FabricResult<BindMode> {
    if links.is_empty() {
        return Err(FabricError::invalid_config(
            "local_link_information",
            "no local link entries",
        ));
    }
    for link in links {
        if !link.is_complete() {
            return Err(FabricError::invalid_config(
                "local_link_information",
                format!(
                    "incomplete entry for port '{}': switch_id, port_id and switch_info are all required",
                    link.port_id
                ),
            ));
        }
    }
    if links.len() == 1 {
        return Ok(BindMode::Single);
    }
    let first = normalize_mac(&links[0].switch_id);
    let distinct = links
        .iter()
        .skip(1)
        .any(|l| normalize_mac(&l.switch_id) != first);
    if distinct {
        Ok(BindMode::Mlag)
    } else {
        Ok(BindMode::Lag)
    }
}

/// Lower-cases a MAC address for map lookups and comparisons.
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_lowercase()
}

//! C-Fabric CLI command builders.
//!
//! The fabric CLI is picky about its syntax; every command the driver
//! emits is built here so the exact wire text has one home and one set
//! of tests.

use fabric_common::VfabId;

/// Enters configuration mode.
pub const CONFIGURE_CMD: &str = "configure";

/// Commits the candidate configuration.
pub const COMMIT_CMD: &str = "commit";

/// Persists the committed configuration.
pub const SAVE_CMD: &str = "save";

/// Leaves the current CLI mode.
pub const EXIT_CMD: &str = "exit";

/// Disables the interactive pager.
pub const PAGER_DISABLE_CMD: &str = "terminal pager disable";

/// Re-enables the interactive pager.
pub const PAGER_ENABLE_CMD: &str = "terminal pager enable";

/// Link-aggregation domain used for endpoint LAGs.
pub const LAG_DOMAIN: u16 = 1;

/// Builds `show running-config`, optionally filtered by prefix.
pub fn show_running_config(prefix: Option<&str>) -> String {
    match prefix {
        Some(p) => format!("show running-config {}", p),
        None => "show running-config".to_string(),
    }
}

/// Builds `show candidate-config`, optionally filtered by prefix.
pub fn show_candidate_config(prefix: Option<&str>) -> String {
    match prefix {
        Some(p) => format!("show candidate-config {}", p),
        None => "show candidate-config".to_string(),
    }
}

/// Builds an ifgroup definition over physical ports.
pub fn ifgroup_ether(id: u16, ports: &str) -> String {
    format!("ifgroup {} ether {}", id, ports)
}

/// Builds an ifgroup definition over a link aggregation.
pub fn ifgroup_lag(id: u16, domain: u16, lag: u16) -> String {
    format!("ifgroup {} linkaggregation {} {}", id, domain, lag)
}

/// Opens an `interface range` block.
pub fn interface_range(ports: &str) -> String {
    format!("interface range {}", ports)
}

/// Interface block body: endpoint type.
pub const INTERFACE_TYPE_ENDPOINT: &str = "type endpoint";

/// Interface block body: clears the interface type.
pub const INTERFACE_NO_TYPE: &str = "no type";

/// Interface block body: external port mode.
pub const INTERFACE_PORT_MODE_EXTERNAL: &str = "cfab port-mode external";

/// Interface block body: clears the port mode.
pub const INTERFACE_NO_PORT_MODE: &str = "no cfab port-mode";

/// Interface block body: membership in a link aggregation.
pub fn interface_type_lag(lag: u16) -> String {
    format!("type linkaggregation {}", lag)
}

/// Builds one link-aggregation parameter line.
pub fn lag_param(domain: u16, lag: u16, param: &str, value: &str) -> String {
    format!("linkaggregation {} {} {} {}", domain, lag, param, value)
}

/// The three parameter lines configuring an endpoint LAG.
pub fn lag_endpoint_params(domain: u16, lag: u16) -> Vec<String> {
    vec![
        lag_param(domain, lag, "type", "endpoint"),
        lag_param(domain, lag, "mode", "active"),
        lag_param(domain, lag, "cfab port-mode", "external"),
    ]
}

/// Removes a link-aggregation definition.
pub fn no_lag(domain: u16, lag: u16) -> String {
    format!("no linkaggregation {} {}", domain, lag)
}

/// Builds a VFAB untagged-VLAN membership row.
pub fn vfab_vlan(vfab: &VfabId, vlan: u16, ifgroups: &str) -> String {
    format!("vfab {} vlan {} endpoint untag {}", vfab, vlan, ifgroups)
}

/// Removes a VFAB untagged-VLAN membership row.
pub fn no_vfab_vlan(vfab: &VfabId, vlan: u16) -> String {
    format!("no vfab {} vlan {} endpoint untag", vfab, vlan)
}

/// Builds a pprofile definition binding a tagged VLAN.
pub fn pprofile_vlan(name: &str, vlan: u16) -> String {
    format!("pprofile {} vlan tag {}", name, vlan)
}

/// Removes a pprofile definition.
pub fn no_pprofile(name: &str) -> String {
    format!("no pprofile {}", name)
}

/// Builds a VFAB pprofile binding: MAC (VSI id) to profile.
pub fn vfab_pprofile(vfab: &VfabId, index: u16, mac: &str, name: &str) -> String {
    format!("vfab {} pprofile {} vsiid mac {} {}", vfab, index, mac, name)
}

/// Removes a VFAB pprofile binding.
pub fn no_vfab_pprofile(vfab: &VfabId, index: u16) -> String {
    format!("no vfab {} pprofile {}", vfab, index)
}

/// The interface block resetting prior type and port mode.
pub fn interface_reset_block(ports: &str) -> Vec<String> {
    vec![
        interface_range(ports),
        INTERFACE_NO_TYPE.to_string(),
        INTERFACE_NO_PORT_MODE.to_string(),
        EXIT_CMD.to_string(),
    ]
}

/// The interface block configuring ports as external endpoints.
pub fn interface_endpoint_block(ports: &str) -> Vec<String> {
    vec![
        interface_range(ports),
        INTERFACE_TYPE_ENDPOINT.to_string(),
        INTERFACE_PORT_MODE_EXTERNAL.to_string(),
        EXIT_CMD.to_string(),
    ]
}

/// The interface block attaching ports to a link aggregation.
pub fn interface_lag_block(ports: &str, lag: u16) -> Vec<String> {
    vec![
        interface_range(ports),
        interface_type_lag(lag),
        EXIT_CMD.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ifgroup_commands() {
        assert_eq!(ifgroup_ether(0, "1/1/0/1"), "ifgroup 0 ether 1/1/0/1");
        assert_eq!(
            ifgroup_ether(3, "1/1/0/1,1/1/0/2"),
            "ifgroup 3 ether 1/1/0/1,1/1/0/2"
        );
        assert_eq!(ifgroup_lag(0, 1, 1), "ifgroup 0 linkaggregation 1 1");
    }

    #[test]
    fn test_vfab_vlan_commands() {
        let vfab = VfabId::Id(1);
        assert_eq!(vfab_vlan(&vfab, 8, "0"), "vfab 1 vlan 8 endpoint untag 0");
        assert_eq!(
            vfab_vlan(&VfabId::Default, 8, "0,3-5"),
            "vfab default vlan 8 endpoint untag 0,3-5"
        );
        assert_eq!(no_vfab_vlan(&vfab, 8), "no vfab 1 vlan 8 endpoint untag");
    }

    #[test]
    fn test_pprofile_commands() {
        assert_eq!(pprofile_vlan("test-2", 2), "pprofile test-2 vlan tag 2");
        assert_eq!(no_pprofile("test-1"), "no pprofile test-1");
        assert_eq!(
            vfab_pprofile(&VfabId::Id(3), 1, "00:01:02:03:04:05", "test-2"),
            "vfab 3 pprofile 1 vsiid mac 00:01:02:03:04:05 test-2"
        );
        assert_eq!(no_vfab_pprofile(&VfabId::Id(3), 0), "no vfab 3 pprofile 0");
    }

    #[test]
    fn test_lag_commands() {
        assert_eq!(
            lag_endpoint_params(1, 1),
            vec![
                "linkaggregation 1 1 type endpoint",
                "linkaggregation 1 1 mode active",
                "linkaggregation 1 1 cfab port-mode external",
            ]
        );
        assert_eq!(no_lag(1, 7), "no linkaggregation 1 7");
    }

    #[test]
    fn test_interface_blocks() {
        assert_eq!(
            interface_endpoint_block("1/1/0/1"),
            vec![
                "interface range 1/1/0/1",
                "type endpoint",
                "cfab port-mode external",
                "exit",
            ]
        );
        assert_eq!(
            interface_reset_block("1/1/0/1,1/1/0/2"),
            vec![
                "interface range 1/1/0/1,1/1/0/2",
                "no type",
                "no cfab port-mode",
                "exit",
            ]
        );
        assert_eq!(
            interface_lag_block("1/1/0/1,1/1/0/2", 1),
            vec![
                "interface range 1/1/0/1,1/1/0/2",
                "type linkaggregation 1",
                "exit",
            ]
        );
    }

    #[test]
    fn test_show_commands() {
        assert_eq!(show_running_config(None), "show running-config");
        assert_eq!(
            show_running_config(Some("pprofile")),
            "show running-config pprofile"
        );
        assert_eq!(show_candidate_config(None), "show candidate-config");
    }
}

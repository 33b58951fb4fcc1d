//! FOS CLI command builders and output parsers.
//!
//! Commands must be emitted verbatim; the parsers mine the few show
//! outputs the drivers depend on. Both live here so the wire text and
//! its inverse stay in one tested module.

use std::net::Ipv4Addr;

use once_cell::sync::Lazy;
use regex::Regex;

/// Enters the VLAN database context.
pub const VLAN_DATABASE_CMD: &str = "vlan database";

/// Enters global configuration mode.
pub const CONFIGURE_CMD: &str = "configure";

/// Leaves the current context.
pub const EXIT_CMD: &str = "exit";

/// Puts an interface into access mode.
pub const SWITCHPORT_MODE_ACCESS: &str = "switchport mode access";

/// Clears the access VLAN of an interface.
pub const NO_SWITCHPORT_ACCESS_VLAN: &str = "no switchport access vlan";

/// Puts a logical port into static (non-LACP) mode.
pub const PORT_CHANNEL_STATIC: &str = "port-channel static";

/// Persists the running configuration.
pub const SAVE_CONFIG_CMD: &str = "copy system:running-config nvram:startup-config";

/// Shows logical port assignments.
pub const SHOW_PORT_CHANNEL_BRIEF: &str = "show port-channel brief";

/// Shows the VPC keepalive peer.
pub const SHOW_VPC_PEER_KEEPALIVE: &str = "show vpc peer-keepalive";

/// Shows hardware identity, including the burned-in MAC.
pub const SHOW_HARDWARE: &str = "show hardware";

/// Vendor reply when deleting a VLAN that does not exist.
pub const FAILED_TO_DELETE_MARKER: &str = "Failed to delete";

pub fn vlan(id: u16) -> String {
    format!("vlan {}", id)
}

pub fn no_vlan(id: u16) -> String {
    format!("no vlan {}", id)
}

pub fn interface(port: &str) -> String {
    format!("interface {}", port)
}

pub fn switchport_access_vlan(id: u16) -> String {
    format!("switchport access vlan {}", id)
}

pub fn addport(logical_port: &str) -> String {
    format!("addport {}", logical_port)
}

pub fn deleteport(logical_port: &str) -> String {
    format!("deleteport {}", logical_port)
}

pub fn vpc(id: u16) -> String {
    format!("vpc {}", id)
}

pub fn no_vpc(id: u16) -> String {
    format!("no vpc {}", id)
}

pub fn show_vpc(id: u16) -> String {
    format!("show vpc {}", id)
}

static BURNED_IN_MAC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Burned In MAC Address[. ]*\s([0-9A-Fa-f:]{17})").expect("Invalid regex pattern")
});

static PEER_IP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Peer IP address[. ]*\s(\S+)").expect("Invalid regex pattern"));

static PEER_PORT_CHANNEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Peer Port-channel[. ]*\s(\S+)").expect("Invalid regex pattern"));

static VPC_PORT_CHANNEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Port-channel[. ]*\s(\S+)").expect("Invalid regex pattern"));

/// Extracts the burned-in MAC from `show hardware` output.
pub fn parse_burned_in_mac(output: &str) -> Option<String> {
    BURNED_IN_MAC_RE
        .captures(output)
        .map(|cap| cap[1].to_ascii_lowercase())
}

/// Extracts the keepalive peer IP from `show vpc peer-keepalive`
/// output. The value must be a well-formed IPv4 literal; anything
/// else fails closed to `None` rather than matching accidentally.
pub fn parse_peer_ip(output: &str) -> Option<Ipv4Addr> {
    PEER_IP_RE
        .captures(output)
        .and_then(|cap| cap[1].parse().ok())
}

/// True when `show vpc {id}` output reports no peer port-channel,
/// i.e. the VPC id is free for allocation.
pub fn vpc_is_free(output: &str) -> bool {
    PEER_PORT_CHANNEL_RE
        .captures(output)
        .map(|cap| cap[1].eq_ignore_ascii_case("none"))
        .unwrap_or(false)
}

/// The local port-channel a VPC id is bound to, from `show vpc {id}`.
pub fn vpc_port_channel(output: &str) -> Option<String> {
    VPC_PORT_CHANNEL_RE
        .captures(output)
        .map(|cap| cap[1].to_string())
        .filter(|ch| !ch.eq_ignore_ascii_case("none"))
}

/// Parses `show port-channel brief` output into
/// `(logical_port, is_static, member_ports)` rows.
pub fn parse_port_channel_brief(output: &str) -> Vec<(String, bool, Vec<String>)> {
    let mut rows = Vec::new();
    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = tokens.first() else { continue };
        if !is_port_token(first) {
            continue;
        }
        let Some(type_pos) = tokens
            .iter()
            .position(|t| t.eq_ignore_ascii_case("static") || t.eq_ignore_ascii_case("dynamic"))
        else {
            continue;
        };
        let is_static = tokens[type_pos].eq_ignore_ascii_case("static");
        let members: Vec<String> = tokens[type_pos + 1..]
            .iter()
            .flat_map(|t| t.split(','))
            .filter(|t| is_port_token(t))
            .map(str::to_string)
            .collect();
        rows.push((first.to_string(), is_static, members));
    }
    rows
}

/// The earliest static logical port with no member ports.
pub fn free_logical_port(output: &str) -> Option<String> {
    parse_port_channel_brief(output)
        .into_iter()
        .find(|(_, is_static, members)| *is_static && members.is_empty())
        .map(|(port, _, _)| port)
}

/// The logical port whose members include `port`, if any.
pub fn logical_port_of(output: &str, port: &str) -> Option<String> {
    parse_port_channel_brief(output)
        .into_iter()
        .find(|(_, _, members)| members.iter().any(|m| m == port))
        .map(|(lo, _, _)| lo)
}

fn is_port_token(token: &str) -> bool {
    let mut parts = token.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => {
            !a.is_empty() && !b.is_empty() && a.bytes().all(|c| c.is_ascii_digit())
                && b.bytes().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

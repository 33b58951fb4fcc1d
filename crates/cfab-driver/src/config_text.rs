//! Config-text mining for the C-Fabric driver.
//!
//! The fabric exposes no structured API; every decision is made
//! against the running-config text fetched at the start of an
//! operation. All patterns live here, each with its own tests, and
//! every function is pure: config text in, indices or rows out.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use fabric_common::{FabricError, FabricResult, VfabId};

/// Valid ifgroup ids.
pub const IFGROUP_ID_MAX: u16 = 4094;

/// Valid link-aggregation ids.
pub const LAG_ID_MIN: u16 = 1;
pub const LAG_ID_MAX: u16 = 199;

/// Valid VFAB pprofile indices.
pub const PPROFILE_INDEX_MAX: u16 = 4095;

static IFGROUP_ETHER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^ifgroup (\d+) ether (\S+)").expect("Invalid regex pattern"));

static IFGROUP_LAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^ifgroup (\d+) linkaggregation (\d+) (\d+)").expect("Invalid regex pattern")
});

static LAG_DEF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^linkaggregation (\d+) (\d+) ").expect("Invalid regex pattern"));

static VFAB_VLAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^vfab (default|\d+) vlan (\d+) endpoint untag (\S+)")
        .expect("Invalid regex pattern")
});

static PPROFILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^pprofile (\S+) vlan tag (\S+)").expect("Invalid regex pattern"));

static VFAB_PPROFILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^vfab (default|\d+) pprofile (\d+) vsiid mac (\S+) (\S+)")
        .expect("Invalid regex pattern")
});

/// A `vfab ... vlan ... endpoint untag` membership row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfabVlanRow {
    pub vfab: String,
    pub vid: u16,
    /// Range-encoded ifgroup set.
    pub ifgroups: String,
}

/// A `vfab ... pprofile ... vsiid mac` binding row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfabPprofileRow {
    pub vfab: String,
    pub index: u16,
    pub mac: String,
    pub pprofile: String,
}

/// A `pprofile ... vlan tag ...` definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PprofileDef {
    pub name: String,
    /// The VLAN spec text, e.g. `2` or `2,3`.
    pub vlans: String,
}

/// Allocates the smallest free index in `lo..=hi` given `used`.
fn alloc_index(
    used: &BTreeSet<u16>,
    lo: u16,
    hi: u16,
    resource: &'static str,
) -> FabricResult<u16> {
    (lo..=hi)
        .find(|id| !used.contains(id))
        .ok_or(FabricError::NoAvailableIndex { resource })
}

/// Ifgroup ids already defined in the config.
pub fn used_ifgroup_ids(config: &str) -> BTreeSet<u16> {
    let mut used = BTreeSet::new();
    for cap in IFGROUP_ETHER_RE.captures_iter(config) {
        if let Ok(id) = cap[1].parse() {
            used.insert(id);
        }
    }
    for cap in IFGROUP_LAG_RE.captures_iter(config) {
        if let Ok(id) = cap[1].parse() {
            used.insert(id);
        }
    }
    used
}

/// Allocates the smallest free ifgroup id.
pub fn alloc_ifgroup_id(config: &str) -> FabricResult<u16> {
    alloc_index(&used_ifgroup_ids(config), 0, IFGROUP_ID_MAX, "ifgroup")
}

/// LAG ids already defined in `domain`.
pub fn used_lag_ids(config: &str, domain: u16) -> BTreeSet<u16> {
    let mut used = BTreeSet::new();
    for cap in LAG_DEF_RE.captures_iter(config) {
        if cap[1].parse() == Ok(domain) {
            if let Ok(id) = cap[2].parse() {
                used.insert(id);
            }
        }
    }
    for cap in IFGROUP_LAG_RE.captures_iter(config) {
        if cap[2].parse() == Ok(domain) {
            if let Ok(id) = cap[3].parse() {
                used.insert(id);
            }
        }
    }
    used
}

/// Allocates the smallest free LAG id in `domain`.
pub fn alloc_lag_id(config: &str, domain: u16) -> FabricResult<u16> {
    alloc_index(
        &used_lag_ids(config, domain),
        LAG_ID_MIN,
        LAG_ID_MAX,
        "linkaggregation",
    )
}

/// pprofile indices already bound in `vfab`.
pub fn used_pprofile_indices(config: &str, vfab: &VfabId) -> BTreeSet<u16> {
    vfab_pprofile_rows(config)
        .into_iter()
        .filter(|row| row.vfab == vfab.to_string())
        .map(|row| row.index)
        .collect()
}

/// Allocates the smallest free pprofile index in `vfab`.
pub fn alloc_pprofile_index(config: &str, vfab: &VfabId) -> FabricResult<u16> {
    alloc_index(
        &used_pprofile_indices(config, vfab),
        0,
        PPROFILE_INDEX_MAX,
        "vfab pprofile",
    )
}

/// All VFAB VLAN membership rows.
pub fn vfab_vlan_rows(config: &str) -> Vec<VfabVlanRow> {
    VFAB_VLAN_RE
        .captures_iter(config)
        .filter_map(|cap| {
            Some(VfabVlanRow {
                vfab: cap[1].to_string(),
                vid: cap[2].parse().ok()?,
                ifgroups: cap[3].to_string(),
            })
        })
        .collect()
}

/// All VFAB pprofile binding rows.
pub fn vfab_pprofile_rows(config: &str) -> Vec<VfabPprofileRow> {
    VFAB_PPROFILE_RE
        .captures_iter(config)
        .filter_map(|cap| {
            Some(VfabPprofileRow {
                vfab: cap[1].to_string(),
                index: cap[2].parse().ok()?,
                mac: cap[3].to_ascii_lowercase(),
                pprofile: cap[4].to_string(),
            })
        })
        .collect()
}

/// All pprofile definitions.
pub fn pprofile_definitions(config: &str) -> Vec<PprofileDef> {
    PPROFILE_RE
        .captures_iter(config)
        .map(|cap| PprofileDef {
            name: cap[1].to_string(),
            vlans: cap[2].to_string(),
        })
        .collect()
}

/// Splits a port name into its slot prefix and final index,
/// e.g. `1/1/0/3` → (`1/1/0`, 3).
fn split_port(port: &str) -> Option<(&str, u32)> {
    let (prefix, last) = port.rsplit_once('/')?;
    Some((prefix, last.parse().ok()?))
}

/// Returns true if a port-spec token (`p`, or `A-B` over full port
/// names) covers `port`.
fn token_covers_port(token: &str, port: &str) -> bool {
    if token == port {
        return true;
    }
    // A range between two full port names on the same slot prefix
    let Some((lo, hi)) = token.split_once('-') else {
        return false;
    };
    let (Some((lp, ln)), Some((hp, hn)), Some((pp, pn))) =
        (split_port(lo), split_port(hi), split_port(port))
    else {
        return false;
    };
    lp == pp && hp == pp && (ln..=hn).contains(&pn)
}

/// Ifgroups whose ether port spec covers `port`.
pub fn ifgroups_covering_port(config: &str, port: &str) -> BTreeSet<u16> {
    let mut ids = BTreeSet::new();
    for cap in IFGROUP_ETHER_RE.captures_iter(config) {
        let Ok(id) = cap[1].parse() else { continue };
        if cap[2].split(',').any(|token| token_covers_port(token, port)) {
            ids.insert(id);
        }
    }
    ids
}

/// Ifgroups pointing at link aggregation `(domain, lag)`.
pub fn ifgroups_for_lag(config: &str, domain: u16, lag: u16) -> BTreeSet<u16> {
    let mut ids = BTreeSet::new();
    for cap in IFGROUP_LAG_RE.captures_iter(config) {
        if cap[2].parse() == Ok(domain) && cap[3].parse() == Ok(lag) {
            if let Ok(id) = cap[1].parse() {
                ids.insert(id);
            }
        }
    }
    ids
}

/// Finds an existing ifgroup whose ether spec equals `ports` exactly.
pub fn find_ifgroup_exact(config: &str, ports: &str) -> Option<u16> {
    IFGROUP_ETHER_RE
        .captures_iter(config)
        .filter(|cap| &cap[2] == ports)
        .filter_map(|cap| cap[1].parse().ok())
        .next()
}

/// Finds an existing ifgroup pointing at exactly `(domain, lag)`.
pub fn find_ifgroup_for_lag(config: &str, domain: u16, lag: u16) -> Option<u16> {
    ifgroups_for_lag(config, domain, lag).into_iter().next()
}

/// The link aggregation `port` is attached to, from its interface
/// block, if any.
pub fn lag_of_port(config: &str, port: &str) -> Option<u16> {
    let mut in_block = false;
    for line in config.lines() {
        let trimmed = line.trim();
        if let Some(spec) = trimmed
            .strip_prefix("interface range ")
            .or_else(|| trimmed.strip_prefix("interface "))
        {
            in_block = spec.split(',').any(|token| token_covers_port(token, port));
            continue;
        }
        if in_block {
            if trimmed == "exit" {
                in_block = false;
            } else if let Some(lag) = trimmed.strip_prefix("type linkaggregation ") {
                return lag.trim().parse().ok();
            }
        }
    }
    None
}

/// Outcome of pprofile name selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PprofileSelection {
    /// The profile name to bind.
    pub name: String,
    /// True when the profile must be (re)defined for this VLAN.
    pub needs_define: bool,
}

/// Chooses the pprofile name for `(vlan, mac)`.
///
/// Shared mode names profiles per VLAN (`{prefix}{vlan}`); a name
/// collision with a different VLAN set increments the numeric suffix
/// until a free or matching name is found (the name is opaque, the
/// increment only buys uniqueness). Unshared mode names profiles per
/// MAC and overrides a stale VLAN binding in place.
pub fn select_pprofile_name(
    config: &str,
    prefix: &str,
    share: bool,
    vlan: u16,
    mac: &str,
) -> FabricResult<PprofileSelection> {
    let defs = pprofile_definitions(config);
    let lookup = |name: &str| defs.iter().find(|d| d.name == name).map(|d| d.vlans.clone());
    let wanted = vlan.to_string();

    if share {
        let mut suffix = vlan as u32;
        for _ in 0..=PPROFILE_INDEX_MAX as u32 {
            let name = format!("{}{}", prefix, suffix);
            match lookup(&name) {
                None => {
                    return Ok(PprofileSelection {
                        name,
                        needs_define: true,
                    })
                }
                Some(vlans) if vlans == wanted => {
                    return Ok(PprofileSelection {
                        name,
                        needs_define: false,
                    })
                }
                Some(_) => suffix += 1,
            }
        }
        Err(FabricError::NoAvailableIndex {
            resource: "pprofile name",
        })
    } else {
        let name = format!("{}{}", prefix, mac);
        let needs_define = lookup(&name).map(|vlans| vlans != wanted).unwrap_or(true);
        Ok(PprofileSelection { name, needs_define })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
ifgroup 0 ether 1/1/0/1,1/1/0/2
ifgroup 1 ether 1/1/0/5-1/1/0/8
ifgroup 2 linkaggregation 1 3
linkaggregation 1 3 type endpoint
linkaggregation 1 3 mode active
linkaggregation 1 3 cfab port-mode external
interface range 1/1/0/11,1/1/0/12
    type linkaggregation 3
    exit
interface 1/1/0/1
    type endpoint
    cfab port-mode external
    exit
vfab 1 vlan 8 endpoint untag 0,2
vfab default vlan 16 endpoint untag 1
pprofile test-2 vlan tag 2
vfab 3 pprofile 0 vsiid mac 00:00:00:00:00:01 test-2
";

    #[test]
    fn test_used_ifgroup_ids() {
        let used = used_ifgroup_ids(SAMPLE);
        assert_eq!(used, [0, 1, 2].into_iter().collect());
    }

    #[test]
    fn test_alloc_ifgroup_takes_smallest_free() {
        assert_eq!(alloc_ifgroup_id(SAMPLE).unwrap(), 3);
        assert_eq!(alloc_ifgroup_id("").unwrap(), 0);
    }

    #[test]
    fn test_alloc_ifgroup_exhaustion() {
        let mut config = String::new();
        for id in 0..=IFGROUP_ID_MAX {
            config.push_str(&format!("ifgroup {} ether 1/1/0/1\n", id));
        }
        assert!(matches!(
            alloc_ifgroup_id(&config),
            Err(FabricError::NoAvailableIndex { resource: "ifgroup" })
        ));
    }

    #[test]
    fn test_used_and_alloc_lag_ids() {
        assert_eq!(used_lag_ids(SAMPLE, 1), [3].into_iter().collect());
        assert_eq!(alloc_lag_id(SAMPLE, 1).unwrap(), 1);
        assert_eq!(alloc_lag_id("", 1).unwrap(), 1);
        // Other domains are independent
        assert!(used_lag_ids(SAMPLE, 2).is_empty());
    }

    #[test]
    fn test_vfab_vlan_rows() {
        let rows = vfab_vlan_rows(SAMPLE);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].vfab, "1");
        assert_eq!(rows[0].vid, 8);
        assert_eq!(rows[0].ifgroups, "0,2");
        assert_eq!(rows[1].vfab, "default");
    }

    #[test]
    fn test_vfab_pprofile_rows() {
        let rows = vfab_pprofile_rows(SAMPLE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].vfab, "3");
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[0].mac, "00:00:00:00:00:01");
        assert_eq!(rows[0].pprofile, "test-2");
    }

    #[test]
    fn test_alloc_pprofile_index() {
        assert_eq!(alloc_pprofile_index(SAMPLE, &VfabId::Id(3)).unwrap(), 1);
        assert_eq!(alloc_pprofile_index(SAMPLE, &VfabId::Id(1)).unwrap(), 0);
    }

    #[test]
    fn test_ifgroups_covering_port_literal_and_range() {
        assert_eq!(
            ifgroups_covering_port(SAMPLE, "1/1/0/2"),
            [0].into_iter().collect()
        );
        assert_eq!(
            ifgroups_covering_port(SAMPLE, "1/1/0/6"),
            [1].into_iter().collect()
        );
        assert!(ifgroups_covering_port(SAMPLE, "1/1/0/9").is_empty());
        // A different slot prefix never matches the range
        assert!(ifgroups_covering_port(SAMPLE, "2/1/0/6").is_empty());
    }

    #[test]
    fn test_ifgroups_for_lag() {
        assert_eq!(ifgroups_for_lag(SAMPLE, 1, 3), [2].into_iter().collect());
        assert!(ifgroups_for_lag(SAMPLE, 1, 4).is_empty());
    }

    #[test]
    fn test_find_ifgroup_exact() {
        assert_eq!(find_ifgroup_exact(SAMPLE, "1/1/0/1,1/1/0/2"), Some(0));
        assert_eq!(find_ifgroup_exact(SAMPLE, "1/1/0/1"), None);
    }

    #[test]
    fn test_lag_of_port() {
        assert_eq!(lag_of_port(SAMPLE, "1/1/0/11"), Some(3));
        assert_eq!(lag_of_port(SAMPLE, "1/1/0/12"), Some(3));
        assert_eq!(lag_of_port(SAMPLE, "1/1/0/1"), None);
    }

    #[test]
    fn test_select_pprofile_shared_reuses_matching() {
        let sel = select_pprofile_name(SAMPLE, "test-", true, 2, "aa:bb").unwrap();
        assert_eq!(sel.name, "test-2");
        assert!(!sel.needs_define);
    }

    #[test]
    fn test_select_pprofile_shared_increments_on_collision() {
        // test-2 is taken by VLAN 2; asking for VLAN 3 with a config
        // where test-3 binds a different VLAN forces test-4
        let config = "pprofile test-3 vlan tag 7\n";
        let sel = select_pprofile_name(config, "test-", true, 3, "aa:bb").unwrap();
        assert_eq!(sel.name, "test-4");
        assert!(sel.needs_define);
    }

    #[test]
    fn test_select_pprofile_unshared_per_mac() {
        let sel =
            select_pprofile_name(SAMPLE, "p-", false, 8, "00:01:02:03:04:05").unwrap();
        assert_eq!(sel.name, "p-00:01:02:03:04:05");
        assert!(sel.needs_define);

        let config = "pprofile p-00:01:02:03:04:05 vlan tag 8\n";
        let sel = select_pprofile_name(config, "p-", false, 8, "00:01:02:03:04:05").unwrap();
        assert!(!sel.needs_define);

        // Stale binding gets overridden in place
        let config = "pprofile p-00:01:02:03:04:05 vlan tag 9\n";
        let sel = select_pprofile_name(config, "p-", false, 8, "00:01:02:03:04:05").unwrap();
        assert_eq!(sel.name, "p-00:01:02:03:04:05");
        assert!(sel.needs_define);
    }
}

//! C-Fabric VLAN and port-profile policy driver.
//!
//! Every operation takes the fabric lock, fetches a fresh
//! running-config snapshot, computes the full command batch against
//! it, and submits the batch in a single `configure` call with the
//! commit at the end — a fault before the commit leaves the switch in
//! its pre-operation state. Snapshots are never cached across
//! operations: another administrator may be editing the switch.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use fabric_common::{FabricResult, VfabId};
use fabric_session::{LockRegistry, FABRIC_LOCK};

use crate::cli::CfabCli;
use crate::commands::{
    ifgroup_ether, ifgroup_lag, interface_endpoint_block, interface_lag_block,
    interface_reset_block, lag_endpoint_params, no_lag, no_pprofile, no_vfab_pprofile,
    no_vfab_vlan, pprofile_vlan, vfab_pprofile, vfab_vlan, LAG_DOMAIN,
};
use crate::config_text::{
    alloc_ifgroup_id, alloc_lag_id, alloc_pprofile_index, find_ifgroup_exact,
    ifgroups_covering_port, ifgroups_for_lag, lag_of_port, select_pprofile_name,
    vfab_pprofile_rows, vfab_vlan_rows,
};
use crate::ranges;

/// Policy settings carried from the `fujitsu_cfab` group.
#[derive(Debug, Clone)]
pub struct PprofilePolicy {
    /// One profile per VLAN instead of one per MAC.
    pub share: bool,
    /// Prefix for generated profile names.
    pub prefix: String,
}

/// VLAN/pprofile driver over one fabric CLI session.
pub struct FabricVlanDriver<C: CfabCli> {
    cli: C,
    policy: PprofilePolicy,
    locks: Arc<LockRegistry>,
}

impl<C: CfabCli> FabricVlanDriver<C> {
    /// Creates a driver over an established CLI manager.
    pub fn new(cli: C, policy: PprofilePolicy, locks: Arc<LockRegistry>) -> Self {
        Self { cli, policy, locks }
    }

    /// Closes the session after an operation, logging close faults
    /// so the operation result wins.
    async fn finish(&mut self, result: FabricResult<()>) -> FabricResult<()> {
        if let Err(e) = self.cli.close_session().await {
            warn!(error = %e, "Error closing fabric session");
        }
        result
    }

    /// Binds `mac` to the pprofile carrying `vlan` in `vfab`.
    ///
    /// Idempotent: a second identical call finds both rows in place
    /// and emits no commands.
    #[instrument(skip(self))]
    pub async fn associate_mac_to_network(
        &mut self,
        vfab: &VfabId,
        vlan: u16,
        mac: &str,
    ) -> FabricResult<()> {
        let lock = self.locks.lock_for(FABRIC_LOCK);
        let _guard = lock.lock().await;
        let result = self.associate_inner(vfab, vlan, &mac.to_ascii_lowercase()).await;
        self.finish(result).await
    }

    async fn associate_inner(&mut self, vfab: &VfabId, vlan: u16, mac: &str) -> FabricResult<()> {
        let running = self.cli.get_running_config(None).await?;
        let selection =
            select_pprofile_name(&running, &self.policy.prefix, self.policy.share, vlan, mac)?;

        let mut cmds = Vec::new();
        if selection.needs_define {
            cmds.push(pprofile_vlan(&selection.name, vlan));
        }

        let rows = vfab_pprofile_rows(&running);
        let existing = rows
            .iter()
            .find(|row| row.vfab == vfab.to_string() && row.mac == mac);
        match existing {
            Some(row) if row.pprofile == selection.name => {
                debug!(mac = %mac, profile = %selection.name, "Binding already in place");
            }
            Some(row) => {
                cmds.push(vfab_pprofile(vfab, row.index, mac, &selection.name));
            }
            None => {
                let index = alloc_pprofile_index(&running, vfab)?;
                cmds.push(vfab_pprofile(vfab, index, mac, &selection.name));
            }
        }

        if cmds.is_empty() {
            return Ok(());
        }
        self.cli.configure(&cmds, true).await?;
        info!(vfab = %vfab, vlan, mac = %mac, "Associated MAC to network");
        Ok(())
    }

    /// Removes the `(vfab, mac)` binding; when the profile is no
    /// longer referenced by any VFAB its definition goes too.
    #[instrument(skip(self))]
    pub async fn dissociate_mac_from_network(
        &mut self,
        vfab: &VfabId,
        vlan: u16,
        mac: &str,
    ) -> FabricResult<()> {
        let lock = self.locks.lock_for(FABRIC_LOCK);
        let _guard = lock.lock().await;
        let result = self.dissociate_inner(vfab, vlan, &mac.to_ascii_lowercase()).await;
        self.finish(result).await
    }

    async fn dissociate_inner(&mut self, vfab: &VfabId, vlan: u16, mac: &str) -> FabricResult<()> {
        let running = self.cli.get_running_config(None).await?;
        let rows = vfab_pprofile_rows(&running);
        let Some(row) = rows
            .iter()
            .find(|row| row.vfab == vfab.to_string() && row.mac == mac)
        else {
            debug!(vfab = %vfab, mac = %mac, "No binding to dissociate");
            return Ok(());
        };

        let mut cmds = vec![no_vfab_pprofile(vfab, row.index)];
        let references = rows.iter().filter(|r| r.pprofile == row.pprofile).count();
        if references == 1 {
            cmds.push(no_pprofile(&row.pprofile));
        }

        self.cli.configure(&cmds, true).await?;
        info!(vfab = %vfab, vlan, mac = %mac, "Dissociated MAC from network");
        Ok(())
    }

    /// Puts `ports` into the untagged membership of `(vfab, vlan)` as
    /// endpoint interfaces, cleaning up any prior definitions first.
    #[instrument(skip(self, ports))]
    pub async fn setup_vlan(
        &mut self,
        vfab: &VfabId,
        vlan: u16,
        ports: &[String],
        mac: &str,
    ) -> FabricResult<()> {
        let lock = self.locks.lock_for(FABRIC_LOCK);
        let _guard = lock.lock().await;
        let result = self.setup_vlan_inner(vfab, vlan, ports, mac).await;
        self.finish(result).await
    }

    async fn setup_vlan_inner(
        &mut self,
        vfab: &VfabId,
        vlan: u16,
        ports: &[String],
        mac: &str,
    ) -> FabricResult<()> {
        let running = self.cli.get_running_config(None).await?;
        let joined = ports.join(",");

        let mut cmds = cleanup_definitions(&running, ports);

        let ifgroup = match find_ifgroup_exact(&running, &joined) {
            Some(id) => id,
            None => {
                let id = alloc_ifgroup_id(&running)?;
                cmds.push(ifgroup_ether(id, &joined));
                id
            }
        };

        cmds.extend(interface_endpoint_block(&joined));
        if let Some(cmd) = membership_command(&running, vfab, vlan, ifgroup)? {
            cmds.push(cmd);
        }

        self.cli.configure(&cmds, true).await?;
        info!(vfab = %vfab, vlan, ports = %joined, mac = %mac, "VLAN set up");
        Ok(())
    }

    /// As `setup_vlan`, but bundles `ports` into a new link
    /// aggregation and points the ifgroup at the LAG.
    #[instrument(skip(self, ports))]
    pub async fn setup_vlan_with_lag(
        &mut self,
        vfab: &VfabId,
        vlan: u16,
        ports: &[String],
        mac: &str,
    ) -> FabricResult<()> {
        let lock = self.locks.lock_for(FABRIC_LOCK);
        let _guard = lock.lock().await;
        let result = self.setup_vlan_with_lag_inner(vfab, vlan, ports, mac).await;
        self.finish(result).await
    }

    async fn setup_vlan_with_lag_inner(
        &mut self,
        vfab: &VfabId,
        vlan: u16,
        ports: &[String],
        mac: &str,
    ) -> FabricResult<()> {
        let running = self.cli.get_running_config(None).await?;
        let joined = ports.join(",");

        let mut cmds = cleanup_definitions(&running, ports);

        let lag = alloc_lag_id(&running, LAG_DOMAIN)?;
        cmds.extend(lag_endpoint_params(LAG_DOMAIN, lag));

        let ifgroup = alloc_ifgroup_id(&running)?;
        cmds.push(ifgroup_lag(ifgroup, LAG_DOMAIN, lag));

        cmds.extend(interface_lag_block(&joined, lag));
        if let Some(cmd) = membership_command(&running, vfab, vlan, ifgroup)? {
            cmds.push(cmd);
        }

        self.cli.configure(&cmds, true).await?;
        info!(vfab = %vfab, vlan, ports = %joined, mac = %mac, lag, "VLAN with LAG set up");
        Ok(())
    }

    /// Removes `ports` from the `(vfab, vlan)` membership and resets
    /// their interface definitions. Ifgroups are deliberately kept:
    /// the driver cannot prove sole ownership.
    #[instrument(skip(self, ports))]
    pub async fn clear_vlan(
        &mut self,
        vfab: &VfabId,
        vlan: u16,
        ports: &[String],
        mac: &str,
    ) -> FabricResult<()> {
        let lock = self.locks.lock_for(FABRIC_LOCK);
        let _guard = lock.lock().await;
        let result = self.clear_vlan_inner(vfab, vlan, ports, mac).await;
        self.finish(result).await
    }

    async fn clear_vlan_inner(
        &mut self,
        vfab: &VfabId,
        vlan: u16,
        ports: &[String],
        mac: &str,
    ) -> FabricResult<()> {
        let running = self.cli.get_running_config(None).await?;
        let joined = ports.join(",");

        let mut ifgroups = BTreeSet::new();
        for port in ports {
            ifgroups.extend(ifgroups_covering_port(&running, port));
        }

        let mut cmds = eliminate_membership(&running, vfab, vlan, &ifgroups)?;
        cmds.extend(interface_reset_block(&joined));

        self.cli.configure(&cmds, true).await?;
        info!(vfab = %vfab, vlan, ports = %joined, mac = %mac, "VLAN cleared");
        Ok(())
    }

    /// As `clear_vlan`, but also tears down the link aggregation the
    /// ports were bundled into.
    #[instrument(skip(self, ports))]
    pub async fn clear_vlan_with_lag(
        &mut self,
        vfab: &VfabId,
        vlan: u16,
        ports: &[String],
        mac: &str,
    ) -> FabricResult<()> {
        let lock = self.locks.lock_for(FABRIC_LOCK);
        let _guard = lock.lock().await;
        let result = self.clear_vlan_with_lag_inner(vfab, vlan, ports, mac).await;
        self.finish(result).await
    }

    async fn clear_vlan_with_lag_inner(
        &mut self,
        vfab: &VfabId,
        vlan: u16,
        ports: &[String],
        mac: &str,
    ) -> FabricResult<()> {
        let running = self.cli.get_running_config(None).await?;
        let joined = ports.join(",");

        let mut lags = BTreeSet::new();
        for port in ports {
            if let Some(lag) = lag_of_port(&running, port) {
                lags.insert(lag);
            }
        }
        let mut ifgroups = BTreeSet::new();
        for &lag in &lags {
            ifgroups.extend(ifgroups_for_lag(&running, LAG_DOMAIN, lag));
        }

        let mut cmds = eliminate_membership(&running, vfab, vlan, &ifgroups)?;
        cmds.extend(interface_reset_block(&joined));
        for &lag in &lags {
            cmds.push(no_lag(LAG_DOMAIN, lag));
        }

        self.cli.configure(&cmds, true).await?;
        info!(vfab = %vfab, vlan, ports = %joined, mac = %mac, "VLAN with LAG cleared");
        Ok(())
    }
}

/// Commands removing every prior definition touching `ports`:
/// interface type and port mode, enclosing VLAN memberships, and any
/// link aggregation the ports were attached to.
fn cleanup_definitions(running: &str, ports: &[String]) -> Vec<String> {
    let joined = ports.join(",");
    let mut cmds = interface_reset_block(&joined);

    let mut ifgroups = BTreeSet::new();
    for port in ports {
        ifgroups.extend(ifgroups_covering_port(running, port));
    }
    let mut lags = BTreeSet::new();
    for port in ports {
        if let Some(lag) = lag_of_port(running, port) {
            lags.insert(lag);
        }
    }
    for &lag in &lags {
        ifgroups.extend(ifgroups_for_lag(running, LAG_DOMAIN, lag));
    }

    for row in vfab_vlan_rows(running) {
        let members: Vec<u16> = ifgroups
            .iter()
            .copied()
            .filter(|&id| ranges::contains_val(&row.ifgroups, id).unwrap_or(false))
            .collect();
        if members.is_empty() {
            continue;
        }
        let mut reduced = row.ifgroups.clone();
        for id in members {
            if let Ok(r) = ranges::eliminate_val(&reduced, id) {
                reduced = r;
            }
        }
        let vfab = parse_vfab(&row.vfab);
        if reduced.is_empty() {
            cmds.push(no_vfab_vlan(&vfab, row.vid));
        } else {
            cmds.push(vfab_vlan(&vfab, row.vid, &reduced));
        }
    }

    for &lag in &lags {
        cmds.push(no_lag(LAG_DOMAIN, lag));
    }

    cmds
}

/// The command adding `ifgroup` to the `(vfab, vlan)` untagged
/// membership: a fresh row, an extended range expression, or nothing
/// when the ifgroup is already a member.
fn membership_command(
    running: &str,
    vfab: &VfabId,
    vlan: u16,
    ifgroup: u16,
) -> FabricResult<Option<String>> {
    match vfab_vlan_rows(running)
        .into_iter()
        .find(|row| row.vfab == vfab.to_string() && row.vid == vlan)
    {
        Some(row) => {
            if ranges::contains_val(&row.ifgroups, ifgroup)? {
                Ok(None)
            } else {
                let extended = ranges::insert_val(&row.ifgroups, ifgroup)?;
                Ok(Some(vfab_vlan(vfab, vlan, &extended)))
            }
        }
        None => Ok(Some(vfab_vlan(vfab, vlan, &ifgroup.to_string()))),
    }
}

/// Commands removing `ifgroups` from the `(vfab, vlan)` membership:
/// the whole row when nothing remains, a rewritten range otherwise.
fn eliminate_membership(
    running: &str,
    vfab: &VfabId,
    vlan: u16,
    ifgroups: &BTreeSet<u16>,
) -> FabricResult<Vec<String>> {
    let mut cmds = Vec::new();
    for row in vfab_vlan_rows(running) {
        if row.vfab != vfab.to_string() || row.vid != vlan {
            continue;
        }
        let mut reduced = row.ifgroups.clone();
        let mut touched = false;
        for &id in ifgroups {
            if ranges::contains_val(&reduced, id)? {
                reduced = ranges::eliminate_val(&reduced, id)?;
                touched = true;
            }
        }
        if !touched {
            continue;
        }
        if reduced.is_empty() {
            cmds.push(no_vfab_vlan(vfab, vlan));
        } else {
            cmds.push(vfab_vlan(vfab, vlan, &reduced));
        }
    }
    Ok(cmds)
}

fn parse_vfab(text: &str) -> VfabId {
    if text == "default" {
        VfabId::Default
    } else {
        text.parse::<u16>().map(VfabId::Id).unwrap_or(VfabId::Default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    /// Mock CLI serving a canned running-config and capturing every
    /// configure batch with its commit flag.
    struct MockCli {
        running: String,
        batches: Vec<(Vec<String>, bool)>,
        closed: usize,
    }

    impl MockCli {
        fn with_config(running: &str) -> Self {
            Self {
                running: running.to_string(),
                batches: Vec::new(),
                closed: 0,
            }
        }

        fn commands(&self) -> Vec<String> {
            self.batches
                .iter()
                .flat_map(|(cmds, _)| cmds.clone())
                .collect()
        }
    }

    #[async_trait]
    impl CfabCli for MockCli {
        async fn get_running_config(&mut self, _prefix: Option<&str>) -> FabricResult<String> {
            Ok(self.running.clone())
        }

        async fn get_candidate_config(&mut self, _prefix: Option<&str>) -> FabricResult<String> {
            Ok(self.running.clone())
        }

        async fn configure(&mut self, cmds: &[String], commit: bool) -> FabricResult<()> {
            self.batches.push((cmds.to_vec(), commit));
            Ok(())
        }

        async fn close_session(&mut self) -> FabricResult<()> {
            self.closed += 1;
            Ok(())
        }
    }

    fn driver(running: &str, share: bool, prefix: &str) -> FabricVlanDriver<MockCli> {
        FabricVlanDriver::new(
            MockCli::with_config(running),
            PprofilePolicy {
                share,
                prefix: prefix.to_string(),
            },
            Arc::new(LockRegistry::new()),
        )
    }

    fn ports(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_setup_vlan_on_empty_switch() {
        let mut drv = driver("", false, "");
        drv.setup_vlan(&VfabId::Id(1), 8, &ports(&["1/1/0/1"]), "00:01:02:03:04:05")
            .await
            .unwrap();

        let cli = &drv.cli;
        assert_eq!(cli.batches.len(), 1);
        let (cmds, commit) = &cli.batches[0];
        assert!(commit);
        assert_eq!(
            cmds,
            &vec![
                // prior definitions reset
                "interface range 1/1/0/1".to_string(),
                "no type".to_string(),
                "no cfab port-mode".to_string(),
                "exit".to_string(),
                // fresh ifgroup, endpoint wiring, membership
                "ifgroup 0 ether 1/1/0/1".to_string(),
                "interface range 1/1/0/1".to_string(),
                "type endpoint".to_string(),
                "cfab port-mode external".to_string(),
                "exit".to_string(),
                "vfab 1 vlan 8 endpoint untag 0".to_string(),
            ]
        );
        assert_eq!(cli.closed, 1);
    }

    #[tokio::test]
    async fn test_setup_vlan_with_lag_on_empty_switch() {
        let mut drv = driver("", false, "");
        drv.setup_vlan_with_lag(
            &VfabId::Id(1),
            8,
            &ports(&["1/1/0/1", "1/1/0/2"]),
            "00:01:02:03:04:05",
        )
        .await
        .unwrap();

        let (cmds, commit) = &drv.cli.batches[0];
        assert!(commit);
        assert_eq!(
            cmds,
            &vec![
                "interface range 1/1/0/1,1/1/0/2".to_string(),
                "no type".to_string(),
                "no cfab port-mode".to_string(),
                "exit".to_string(),
                "linkaggregation 1 1 type endpoint".to_string(),
                "linkaggregation 1 1 mode active".to_string(),
                "linkaggregation 1 1 cfab port-mode external".to_string(),
                "ifgroup 0 linkaggregation 1 1".to_string(),
                "interface range 1/1/0/1,1/1/0/2".to_string(),
                "type linkaggregation 1".to_string(),
                "exit".to_string(),
                "vfab 1 vlan 8 endpoint untag 0".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_setup_vlan_reuses_ifgroup_and_extends_membership() {
        let running = "\
ifgroup 0 ether 1/1/0/5
ifgroup 1 ether 1/1/0/1
vfab 1 vlan 8 endpoint untag 0
";
        let mut drv = driver(running, false, "");
        drv.setup_vlan(&VfabId::Id(1), 8, &ports(&["1/1/0/1"]), "00:01:02:03:04:05")
            .await
            .unwrap();

        let cmds = drv.cli.commands();
        // ifgroup 1 matches exactly, so no new definition is emitted
        assert!(!cmds.iter().any(|c| c.starts_with("ifgroup")));
        // The membership row is extended with the reused ifgroup
        assert!(cmds.contains(&"vfab 1 vlan 8 endpoint untag 0-1".to_string()));
    }

    #[tokio::test]
    async fn test_setup_cleans_prior_lag_and_membership() {
        let running = "\
ifgroup 0 linkaggregation 1 2
linkaggregation 1 2 type endpoint
interface range 1/1/0/1,1/1/0/2
    type linkaggregation 2
    exit
vfab 1 vlan 8 endpoint untag 0
";
        let mut drv = driver(running, false, "");
        drv.setup_vlan(&VfabId::Id(1), 16, &ports(&["1/1/0/1"]), "00:01:02:03:04:05")
            .await
            .unwrap();

        let cmds = drv.cli.commands();
        // Prior membership rows referencing the stale ifgroup go away
        assert!(cmds.contains(&"no vfab 1 vlan 8 endpoint untag".to_string()));
        // The stale LAG is removed
        assert!(cmds.contains(&"no linkaggregation 1 2".to_string()));
        // And the fresh definitions follow
        assert!(cmds.contains(&"ifgroup 1 ether 1/1/0/1".to_string()));
        assert!(cmds.contains(&"vfab 1 vlan 16 endpoint untag 1".to_string()));
    }

    #[tokio::test]
    async fn test_clear_vlan_eliminates_ifgroup_from_range() {
        let running = "\
ifgroup 3 ether 1/1/0/1
vfab 1 vlan 8 endpoint untag 2-4
";
        let mut drv = driver(running, false, "");
        drv.clear_vlan(&VfabId::Id(1), 8, &ports(&["1/1/0/1"]), "00:01:02:03:04:05")
            .await
            .unwrap();

        let cmds = drv.cli.commands();
        assert!(cmds.contains(&"vfab 1 vlan 8 endpoint untag 2,4".to_string()));
        // Ifgroups are never deleted
        assert!(!cmds.iter().any(|c| c.starts_with("no ifgroup")));
    }

    #[tokio::test]
    async fn test_clear_vlan_removes_membership_entirely() {
        let running = "\
ifgroup 0 ether 1/1/0/1
vfab 1 vlan 8 endpoint untag 0
";
        let mut drv = driver(running, false, "");
        drv.clear_vlan(&VfabId::Id(1), 8, &ports(&["1/1/0/1"]), "00:01:02:03:04:05")
            .await
            .unwrap();

        let cmds = drv.cli.commands();
        assert!(cmds.contains(&"no vfab 1 vlan 8 endpoint untag".to_string()));
    }

    #[tokio::test]
    async fn test_clear_vlan_with_lag_tears_down_lag() {
        let running = "\
ifgroup 0 linkaggregation 1 1
linkaggregation 1 1 type endpoint
interface range 1/1/0/1,1/1/0/2
    type linkaggregation 1
    exit
vfab 1 vlan 8 endpoint untag 0
";
        let mut drv = driver(running, false, "");
        drv.clear_vlan_with_lag(
            &VfabId::Id(1),
            8,
            &ports(&["1/1/0/1", "1/1/0/2"]),
            "00:01:02:03:04:05",
        )
        .await
        .unwrap();

        let (cmds, commit) = &drv.cli.batches[0];
        assert!(commit);
        assert_eq!(
            cmds,
            &vec![
                "no vfab 1 vlan 8 endpoint untag".to_string(),
                "interface range 1/1/0/1,1/1/0/2".to_string(),
                "no type".to_string(),
                "no cfab port-mode".to_string(),
                "exit".to_string(),
                "no linkaggregation 1 1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_associate_with_shared_profile_reuses_definition() {
        let running = "\
pprofile test-2 vlan tag 2
vfab 3 pprofile 0 vsiid mac 00:00:00:00:00:01 test-2
";
        let mut drv = driver(running, true, "test-");
        drv.associate_mac_to_network(&VfabId::Id(3), 2, "00:01:02:03:04:05")
            .await
            .unwrap();

        let (cmds, commit) = &drv.cli.batches[0];
        assert!(commit);
        assert_eq!(
            cmds,
            &vec!["vfab 3 pprofile 1 vsiid mac 00:01:02:03:04:05 test-2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_associate_is_idempotent() {
        let running = "\
pprofile test-2 vlan tag 2
vfab 3 pprofile 0 vsiid mac 00:01:02:03:04:05 test-2
";
        let mut drv = driver(running, true, "test-");
        drv.associate_mac_to_network(&VfabId::Id(3), 2, "00:01:02:03:04:05")
            .await
            .unwrap();

        // Both rows are already in place: no batch at all
        assert!(drv.cli.batches.is_empty());
        assert_eq!(drv.cli.closed, 1);
    }

    #[tokio::test]
    async fn test_associate_creates_profile_when_absent() {
        let mut drv = driver("", true, "test-");
        drv.associate_mac_to_network(&VfabId::Id(3), 2, "00:01:02:03:04:05")
            .await
            .unwrap();

        let (cmds, _) = &drv.cli.batches[0];
        assert_eq!(
            cmds,
            &vec![
                "pprofile test-2 vlan tag 2".to_string(),
                "vfab 3 pprofile 0 vsiid mac 00:01:02:03:04:05 test-2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_associate_overwrites_stale_binding() {
        let running = "\
pprofile test-2 vlan tag 2
pprofile test-9 vlan tag 9
vfab 3 pprofile 5 vsiid mac 00:01:02:03:04:05 test-9
";
        let mut drv = driver(running, true, "test-");
        drv.associate_mac_to_network(&VfabId::Id(3), 2, "00:01:02:03:04:05")
            .await
            .unwrap();

        // The stale row is overwritten in place at its old index
        let (cmds, _) = &drv.cli.batches[0];
        assert_eq!(
            cmds,
            &vec!["vfab 3 pprofile 5 vsiid mac 00:01:02:03:04:05 test-2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_dissociate_last_user_drops_profile() {
        let running = "\
pprofile test-1 vlan tag 1
vfab 3 pprofile 0 vsiid mac 00:01:02:03:04:05 test-1
";
        let mut drv = driver(running, true, "test-");
        drv.dissociate_mac_from_network(&VfabId::Id(3), 1, "00:01:02:03:04:05")
            .await
            .unwrap();

        let (cmds, commit) = &drv.cli.batches[0];
        assert!(commit);
        assert_eq!(
            cmds,
            &vec![
                "no vfab 3 pprofile 0".to_string(),
                "no pprofile test-1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_dissociate_keeps_profile_with_other_references() {
        let running = "\
pprofile test-1 vlan tag 1
vfab 3 pprofile 0 vsiid mac 00:01:02:03:04:05 test-1
vfab 4 pprofile 0 vsiid mac 00:00:00:00:00:09 test-1
";
        let mut drv = driver(running, true, "test-");
        drv.dissociate_mac_from_network(&VfabId::Id(3), 1, "00:01:02:03:04:05")
            .await
            .unwrap();

        let (cmds, _) = &drv.cli.batches[0];
        assert_eq!(cmds, &vec!["no vfab 3 pprofile 0".to_string()]);
    }

    #[tokio::test]
    async fn test_dissociate_missing_binding_is_noop() {
        let mut drv = driver("", true, "test-");
        drv.dissociate_mac_from_network(&VfabId::Id(3), 1, "00:01:02:03:04:05")
            .await
            .unwrap();
        assert!(drv.cli.batches.is_empty());
    }

    #[tokio::test]
    async fn test_commit_boundary_single_batch() {
        let mut drv = driver("", false, "");
        drv.setup_vlan(&VfabId::Id(1), 8, &ports(&["1/1/0/1"]), "00:01:02:03:04:05")
            .await
            .unwrap();

        // Exactly one configure call, and it carries the commit
        let commits: Vec<bool> = drv.cli.batches.iter().map(|(_, c)| *c).collect();
        assert_eq!(commits, vec![true]);
    }

    #[tokio::test]
    async fn test_session_closed_on_failure_path() {
        struct FailingCli {
            closed: usize,
        }

        #[async_trait]
        impl CfabCli for FailingCli {
            async fn get_running_config(&mut self, _p: Option<&str>) -> FabricResult<String> {
                Err(fabric_common::FabricError::transport("cfx", "boom"))
            }
            async fn get_candidate_config(&mut self, _p: Option<&str>) -> FabricResult<String> {
                unreachable!()
            }
            async fn configure(&mut self, _c: &[String], _commit: bool) -> FabricResult<()> {
                unreachable!()
            }
            async fn close_session(&mut self) -> FabricResult<()> {
                self.closed += 1;
                Ok(())
            }
        }

        let mut drv = FabricVlanDriver::new(
            FailingCli { closed: 0 },
            PprofilePolicy {
                share: false,
                prefix: String::new(),
            },
            Arc::new(LockRegistry::new()),
        );
        let err = drv
            .setup_vlan(&VfabId::Id(1), 8, &ports(&["1/1/0/1"]), "00:01:02:03:04:05")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        // The session was still closed on the failure path
        assert_eq!(drv.cli.closed, 1);
    }
}

//! Hardware-VTEP programming for VXLAN networks.
//!
//! Each FOS switch exposes the hardware_vtep OVSDB schema; binding a
//! port to an overlay touches the target switch (Physical_Port and
//! Ucast_Macs_Local) and fans out Ucast_Macs_Remote rows to every
//! other switch in the fleet so the MAC is reachable fabric-wide.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use fabric_common::{
    normalize_mac, FabricError, FabricResult, FosswConfig, LocalLink, OVSDB_VLANID_RANGE_WIDTH,
};
use fabric_session::LockRegistry;
use ovsdb_client::OvsdbClient;

use crate::cli::save_all_fossw;
use crate::vlan_driver::FleetMap;

/// Notification for the orchestrator that a VTEP gained an endpoint
/// and the data-plane should sync tunnels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSync {
    /// The request id this notification answers.
    pub request_id: String,
    /// Tunnel IP of the switch that gained the endpoint.
    pub tunnel_ip: String,
}

/// Hardware-VTEP driver over the FOS fleet.
pub struct FosVxlanDriver {
    cfg: FosswConfig,
    locks: Arc<LockRegistry>,
}

impl FosVxlanDriver {
    pub fn new(cfg: FosswConfig, locks: Arc<LockRegistry>) -> Self {
        Self { cfg, locks }
    }

    fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.cfg.timeout)
    }

    async fn ovsdb(&self, ip: &str) -> FabricResult<OvsdbClient<tokio::net::TcpStream>> {
        OvsdbClient::connect(ip, self.cfg.ovsdb_port, self.io_timeout()).await
    }

    /// Creates the Logical_Switch for an overlay network on every
    /// switch in the fleet. Existing rows are left alone.
    #[instrument(skip(self))]
    pub async fn create_logical_switch(&self, vni: u32, name: &str) -> FabricResult<()> {
        for ip in &self.cfg.fossw_ips {
            let lock = self.locks.lock_for(ip);
            let _guard = lock.lock().await;
            let mut client = self.ovsdb(ip).await?;
            if client.get_logical_switch_uuid(name).await?.is_some() {
                debug!(host = %ip, name = %name, "Logical switch already present");
                continue;
            }
            client.insert_logical_switch(vni, name).await?;
        }
        info!(vni, name = %name, "Logical switch created fleet-wide");
        Ok(())
    }

    /// Deletes the Logical_Switch for an overlay network on every
    /// switch in the fleet, purging its Mcast_Macs_Local rows.
    #[instrument(skip(self))]
    pub async fn delete_logical_switch(&self, name: &str) -> FabricResult<()> {
        for ip in &self.cfg.fossw_ips {
            let lock = self.locks.lock_for(ip);
            let _guard = lock.lock().await;
            let mut client = self.ovsdb(ip).await?;
            if let Some(uuid) = client.get_logical_switch_uuid(name).await? {
                client.delete_logical_switch(&uuid).await?;
            }
        }
        info!(name = %name, "Logical switch deleted fleet-wide");
        Ok(())
    }

    /// Binds a physical port into an overlay network.
    ///
    /// On the target switch: Physical_Port vlan_bindings get the
    /// reserved VLAN mapped to the logical switch, and the MAC's
    /// Ucast_Macs_Local row is replaced (creating the switch's own
    /// Physical_Locator when absent). Every other switch receives a
    /// refreshed Ucast_Macs_Remote row pointing at the target's
    /// tunnel IP. Returns a [`TunnelSync`] when `request_id` is
    /// fresh.
    #[instrument(skip(self, link, fleet, mac_lag_map))]
    pub async fn update_physical_port(
        &self,
        ls_name: &str,
        link: &LocalLink,
        mac: &str,
        ip_addr: &str,
        fleet: &FleetMap,
        mac_lag_map: Option<&BTreeMap<String, String>>,
        request_id: Option<&str>,
    ) -> FabricResult<Option<TunnelSync>> {
        let switch_mac = normalize_mac(&link.switch_id);
        let target_ip = fleet
            .get(&switch_mac)
            .cloned()
            .ok_or_else(|| FabricError::unknown_switch(&link.switch_id))?;
        let port_name = mac_lag_map
            .and_then(|m| m.get(&switch_mac).cloned())
            .unwrap_or_else(|| link.port_id.clone());
        let mac = normalize_mac(mac);

        let tunnel_ip = {
            let lock = self.locks.lock_for(&target_ip);
            let _guard = lock.lock().await;
            let mut client = self.ovsdb(&target_ip).await?;

            let ls_uuid = client
                .get_logical_switch_uuid(ls_name)
                .await?
                .ok_or_else(|| {
                    FabricError::ovsdb(format!("logical switch '{}' not found", ls_name))
                })?;

            let mut binding_vid = client.get_binding_vid(&ls_uuid).await?;
            if binding_vid == 0 {
                binding_vid = derive_binding_vlan(&port_name, self.cfg.ovsdb_vlanid_range_min)?;
            }

            // One transaction binds the port and replaces the MAC's
            // local row, creating the switch's locator when absent.
            let (tunnel_ip, _hostname) = client.get_sw_ep_info().await?;
            let locator = client.get_physical_locator_uuid(&tunnel_ip).await?;
            client
                .bind_physical_port(
                    &port_name,
                    binding_vid,
                    &ls_uuid,
                    &mac,
                    &tunnel_ip,
                    locator.as_deref(),
                )
                .await?;
            tunnel_ip
        };

        self.refresh_remote_rows(ls_name, &mac, ip_addr, &tunnel_ip, &target_ip)
            .await?;

        if self.cfg.save_config {
            save_all_fossw(&self.cfg, &self.locks).await?;
        }

        info!(
            ls = %ls_name, mac = %mac, port = %port_name, host = %target_ip,
            "Physical port bound to overlay"
        );
        Ok(request_id.map(|id| TunnelSync {
            request_id: id.to_string(),
            tunnel_ip,
        }))
    }

    /// Replaces Ucast_Macs_Remote rows for `mac` on every switch
    /// except the target, pointing at the target's tunnel IP.
    /// Distinct switches proceed in parallel.
    async fn refresh_remote_rows(
        &self,
        ls_name: &str,
        mac: &str,
        ip_addr: &str,
        tunnel_ip: &str,
        target_ip: &str,
    ) -> FabricResult<()> {
        let mut tasks: JoinSet<FabricResult<()>> = JoinSet::new();
        for ip in &self.cfg.fossw_ips {
            if ip == target_ip {
                continue;
            }
            let ip = ip.clone();
            let cfg = self.cfg.clone();
            let locks = self.locks.clone();
            let ls_name = ls_name.to_string();
            let mac = mac.to_string();
            let ip_addr = ip_addr.to_string();
            let tunnel_ip = tunnel_ip.to_string();
            let timeout = self.io_timeout();
            tasks.spawn(async move {
                let lock = locks.lock_for(&ip);
                let _guard = lock.lock().await;
                let mut client = OvsdbClient::connect(&ip, cfg.ovsdb_port, timeout).await?;
                let Some(ls_uuid) = client.get_logical_switch_uuid(&ls_name).await? else {
                    debug!(host = %ip, ls = %ls_name, "Logical switch absent, skipping remote row");
                    return Ok(());
                };
                client.delete_ucast_macs_remote(&mac).await?;
                match client.get_physical_locator_uuid(&tunnel_ip).await? {
                    Some(locator) => {
                        client
                            .insert_ucast_macs_remote(&mac, &ls_uuid, &locator, &ip_addr)
                            .await?;
                    }
                    None => {
                        client
                            .insert_ucast_macs_remote_and_locator(
                                &mac, &ls_uuid, &tunnel_ip, &ip_addr,
                            )
                            .await?;
                    }
                }
                Ok(())
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "Remote MAC fan-out failed on one switch");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error
                        .get_or_insert_with(|| FabricError::ovsdb(format!("fan-out task: {}", e)));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Unbinds a physical port from its overlay network: the target
    /// switch's Physical_Port bindings are cleared, and the MAC's
    /// Local and Remote rows are deleted on every switch.
    #[instrument(skip(self, link, fleet, mac_lag_map))]
    pub async fn reset_physical_port(
        &self,
        link: &LocalLink,
        mac: &str,
        fleet: &FleetMap,
        mac_lag_map: Option<&BTreeMap<String, String>>,
    ) -> FabricResult<()> {
        let switch_mac = normalize_mac(&link.switch_id);
        let target_ip = fleet
            .get(&switch_mac)
            .cloned()
            .ok_or_else(|| FabricError::unknown_switch(&link.switch_id))?;
        let port_name = mac_lag_map
            .and_then(|m| m.get(&switch_mac).cloned())
            .unwrap_or_else(|| link.port_id.clone());
        let mac = normalize_mac(mac);

        {
            let lock = self.locks.lock_for(&target_ip);
            let _guard = lock.lock().await;
            let mut client = self.ovsdb(&target_ip).await?;
            client.reset_physical_port(&port_name).await?;
        }

        let mut tasks: JoinSet<FabricResult<()>> = JoinSet::new();
        for ip in &self.cfg.fossw_ips {
            let ip = ip.clone();
            let cfg = self.cfg.clone();
            let locks = self.locks.clone();
            let mac = mac.clone();
            let timeout = self.io_timeout();
            tasks.spawn(async move {
                let lock = locks.lock_for(&ip);
                let _guard = lock.lock().await;
                let mut client = OvsdbClient::connect(&ip, cfg.ovsdb_port, timeout).await?;
                client.delete_ucast_macs_local(&mac).await?;
                client.delete_ucast_macs_remote(&mac).await?;
                Ok(())
            });
        }
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "MAC row cleanup failed on one switch");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error
                        .get_or_insert_with(|| FabricError::ovsdb(format!("cleanup task: {}", e)));
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        if self.cfg.save_config {
            save_all_fossw(&self.cfg, &self.locks).await?;
        }

        info!(mac = %mac, port = %port_name, host = %target_ip, "Physical port unbound");
        Ok(())
    }
}

/// Maps a physical port name to its reserved binding VLAN.
///
/// The port id must be `X/N` with both components numeric; the
/// reserved VLAN is `N + range_min - 1` and must land inside the
/// 78-id window reserved at `range_min`. Any other format is
/// rejected, never guessed at.
pub fn derive_binding_vlan(port_id: &str, range_min: u16) -> FabricResult<u16> {
    let mut parts = port_id.split('/');
    let (Some(unit), Some(index), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(FabricError::invalid_config(
            "port_id",
            format!("'{}' is not of the form X/N", port_id),
        ));
    };
    if unit.is_empty() || !unit.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FabricError::invalid_config(
            "port_id",
            format!("'{}' is not of the form X/N", port_id),
        ));
    }
    let index: u16 = index.parse().map_err(|_| {
        FabricError::invalid_config("port_id", format!("'{}' is not of the form X/N", port_id))
    })?;
    if index == 0 || index > OVSDB_VLANID_RANGE_WIDTH {
        return Err(FabricError::invalid_config(
            "port_id",
            format!(
                "port index {} is outside the reserved window of {} VLAN ids",
                index, OVSDB_VLANID_RANGE_WIDTH
            ),
        ));
    }
    Ok(index + range_min - 1)
}

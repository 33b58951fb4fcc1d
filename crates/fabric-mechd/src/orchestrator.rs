//! Mechanism orchestrator: maps lifecycle events onto driver calls.
//!
//! The orchestrator is a stateless façade over the drivers except for
//! two process-wide maps built up as ports come and go: the fleet map
//! (switch MAC → IP, probed once at init) and the MAC↔IP / LAG
//! bookkeeping the VXLAN fan-out needs.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument};

use cfab_driver::{CliManager, FabricVlanDriver, PprofilePolicy};
use fabric_common::{
    classify_links, normalize_mac, AdapterConfig, BindMode, FabricError, FabricResult, PortContext,
    VfabId, VirtualNetwork, VnicKind,
};
use fabric_session::LockRegistry;
use fossw_driver::{FleetMap, FosVlanDriver, FosVxlanDriver, TunnelSync};

use crate::events::MechanismEvent;

/// Driver errors surface to the orchestrator as one wrapped kind; the
/// root cause stays loggable through the source chain.
#[derive(Debug, Error)]
#[error("Mechanism driver operation failed: {source}")]
pub struct MechanismError {
    #[from]
    source: FabricError,
}

pub type MechanismResult<T> = Result<T, MechanismError>;

/// Process-wide event dispatcher.
pub struct MechanismOrchestrator {
    config: AdapterConfig,
    vfab_map: BTreeMap<String, VfabId>,
    locks: Arc<LockRegistry>,
    fleet: FleetMap,
    /// Host MAC → host IP, learned from bound ports.
    mac_ip_map: Mutex<BTreeMap<String, String>>,
    /// Port id → (switch MAC → logical port) for LAG-bound ports.
    lag_map: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
}

impl MechanismOrchestrator {
    /// Builds the orchestrator from validated configuration.
    pub fn new(config: AdapterConfig) -> FabricResult<Self> {
        config.validate()?;
        let vfab_map = match &config.fujitsu_cfab {
            Some(cfab) => cfab.vfab_map()?.into_iter().collect(),
            None => BTreeMap::new(),
        };
        Ok(Self {
            config,
            vfab_map,
            locks: Arc::new(LockRegistry::new()),
            fleet: FleetMap::new(),
            mac_ip_map: Mutex::new(BTreeMap::new()),
            lag_map: Mutex::new(BTreeMap::new()),
        })
    }

    /// Probes the FOS fleet once and caches the switch MAC → IP map.
    /// Must run before any FOS-bound event is dispatched.
    pub async fn bootstrap(&mut self) -> FabricResult<()> {
        if self.config.fujitsu_fossw.is_some() {
            self.fleet = self.fossw_vlan_driver()?.get_switch_mac_ip_pair().await?;
            info!(switches = self.fleet.len(), "Fleet map populated");
        }
        Ok(())
    }

    fn cfab_driver(&self) -> FabricResult<FabricVlanDriver<CliManager>> {
        let cfab = self
            .config
            .fujitsu_cfab
            .as_ref()
            .ok_or_else(|| FabricError::invalid_config("fujitsu_cfab", "group not configured"))?;
        let cli = CliManager::new(
            &cfab.address,
            &cfab.username,
            &cfab.password,
            cfab.save_config,
            Duration::from_secs(fabric_common::DEFAULT_TIMEOUT_SECS),
        );
        Ok(FabricVlanDriver::new(
            cli,
            PprofilePolicy {
                share: cfab.share_pprofile,
                prefix: cfab.pprofile_prefix.clone(),
            },
            self.locks.clone(),
        ))
    }

    fn fossw_vlan_driver(&self) -> FabricResult<FosVlanDriver> {
        let fossw = self
            .config
            .fujitsu_fossw
            .as_ref()
            .ok_or_else(|| FabricError::invalid_config("fujitsu_fossw", "group not configured"))?;
        Ok(FosVlanDriver::new(fossw.clone(), self.locks.clone()))
    }

    fn fossw_vxlan_driver(&self) -> FabricResult<FosVxlanDriver> {
        let fossw = self
            .config
            .fujitsu_fossw
            .as_ref()
            .ok_or_else(|| FabricError::invalid_config("fujitsu_fossw", "group not configured"))?;
        Ok(FosVxlanDriver::new(fossw.clone(), self.locks.clone()))
    }

    /// Dispatches one event.
    #[instrument(skip(self, event))]
    pub async fn handle(&self, event: MechanismEvent) -> MechanismResult<()> {
        match event {
            MechanismEvent::CreateNetwork { network } => self.create_network(&network).await?,
            MechanismEvent::DeleteNetwork { network } => self.delete_network(&network).await?,
            MechanismEvent::BindPort {
                network,
                port,
                request_id,
            } => {
                self.bind_port(&network, &port, request_id.as_deref())
                    .await?
            }
            MechanismEvent::UpdatePort {
                network,
                port,
                unbound,
            } => {
                if unbound {
                    self.unbind_port(&network, &port).await?;
                } else {
                    debug!(port = %port.port_id, "Port update without unbind, nothing to do");
                }
            }
            MechanismEvent::DeletePort { network, port } => {
                self.unbind_port(&network, &port).await?
            }
        }
        Ok(())
    }

    async fn create_network(&self, network: &VirtualNetwork) -> FabricResult<()> {
        if network.kind.is_vlan() {
            let vlan = validate_vlan_network(network, &self.vfab_map, self.config.fujitsu_cfab.is_some())?.0;
            if self.config.fujitsu_fossw.is_some() {
                let driver = self.fossw_vlan_driver()?;
                for ip in self.fossw_ips() {
                    driver.create_vlan(&ip, vlan).await?;
                }
            }
            // The C-Fabric realizes VLANs through VFAB membership at
            // port binding time; network creation is a no-op there.
            return Ok(());
        }
        if network.kind.is_vxlan() {
            let vni = validate_vxlan_network(network)?;
            self.fossw_vxlan_driver()?
                .create_logical_switch(vni, &network.logical_switch_name())
                .await?;
        }
        Ok(())
    }

    async fn delete_network(&self, network: &VirtualNetwork) -> FabricResult<()> {
        if network.kind.is_vlan() {
            if self.config.fujitsu_fossw.is_some() {
                let vlan = vlan_id(network)?;
                let driver = self.fossw_vlan_driver()?;
                for ip in self.fossw_ips() {
                    driver.delete_vlan(&ip, vlan).await?;
                }
            }
            return Ok(());
        }
        if network.kind.is_vxlan() {
            self.fossw_vxlan_driver()?
                .delete_logical_switch(&network.logical_switch_name())
                .await?;
        }
        Ok(())
    }

    async fn bind_port(
        &self,
        network: &VirtualNetwork,
        port: &PortContext,
        request_id: Option<&str>,
    ) -> FabricResult<()> {
        if let Some(ip) = &port.ip_address {
            self.mac_ip_map
                .lock()
                .expect("mac/ip map poisoned")
                .insert(normalize_mac(&port.mac_address), ip.clone());
        }

        if network.kind.is_vlan() {
            let (vlan, vfab) =
                validate_vlan_network(network, &self.vfab_map, self.config.fujitsu_cfab.is_some())?;
            match port.vnic_kind {
                VnicKind::Virtual => {
                    if let Some(vfab) = vfab {
                        self.cfab_driver()?
                            .associate_mac_to_network(&vfab, vlan, &port.mac_address)
                            .await?;
                    }
                    return Ok(());
                }
                VnicKind::Baremetal => {
                    let mode = classify_links(&port.local_link_info)?;
                    if let Some(vfab) = vfab {
                        return self.bind_cfab_vlan(&vfab, vlan, port, mode).await;
                    }
                    return self.bind_fossw_vlan(vlan, port, mode).await;
                }
            }
        }

        if network.kind.is_vxlan() {
            validate_vxlan_network(network)?;
            return self.bind_vxlan(network, port, request_id).await;
        }

        debug!(port = %port.port_id, "Flat network binding, nothing to program");
        Ok(())
    }

    async fn bind_cfab_vlan(
        &self,
        vfab: &VfabId,
        vlan: u16,
        port: &PortContext,
        mode: BindMode,
    ) -> FabricResult<()> {
        let ports: Vec<String> = port
            .local_link_info
            .iter()
            .map(|l| l.port_id.clone())
            .collect();
        let mut driver = self.cfab_driver()?;
        match mode {
            BindMode::Single => {
                driver
                    .setup_vlan(vfab, vlan, &ports, &port.mac_address)
                    .await
            }
            BindMode::Lag | BindMode::Mlag => {
                driver
                    .setup_vlan_with_lag(vfab, vlan, &ports, &port.mac_address)
                    .await
            }
        }
    }

    async fn bind_fossw_vlan(
        &self,
        vlan: u16,
        port: &PortContext,
        mode: BindMode,
    ) -> FabricResult<()> {
        let driver = self.fossw_vlan_driver()?;
        match mode {
            BindMode::Single => {
                let link = &port.local_link_info[0];
                let ip = driver.resolve_switch_ip(&self.fleet, &link.switch_id)?;
                driver.set_vlan(ip, vlan, &link.port_id).await
            }
            BindMode::Lag | BindMode::Mlag => {
                let assigned = driver
                    .setup_lag(&port.local_link_info, &self.fleet, Some(vlan))
                    .await?;
                self.lag_map
                    .lock()
                    .expect("lag map poisoned")
                    .insert(port.port_id.clone(), assigned);
                Ok(())
            }
        }
    }

    async fn bind_vxlan(
        &self,
        network: &VirtualNetwork,
        port: &PortContext,
        request_id: Option<&str>,
    ) -> FabricResult<()> {
        let mode = classify_links(&port.local_link_info)?;
        let driver = self.fossw_vxlan_driver()?;
        let ls_name = network.logical_switch_name();
        let ip_addr = self
            .mac_ip_map
            .lock()
            .expect("mac/ip map poisoned")
            .get(&normalize_mac(&port.mac_address))
            .cloned()
            .unwrap_or_default();

        let mac_lag_map = match mode {
            BindMode::Single => None,
            BindMode::Lag | BindMode::Mlag => {
                let assigned = self
                    .fossw_vlan_driver()?
                    .setup_lag(&port.local_link_info, &self.fleet, None)
                    .await?;
                self.lag_map
                    .lock()
                    .expect("lag map poisoned")
                    .insert(port.port_id.clone(), assigned.clone());
                Some(assigned)
            }
        };

        // With a LAG only the logical port is programmed, once per
        // switch; single bindings walk each link entry.
        let links: Vec<_> = match mode {
            BindMode::Single => port.local_link_info.iter().collect(),
            BindMode::Lag => vec![&port.local_link_info[0]],
            BindMode::Mlag => {
                let mut seen = std::collections::BTreeSet::new();
                port.local_link_info
                    .iter()
                    .filter(|l| seen.insert(normalize_mac(&l.switch_id)))
                    .collect()
            }
        };
        for link in links {
            let sync = driver
                .update_physical_port(
                    &ls_name,
                    link,
                    &port.mac_address,
                    &ip_addr,
                    &self.fleet,
                    mac_lag_map.as_ref(),
                    request_id,
                )
                .await?;
            if let Some(sync) = sync {
                self.notify_tunnel_sync(&sync);
            }
        }
        Ok(())
    }

    async fn unbind_port(&self, network: &VirtualNetwork, port: &PortContext) -> FabricResult<()> {
        if network.kind.is_vlan() {
            let (vlan, vfab) =
                validate_vlan_network(network, &self.vfab_map, self.config.fujitsu_cfab.is_some())?;
            match port.vnic_kind {
                VnicKind::Virtual => {
                    if let Some(vfab) = vfab {
                        self.cfab_driver()?
                            .dissociate_mac_from_network(&vfab, vlan, &port.mac_address)
                            .await?;
                    }
                    return Ok(());
                }
                VnicKind::Baremetal => {
                    let mode = classify_links(&port.local_link_info)?;
                    if let Some(vfab) = vfab {
                        return self.unbind_cfab_vlan(&vfab, vlan, port, mode).await;
                    }
                    return self.unbind_fossw_vlan(port, mode).await;
                }
            }
        }

        if network.kind.is_vxlan() {
            return self.unbind_vxlan(network, port).await;
        }
        Ok(())
    }

    async fn unbind_cfab_vlan(
        &self,
        vfab: &VfabId,
        vlan: u16,
        port: &PortContext,
        mode: BindMode,
    ) -> FabricResult<()> {
        let ports: Vec<String> = port
            .local_link_info
            .iter()
            .map(|l| l.port_id.clone())
            .collect();
        let mut driver = self.cfab_driver()?;
        match mode {
            BindMode::Single => {
                driver
                    .clear_vlan(vfab, vlan, &ports, &port.mac_address)
                    .await
            }
            BindMode::Lag | BindMode::Mlag => {
                driver
                    .clear_vlan_with_lag(vfab, vlan, &ports, &port.mac_address)
                    .await
            }
        }
    }

    async fn unbind_fossw_vlan(&self, port: &PortContext, mode: BindMode) -> FabricResult<()> {
        let driver = self.fossw_vlan_driver()?;
        match mode {
            BindMode::Single => {
                let link = &port.local_link_info[0];
                let ip = driver.resolve_switch_ip(&self.fleet, &link.switch_id)?;
                driver.clear_vlan(ip, &link.port_id).await
            }
            BindMode::Lag | BindMode::Mlag => {
                driver.clear_lag(&port.local_link_info, &self.fleet).await?;
                self.lag_map
                    .lock()
                    .expect("lag map poisoned")
                    .remove(&port.port_id);
                Ok(())
            }
        }
    }

    async fn unbind_vxlan(&self, _network: &VirtualNetwork, port: &PortContext) -> FabricResult<()> {
        let mode = classify_links(&port.local_link_info)?;
        let driver = self.fossw_vxlan_driver()?;

        let mac_lag_map = self
            .lag_map
            .lock()
            .expect("lag map poisoned")
            .get(&port.port_id)
            .cloned();

        let links: Vec<_> = match mode {
            BindMode::Single => port.local_link_info.iter().collect(),
            BindMode::Lag => vec![&port.local_link_info[0]],
            BindMode::Mlag => {
                let mut seen = std::collections::BTreeSet::new();
                port.local_link_info
                    .iter()
                    .filter(|l| seen.insert(normalize_mac(&l.switch_id)))
                    .collect()
            }
        };
        for link in links {
            driver
                .reset_physical_port(link, &port.mac_address, &self.fleet, mac_lag_map.as_ref())
                .await?;
        }

        if !matches!(mode, BindMode::Single) {
            self.fossw_vlan_driver()?
                .clear_lag(&port.local_link_info, &self.fleet)
                .await?;
            self.lag_map
                .lock()
                .expect("lag map poisoned")
                .remove(&port.port_id);
        }
        Ok(())
    }

    /// Forwards a tunnel-sync notification at the process boundary.
    fn notify_tunnel_sync(&self, sync: &TunnelSync) {
        info!(
            request_id = %sync.request_id,
            tunnel_ip = %sync.tunnel_ip,
            "Tunnel sync requested"
        );
    }

    fn fossw_ips(&self) -> Vec<String> {
        self.config
            .fujitsu_fossw
            .as_ref()
            .map(|f| f.fossw_ips.clone())
            .unwrap_or_default()
    }
}

/// Extension helpers for network kinds.
trait NetworkKindExt {
    fn is_vlan(&self) -> bool;
    fn is_vxlan(&self) -> bool;
}

impl NetworkKindExt for fabric_common::NetworkKind {
    fn is_vlan(&self) -> bool {
        matches!(self, fabric_common::NetworkKind::Vlan)
    }
    fn is_vxlan(&self) -> bool {
        matches!(self, fabric_common::NetworkKind::Vxlan)
    }
}

/// Validates a VLAN network: the segmentation id must be a VLAN id,
/// and when the C-Fabric is configured the physical network must map
/// to a known VFAB.
fn validate_vlan_network(
    network: &VirtualNetwork,
    vfab_map: &BTreeMap<String, VfabId>,
    cfab_configured: bool,
) -> FabricResult<(u16, Option<VfabId>)> {
    let vlan = vlan_id(network)?;
    if !cfab_configured {
        return Ok((vlan, None));
    }
    let physnet = network.physical_network.as_deref().ok_or_else(|| {
        FabricError::invalid_config(
            "physical_network",
            "VLAN networks require a physical network",
        )
    })?;
    let vfab = vfab_map.get(physnet).cloned().ok_or_else(|| {
        FabricError::invalid_config(
            "physical_network",
            format!("'{}' does not map to any configured VFAB", physnet),
        )
    })?;
    Ok((vlan, Some(vfab)))
}

/// Validates a VXLAN network: a VNI and no physical network.
fn validate_vxlan_network(network: &VirtualNetwork) -> FabricResult<u32> {
    if network.physical_network.is_some() {
        return Err(FabricError::invalid_config(
            "physical_network",
            "VXLAN networks must not carry a physical network",
        ));
    }
    network.segmentation_id.ok_or_else(|| {
        FabricError::invalid_config("segmentation_id", "VXLAN networks require a VNI")
    })
}

fn vlan_id(network: &VirtualNetwork) -> FabricResult<u16> {
    let seg = network.segmentation_id.ok_or_else(|| {
        FabricError::invalid_config("segmentation_id", "VLAN networks require a VLAN id")
    })?;
    if !(1..=4094).contains(&seg) {
        return Err(FabricError::invalid_config(
            "segmentation_id",
            format!("VLAN id {} out of range 1..=4094", seg),
        ));
    }
    Ok(seg as u16)
}

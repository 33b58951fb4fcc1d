//! FOS VLAN, LAG, and VPC (mLAG) lifecycle.
//!
//! Per-switch primitives are written against the [`FosCli`] seam so
//! the command sequences are testable without a switch; the driver
//! methods wrap them with per-switch locking and session lifecycle —
//! one session per top-level operation, closed on every exit path.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use fabric_common::{
    classify_links, normalize_mac, BindMode, FabricError, FabricResult, FosswConfig, LocalLink,
};
use fabric_session::LockRegistry;

use crate::cli::{FosCli, FosConnect, SshConnect};
use crate::commands::{
    addport, deleteport, free_logical_port, interface, logical_port_of, no_vlan, no_vpc,
    parse_burned_in_mac, parse_peer_ip, show_vpc, switchport_access_vlan, vlan, vpc, vpc_is_free,
    vpc_port_channel, CONFIGURE_CMD, EXIT_CMD, FAILED_TO_DELETE_MARKER,
    NO_SWITCHPORT_ACCESS_VLAN, PORT_CHANNEL_STATIC, SHOW_HARDWARE, SHOW_PORT_CHANNEL_BRIEF,
    SHOW_VPC_PEER_KEEPALIVE, SWITCHPORT_MODE_ACCESS, VLAN_DATABASE_CMD,
};

/// Highest VPC id probed during allocation.
pub const MAX_VPC_ID: u16 = 64;

/// Fleet map: switch MAC to management IP.
pub type FleetMap = BTreeMap<String, String>;

/// Creates a VLAN in the switch's VLAN database.
pub async fn create_vlan_on<C: FosCli>(cli: &mut C, vlan_id: u16) -> FabricResult<()> {
    cli.exec(VLAN_DATABASE_CMD).await?;
    cli.exec(&vlan(vlan_id)).await?;
    cli.exec(EXIT_CMD).await?;
    Ok(())
}

/// Deletes a VLAN. The vendor replies "Failed to delete" when the
/// VLAN does not exist; that reply is swallowed so deletion is
/// idempotent.
pub async fn delete_vlan_on<C: FosCli>(cli: &mut C, vlan_id: u16) -> FabricResult<()> {
    cli.exec(VLAN_DATABASE_CMD).await?;
    let output = cli.exec(&no_vlan(vlan_id)).await?;
    if output.contains(FAILED_TO_DELETE_MARKER) {
        debug!(vlan = vlan_id, "VLAN already absent");
    }
    cli.exec(EXIT_CMD).await?;
    Ok(())
}

/// Sets a port as an access port of `vlan_id`.
pub async fn set_vlan_on<C: FosCli>(cli: &mut C, vlan_id: u16, port: &str) -> FabricResult<()> {
    cli.exec(CONFIGURE_CMD).await?;
    cli.exec(&interface(port)).await?;
    cli.exec(SWITCHPORT_MODE_ACCESS).await?;
    cli.exec(&switchport_access_vlan(vlan_id)).await?;
    cli.exec(EXIT_CMD).await?;
    cli.exec(EXIT_CMD).await?;
    Ok(())
}

/// Clears the access VLAN of a port.
pub async fn clear_vlan_on<C: FosCli>(cli: &mut C, port: &str) -> FabricResult<()> {
    cli.exec(CONFIGURE_CMD).await?;
    cli.exec(&interface(port)).await?;
    cli.exec(NO_SWITCHPORT_ACCESS_VLAN).await?;
    cli.exec(EXIT_CMD).await?;
    cli.exec(EXIT_CMD).await?;
    Ok(())
}

/// Picks the earliest static logical port that has no member ports.
pub async fn get_free_logical_port_on<C: FosCli>(cli: &mut C) -> FabricResult<String> {
    let output = cli.exec(SHOW_PORT_CHANNEL_BRIEF).await?;
    free_logical_port(&output).ok_or(FabricError::NoAvailableIndex {
        resource: "port-channel",
    })
}

/// The logical port `port` is currently a member of, if any.
pub async fn get_logical_port_of_on<C: FosCli>(
    cli: &mut C,
    port: &str,
) -> FabricResult<Option<String>> {
    let output = cli.exec(SHOW_PORT_CHANNEL_BRIEF).await?;
    Ok(logical_port_of(&output, port))
}

/// Claims a logical port as a static LAG and adds physical ports.
pub async fn join_to_logical_port_on<C: FosCli>(
    cli: &mut C,
    logical_port: &str,
    ports: &[String],
) -> FabricResult<()> {
    cli.exec(CONFIGURE_CMD).await?;
    cli.exec(&interface(logical_port)).await?;
    cli.exec(PORT_CHANNEL_STATIC).await?;
    cli.exec(EXIT_CMD).await?;
    for port in ports {
        cli.exec(&interface(port)).await?;
        cli.exec(&addport(logical_port)).await?;
        cli.exec(EXIT_CMD).await?;
    }
    cli.exec(EXIT_CMD).await?;
    Ok(())
}

/// Removes physical ports from a logical port.
pub async fn leave_from_logical_port_on<C: FosCli>(
    cli: &mut C,
    logical_port: &str,
    ports: &[String],
) -> FabricResult<()> {
    cli.exec(CONFIGURE_CMD).await?;
    for port in ports {
        cli.exec(&interface(port)).await?;
        cli.exec(&deleteport(logical_port)).await?;
        cli.exec(EXIT_CMD).await?;
    }
    cli.exec(EXIT_CMD).await?;
    Ok(())
}

/// Finds the first VPC id in `1..=MAX_VPC_ID` whose peer port-channel
/// is "none" on this switch.
pub async fn get_free_vpc_id_on<C: FosCli>(cli: &mut C) -> FabricResult<u16> {
    for id in 1..=MAX_VPC_ID {
        let output = cli.exec(&show_vpc(id)).await?;
        if vpc_is_free(&output) {
            return Ok(id);
        }
    }
    Err(FabricError::NoAvailableIndex { resource: "vpc" })
}

/// Checks whether a specific VPC id is free on this switch.
pub async fn vpc_id_is_free_on<C: FosCli>(cli: &mut C, vpc_id: u16) -> FabricResult<bool> {
    let output = cli.exec(&show_vpc(vpc_id)).await?;
    Ok(vpc_is_free(&output))
}

/// The VPC id bound to `logical_port`, if any.
pub async fn get_vpc_id_of_on<C: FosCli>(
    cli: &mut C,
    logical_port: &str,
) -> FabricResult<Option<u16>> {
    for id in 1..=MAX_VPC_ID {
        let output = cli.exec(&show_vpc(id)).await?;
        if vpc_port_channel(&output).as_deref() == Some(logical_port) {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

/// Binds a logical port to a VPC id.
pub async fn join_to_vpc_on<C: FosCli>(
    cli: &mut C,
    logical_port: &str,
    vpc_id: u16,
) -> FabricResult<()> {
    cli.exec(CONFIGURE_CMD).await?;
    cli.exec(&interface(logical_port)).await?;
    cli.exec(&vpc(vpc_id)).await?;
    cli.exec(EXIT_CMD).await?;
    cli.exec(EXIT_CMD).await?;
    Ok(())
}

/// Unbinds a logical port from a VPC id.
pub async fn leave_from_vpc_on<C: FosCli>(
    cli: &mut C,
    logical_port: &str,
    vpc_id: u16,
) -> FabricResult<()> {
    cli.exec(CONFIGURE_CMD).await?;
    cli.exec(&interface(logical_port)).await?;
    cli.exec(&no_vpc(vpc_id)).await?;
    cli.exec(EXIT_CMD).await?;
    cli.exec(EXIT_CMD).await?;
    Ok(())
}

/// Reads the keepalive peer IP of this switch.
pub async fn get_peer_ip_on<C: FosCli>(cli: &mut C) -> FabricResult<Option<Ipv4Addr>> {
    let output = cli.exec(SHOW_VPC_PEER_KEEPALIVE).await?;
    Ok(parse_peer_ip(&output))
}

/// Reads the burned-in MAC of this switch.
pub async fn get_switch_mac_on<C: FosCli>(cli: &mut C) -> FabricResult<String> {
    let output = cli.exec(SHOW_HARDWARE).await?;
    parse_burned_in_mac(&output)
        .ok_or_else(|| FabricError::transport("fossw", "no burned-in MAC in show hardware output"))
}

/// One switch teardown step of `clear_lag`.
pub async fn clear_lag_on<C: FosCli>(
    cli: &mut C,
    ports: &[String],
    mlag: bool,
) -> FabricResult<()> {
    let Some(logical) = get_logical_port_of_on(cli, &ports[0]).await? else {
        debug!(port = %ports[0], "No logical port to tear down");
        return Ok(());
    };
    if mlag {
        if let Some(vpc_id) = get_vpc_id_of_on(cli, &logical).await? {
            leave_from_vpc_on(cli, &logical, vpc_id).await?;
        }
    }
    leave_from_logical_port_on(cli, &logical, ports).await?;
    clear_vlan_on(cli, &logical).await?;
    Ok(())
}

/// VLAN/LAG driver over the FOS fleet.
pub struct FosVlanDriver<F: FosConnect = SshConnect> {
    cfg: FosswConfig,
    connect: F,
    locks: Arc<LockRegistry>,
}

impl FosVlanDriver<SshConnect> {
    pub fn new(cfg: FosswConfig, locks: Arc<LockRegistry>) -> Self {
        Self {
            connect: SshConnect::new(cfg.clone()),
            cfg,
            locks,
        }
    }
}

impl<F: FosConnect> FosVlanDriver<F> {
    /// Builds a driver over an arbitrary session source; tests hand in
    /// mock connectors.
    pub fn with_connector(cfg: FosswConfig, connect: F, locks: Arc<LockRegistry>) -> Self {
        Self { cfg, connect, locks }
    }

    async fn close_quietly(&self, ip: &str, cli: &mut F::Cli) {
        if let Err(e) = cli.close().await {
            warn!(host = %ip, error = %e, "Error closing FOS session");
        }
    }

    /// Probes every configured switch once and returns MAC → IP.
    pub async fn get_switch_mac_ip_pair(&self) -> FabricResult<FleetMap> {
        let mut fleet = FleetMap::new();
        for ip in &self.cfg.fossw_ips {
            let lock = self.locks.lock_for(ip);
            let _guard = lock.lock().await;
            let mut cli = self.connect.open(ip).await?;
            let result = get_switch_mac_on(&mut cli).await;
            self.close_quietly(ip, &mut cli).await;
            let mac = result?;
            info!(host = %ip, mac = %mac, "Probed switch identity");
            fleet.insert(normalize_mac(&mac), ip.clone());
        }
        Ok(fleet)
    }

    /// Creates a VLAN on one switch.
    #[instrument(skip(self))]
    pub async fn create_vlan(&self, ip: &str, vlan_id: u16) -> FabricResult<()> {
        let lock = self.locks.lock_for(ip);
        let _guard = lock.lock().await;
        let mut cli = self.connect.open(ip).await?;
        let result = create_vlan_on(&mut cli, vlan_id).await;
        self.close_quietly(ip, &mut cli).await;
        result
    }

    /// Deletes a VLAN on one switch; absent VLANs succeed.
    #[instrument(skip(self))]
    pub async fn delete_vlan(&self, ip: &str, vlan_id: u16) -> FabricResult<()> {
        let lock = self.locks.lock_for(ip);
        let _guard = lock.lock().await;
        let mut cli = self.connect.open(ip).await?;
        let result = delete_vlan_on(&mut cli, vlan_id).await;
        self.close_quietly(ip, &mut cli).await;
        result
    }

    /// Sets a port as an access port of the VLAN.
    #[instrument(skip(self))]
    pub async fn set_vlan(&self, ip: &str, vlan_id: u16, port: &str) -> FabricResult<()> {
        let lock = self.locks.lock_for(ip);
        let _guard = lock.lock().await;
        let mut cli = self.connect.open(ip).await?;
        let result = set_vlan_on(&mut cli, vlan_id, port).await;
        self.close_quietly(ip, &mut cli).await;
        result
    }

    /// Clears the access VLAN of a port.
    #[instrument(skip(self))]
    pub async fn clear_vlan(&self, ip: &str, port: &str) -> FabricResult<()> {
        let lock = self.locks.lock_for(ip);
        let _guard = lock.lock().await;
        let mut cli = self.connect.open(ip).await?;
        let result = clear_vlan_on(&mut cli, port).await;
        self.close_quietly(ip, &mut cli).await;
        result
    }

    /// Resolves the management IP for a local-link switch MAC.
    pub fn resolve_switch_ip<'a>(&self, fleet: &'a FleetMap, mac: &str) -> FabricResult<&'a str> {
        fleet
            .get(&normalize_mac(mac))
            .map(String::as_str)
            .ok_or_else(|| FabricError::unknown_switch(mac))
    }

    /// Verifies two switches are keepalive peers of each other.
    ///
    /// Queries one side's peer IP and matches it against the other
    /// switch's management IP; malformed keepalive output fails
    /// closed.
    pub async fn is_valid_mlag(&self, first_ip: &str, second_ip: &str) -> FabricResult<bool> {
        let lock = self.locks.lock_for(first_ip);
        let _guard = lock.lock().await;
        let mut cli = self.connect.open(first_ip).await?;
        let result = get_peer_ip_on(&mut cli).await;
        self.close_quietly(first_ip, &mut cli).await;
        Ok(peer_matches(result?, second_ip))
    }

    /// Bundles the link's ports into a LAG (or an mLAG across two
    /// peered switches) and optionally applies a VLAN to the logical
    /// port. Returns switch MAC → allocated logical port.
    #[instrument(skip(self, links, fleet))]
    pub async fn setup_lag(
        &self,
        links: &[LocalLink],
        fleet: &FleetMap,
        vlan_id: Option<u16>,
    ) -> FabricResult<BTreeMap<String, String>> {
        match classify_links(links)? {
            BindMode::Single | BindMode::Lag => self.setup_single_lag(links, fleet, vlan_id).await,
            BindMode::Mlag => self.setup_mlag(links, fleet, vlan_id).await,
        }
    }

    async fn setup_single_lag(
        &self,
        links: &[LocalLink],
        fleet: &FleetMap,
        vlan_id: Option<u16>,
    ) -> FabricResult<BTreeMap<String, String>> {
        let mac = normalize_mac(&links[0].switch_id);
        let ip = self.resolve_switch_ip(fleet, &mac)?.to_string();
        let ports: Vec<String> = links.iter().map(|l| l.port_id.clone()).collect();

        let lock = self.locks.lock_for(&ip);
        let _guard = lock.lock().await;
        let mut cli = self.connect.open(&ip).await?;
        let result = async {
            let logical = get_free_logical_port_on(&mut cli).await?;
            join_to_logical_port_on(&mut cli, &logical, &ports).await?;
            if let Some(vid) = vlan_id {
                set_vlan_on(&mut cli, vid, &logical).await?;
            }
            Ok(logical)
        }
        .await;
        self.close_quietly(&ip, &mut cli).await;
        let logical = result?;

        info!(host = %ip, logical = %logical, "LAG set up");
        Ok(BTreeMap::from([(mac, logical)]))
    }

    async fn setup_mlag(
        &self,
        links: &[LocalLink],
        fleet: &FleetMap,
        vlan_id: Option<u16>,
    ) -> FabricResult<BTreeMap<String, String>> {
        let partners = partition_by_switch(links);
        let macs: Vec<String> = partners.keys().cloned().collect();
        if macs.len() != 2 {
            return Err(FabricError::invalid_config(
                "local_link_information",
                format!("mLAG requires exactly two switches, got {}", macs.len()),
            ));
        }
        let first_ip = self.resolve_switch_ip(fleet, &macs[0])?.to_string();
        let second_ip = self.resolve_switch_ip(fleet, &macs[1])?.to_string();

        if !self.is_valid_mlag(&first_ip, &second_ip).await? {
            return Err(FabricError::InvalidMlagPair {
                first: first_ip,
                second: second_ip,
            });
        }

        // Per partner: allocate the logical port, attach the member
        // ports, and note the first free VPC id on that side.
        let mut logical_ports = BTreeMap::new();
        let mut free_vpc_ids = Vec::new();
        for (mac, ip) in macs.iter().zip([&first_ip, &second_ip]) {
            let ports = partners.get(mac).cloned().unwrap_or_default();
            let lock = self.locks.lock_for(ip);
            let _guard = lock.lock().await;
            let mut cli = self.connect.open(ip).await?;
            let result = async {
                let logical = get_free_logical_port_on(&mut cli).await?;
                join_to_logical_port_on(&mut cli, &logical, &ports).await?;
                if let Some(vid) = vlan_id {
                    set_vlan_on(&mut cli, vid, &logical).await?;
                }
                let free_vpc = get_free_vpc_id_on(&mut cli).await?;
                Ok((logical, free_vpc))
            }
            .await;
            self.close_quietly(ip, &mut cli).await;
            let (logical, free_vpc) = result?;
            logical_ports.insert(mac.clone(), logical);
            free_vpc_ids.push(free_vpc);
        }

        // Both sides must agree on one id; the larger of the two
        // first-free ids is free on both partners.
        let vpc_id = free_vpc_ids.iter().copied().max().unwrap_or(1);
        for (mac, ip) in macs.iter().zip([&first_ip, &second_ip]) {
            let logical = logical_ports.get(mac).cloned().unwrap_or_default();
            let lock = self.locks.lock_for(ip);
            let _guard = lock.lock().await;
            let mut cli = self.connect.open(ip).await?;
            let result = async {
                if !vpc_id_is_free_on(&mut cli, vpc_id).await? {
                    return Err(FabricError::NoAvailableIndex { resource: "vpc" });
                }
                join_to_vpc_on(&mut cli, &logical, vpc_id).await
            }
            .await;
            self.close_quietly(ip, &mut cli).await;
            result?;
        }

        info!(vpc = vpc_id, first = %first_ip, second = %second_ip, "mLAG set up");
        Ok(logical_ports)
    }

    /// Tears a LAG or mLAG down: leave the VPC where bound, remove
    /// the member ports from the logical port, clear its VLAN.
    #[instrument(skip(self, links, fleet))]
    pub async fn clear_lag(&self, links: &[LocalLink], fleet: &FleetMap) -> FabricResult<()> {
        let mlag = matches!(classify_links(links)?, BindMode::Mlag);
        for (mac, ports) in partition_by_switch(links) {
            let ip = self.resolve_switch_ip(fleet, &mac)?.to_string();
            let lock = self.locks.lock_for(&ip);
            let _guard = lock.lock().await;
            let mut cli = self.connect.open(&ip).await?;
            let result = clear_lag_on(&mut cli, &ports, mlag).await;
            self.close_quietly(&ip, &mut cli).await;
            result?;
        }
        Ok(())
    }
}

/// Returns true when the probed peer IP equals the partner's
/// management IP. Fails closed on missing or malformed peer output.
fn peer_matches(peer: Option<Ipv4Addr>, partner_ip: &str) -> bool {
    match (peer, partner_ip.parse::<Ipv4Addr>()) {
        (Some(peer), Ok(partner)) => peer == partner,
        _ => false,
    }
}

/// Groups link entries by normalized switch MAC, keeping port order.
fn partition_by_switch(links: &[LocalLink]) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for link in links {
        map.entry(normalize_mac(&link.switch_id))
            .or_default()
            .push(link.port_id.clone());
    }
    map
}

//! Lifecycle events delivered by the northbound orchestrator.
//!
//! Events arrive as line-delimited JSON on the daemon's input; each
//! line is one tagged event.

use serde::Deserialize;

use fabric_common::{PortContext, VirtualNetwork};

/// One orchestrator notification.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MechanismEvent {
    /// A virtual network exists.
    CreateNetwork { network: VirtualNetwork },

    /// A virtual network is gone.
    DeleteNetwork { network: VirtualNetwork },

    /// A port is bound to a network.
    BindPort {
        network: VirtualNetwork,
        port: PortContext,
        /// Fresh request id; its presence requests a tunnel-sync
        /// notification after VTEP programming.
        #[serde(default)]
        request_id: Option<String>,
    },

    /// A port changed; `unbound` marks the transition out of a
    /// binding, which triggers the teardown path of the original
    /// binding.
    UpdatePort {
        network: VirtualNetwork,
        port: PortContext,
        #[serde(default)]
        unbound: bool,
    },

    /// A port is gone.
    DeletePort {
        network: VirtualNetwork,
        port: PortContext,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_common::{NetworkKind, VnicKind};

    #[test]
    fn test_bind_port_event_deserializes() {
        let event: MechanismEvent = serde_json::from_str(
            r#"{
                "event": "bind_port",
                "network": {
                    "id": "net-1",
                    "kind": "vlan",
                    "segmentation_id": 8,
                    "physical_network": "physnet1"
                },
                "port": {
                    "port_id": "port-1",
                    "mac_address": "00:01:02:03:04:05",
                    "vnic_kind": "baremetal",
                    "local_link_info": [
                        {
                            "switch_id": "00:00:4c:ee:e5:39",
                            "port_id": "1/1/0/1",
                            "switch_info": "s1"
                        }
                    ]
                }
            }"#,
        )
        .unwrap();

        let MechanismEvent::BindPort {
            network,
            port,
            request_id,
        } = event
        else {
            panic!("wrong variant");
        };
        assert_eq!(network.kind, NetworkKind::Vlan);
        assert_eq!(port.vnic_kind, VnicKind::Baremetal);
        assert_eq!(port.local_link_info.len(), 1);
        assert!(request_id.is_none());
    }

    #[test]
    fn test_update_port_unbound_flag_defaults_false() {
        let event: MechanismEvent = serde_json::from_str(
            r#"{
                "event": "update_port",
                "network": {"id": "net-1", "kind": "vxlan", "segmentation_id": 1000},
                "port": {
                    "port_id": "port-1",
                    "mac_address": "aa:bb:cc:dd:ee:ff",
                    "vnic_kind": "baremetal"
                }
            }"#,
        )
        .unwrap();

        let MechanismEvent::UpdatePort { unbound, .. } = event else {
            panic!("wrong variant");
        };
        assert!(!unbound);
    }
}

//! High-level hardware-VTEP table operations.
//!
//! Every mutating operation is one `transact` ending with
//! `op: commit, durable: true`, so a partially applied write never
//! survives a fault. Reads are plain selects.

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};

use fabric_common::{FabricError, FabricResult};

use crate::rpc::OvsdbClient;

/// Encapsulation type for every Physical_Locator this adapter creates.
pub const VXLAN_ENCAP: &str = "vxlan_over_ipv4";

/// Named-uuid handle used when a locator and its referencing row are
/// inserted in the same transaction.
const LOCATOR_UUID_NAME: &str = "new_locator";

/// The durable commit op terminating every write transaction.
fn commit_op() -> Value {
    json!({"op": "commit", "durable": true})
}

/// Encodes an OVSDB uuid reference.
fn uuid_ref(uuid: &str) -> Value {
    json!(["uuid", uuid])
}

/// Extracts the uuid string out of a row's `_uuid` column.
fn row_uuid(row: &Value) -> Option<String> {
    row.get("_uuid")?.get(1)?.as_str().map(str::to_string)
}

/// Unwraps an OVSDB column that may be a scalar or a `["set", [...]]`.
fn scalar_or_first(value: &Value) -> Option<Value> {
    if let Some(arr) = value.as_array() {
        if arr.first().and_then(Value::as_str) == Some("set") {
            return arr.get(1)?.as_array()?.first().cloned();
        }
    }
    Some(value.clone())
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> OvsdbClient<S> {
    /// Returns `(tunnel_ip, hostname)` of the connected switch from
    /// its Physical_Switch row.
    pub async fn get_sw_ep_info(&mut self) -> FabricResult<(String, String)> {
        let results = self
            .transact(vec![json!({
                "op": "select",
                "table": "Physical_Switch",
                "where": [],
                "columns": ["tunnel_ips", "name"],
            })])
            .await?;
        let row = results
            .first()
            .and_then(|r| r.get("rows"))
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .ok_or_else(|| FabricError::ovsdb("no Physical_Switch row"))?;
        let tunnel_ip = row
            .get("tunnel_ips")
            .and_then(|v| scalar_or_first(v))
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| FabricError::ovsdb("Physical_Switch has no tunnel_ips"))?;
        let hostname = row
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok((tunnel_ip, hostname))
    }

    /// Creates a Logical_Switch for `vni`.
    pub async fn insert_logical_switch(&mut self, vni: u32, name: &str) -> FabricResult<()> {
        self.transact(vec![
            json!({
                "op": "insert",
                "table": "Logical_Switch",
                "row": {"name": name, "tunnel_key": vni},
            }),
            commit_op(),
        ])
        .await?;
        Ok(())
    }

    /// Looks up a Logical_Switch uuid by name.
    pub async fn get_logical_switch_uuid(&mut self, name: &str) -> FabricResult<Option<String>> {
        let results = self
            .transact(vec![json!({
                "op": "select",
                "table": "Logical_Switch",
                "where": [["name", "==", name]],
            })])
            .await?;
        Ok(results
            .first()
            .and_then(|r| r.get("rows"))
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(row_uuid))
    }

    /// Deletes a Logical_Switch, purging matching Mcast_Macs_Local
    /// rows in the same transaction.
    pub async fn delete_logical_switch(&mut self, ls_uuid: &str) -> FabricResult<()> {
        self.transact(vec![
            json!({
                "op": "delete",
                "table": "Mcast_Macs_Local",
                "where": [["logical_switch", "==", uuid_ref(ls_uuid)]],
            }),
            json!({
                "op": "delete",
                "table": "Logical_Switch",
                "where": [["_uuid", "==", uuid_ref(ls_uuid)]],
            }),
            commit_op(),
        ])
        .await?;
        Ok(())
    }

    /// Returns the VLAN currently bound to `ls_uuid` on any
    /// Physical_Port, or 0 if the logical switch is unbound.
    pub async fn get_binding_vid(&mut self, ls_uuid: &str) -> FabricResult<u16> {
        let results = self
            .transact(vec![json!({
                "op": "select",
                "table": "Physical_Port",
                "where": [],
                "columns": ["name", "vlan_bindings"],
            })])
            .await?;
        let rows = results
            .first()
            .and_then(|r| r.get("rows"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for row in rows {
            let Some(pairs) = row
                .get("vlan_bindings")
                .and_then(|v| v.get(1))
                .and_then(Value::as_array)
            else {
                continue;
            };
            for pair in pairs {
                let vid = pair.get(0).and_then(Value::as_u64);
                let bound = pair
                    .get(1)
                    .and_then(|u| u.get(1))
                    .and_then(Value::as_str);
                if let (Some(vid), Some(bound)) = (vid, bound) {
                    if bound == ls_uuid {
                        return Ok(vid as u16);
                    }
                }
            }
        }
        Ok(0)
    }

    /// Overwrites the entire `vlan_bindings` map of a Physical_Port
    /// with one `vlan → logical switch` entry.
    pub async fn update_physical_port(
        &mut self,
        port_name: &str,
        vlan: u16,
        ls_uuid: &str,
    ) -> FabricResult<()> {
        self.transact(vec![
            json!({
                "op": "update",
                "table": "Physical_Port",
                "where": [["name", "==", port_name]],
                "row": {"vlan_bindings": ["map", [[vlan, uuid_ref(ls_uuid)]]]},
            }),
            commit_op(),
        ])
        .await?;
        Ok(())
    }

    /// Clears the `vlan_bindings` map of a Physical_Port.
    pub async fn reset_physical_port(&mut self, port_name: &str) -> FabricResult<()> {
        self.transact(vec![
            json!({
                "op": "update",
                "table": "Physical_Port",
                "where": [["name", "==", port_name]],
                "row": {"vlan_bindings": ["map", []]},
            }),
            commit_op(),
        ])
        .await?;
        Ok(())
    }

    /// Binds a port into a logical switch in one transaction: the
    /// Physical_Port's vlan_bindings map is overwritten, prior
    /// Ucast_Macs_Local rows for the MAC are deleted, and a fresh row
    /// is inserted pointing at the switch's own locator — created by
    /// named-uuid when `locator_uuid` is absent.
    pub async fn bind_physical_port(
        &mut self,
        port_name: &str,
        vlan: u16,
        ls_uuid: &str,
        mac: &str,
        tunnel_ip: &str,
        locator_uuid: Option<&str>,
    ) -> FabricResult<()> {
        let mut ops = vec![
            json!({
                "op": "update",
                "table": "Physical_Port",
                "where": [["name", "==", port_name]],
                "row": {"vlan_bindings": ["map", [[vlan, uuid_ref(ls_uuid)]]]},
            }),
            json!({
                "op": "delete",
                "table": "Ucast_Macs_Local",
                "where": [["MAC", "==", mac]],
            }),
        ];
        let locator_ref = match locator_uuid {
            Some(uuid) => uuid_ref(uuid),
            None => {
                ops.push(json!({
                    "op": "insert",
                    "table": "Physical_Locator",
                    "uuid-name": LOCATOR_UUID_NAME,
                    "row": {"dst_ip": tunnel_ip, "encapsulation_type": VXLAN_ENCAP},
                }));
                json!(["named-uuid", LOCATOR_UUID_NAME])
            }
        };
        ops.push(json!({
            "op": "insert",
            "table": "Ucast_Macs_Local",
            "row": {
                "MAC": mac,
                "logical_switch": uuid_ref(ls_uuid),
                "locator": locator_ref,
            },
        }));
        ops.push(commit_op());
        self.transact(ops).await?;
        Ok(())
    }

    /// Looks up a Physical_Locator uuid by destination IP.
    pub async fn get_physical_locator_uuid(
        &mut self,
        dst_ip: &str,
    ) -> FabricResult<Option<String>> {
        let results = self
            .transact(vec![json!({
                "op": "select",
                "table": "Physical_Locator",
                "where": [["dst_ip", "==", dst_ip]],
            })])
            .await?;
        Ok(results
            .first()
            .and_then(|r| r.get("rows"))
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(row_uuid))
    }

    /// Returns Ucast_Macs_Local rows for `mac`.
    pub async fn get_ucast_macs_local(&mut self, mac: &str) -> FabricResult<Vec<Value>> {
        let results = self
            .transact(vec![json!({
                "op": "select",
                "table": "Ucast_Macs_Local",
                "where": [["MAC", "==", mac]],
            })])
            .await?;
        Ok(results
            .first()
            .and_then(|r| r.get("rows"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Deletes every Ucast_Macs_Local row for `mac`.
    pub async fn delete_ucast_macs_local(&mut self, mac: &str) -> FabricResult<()> {
        self.transact(vec![
            json!({
                "op": "delete",
                "table": "Ucast_Macs_Local",
                "where": [["MAC", "==", mac]],
            }),
            commit_op(),
        ])
        .await?;
        Ok(())
    }

    /// Inserts a Ucast_Macs_Local row referring to an existing locator.
    pub async fn insert_ucast_macs_local(
        &mut self,
        mac: &str,
        ls_uuid: &str,
        locator_uuid: &str,
    ) -> FabricResult<()> {
        self.transact(vec![
            json!({
                "op": "insert",
                "table": "Ucast_Macs_Local",
                "row": {
                    "MAC": mac,
                    "logical_switch": uuid_ref(ls_uuid),
                    "locator": uuid_ref(locator_uuid),
                },
            }),
            commit_op(),
        ])
        .await?;
        Ok(())
    }

    /// Inserts a Physical_Locator for `tunnel_ip` and a
    /// Ucast_Macs_Local row referencing it by named-uuid, in one
    /// transaction.
    pub async fn insert_ucast_macs_local_and_locator(
        &mut self,
        mac: &str,
        ls_uuid: &str,
        tunnel_ip: &str,
    ) -> FabricResult<()> {
        self.transact(vec![
            json!({
                "op": "insert",
                "table": "Physical_Locator",
                "uuid-name": LOCATOR_UUID_NAME,
                "row": {"dst_ip": tunnel_ip, "encapsulation_type": VXLAN_ENCAP},
            }),
            json!({
                "op": "insert",
                "table": "Ucast_Macs_Local",
                "row": {
                    "MAC": mac,
                    "logical_switch": uuid_ref(ls_uuid),
                    "locator": ["named-uuid", LOCATOR_UUID_NAME],
                },
            }),
            commit_op(),
        ])
        .await?;
        Ok(())
    }

    /// Returns Ucast_Macs_Remote rows for `mac`.
    pub async fn get_ucast_macs_remote(&mut self, mac: &str) -> FabricResult<Vec<Value>> {
        let results = self
            .transact(vec![json!({
                "op": "select",
                "table": "Ucast_Macs_Remote",
                "where": [["MAC", "==", mac]],
            })])
            .await?;
        Ok(results
            .first()
            .and_then(|r| r.get("rows"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Deletes every Ucast_Macs_Remote row for `mac`.
    pub async fn delete_ucast_macs_remote(&mut self, mac: &str) -> FabricResult<()> {
        self.transact(vec![
            json!({
                "op": "delete",
                "table": "Ucast_Macs_Remote",
                "where": [["MAC", "==", mac]],
            }),
            commit_op(),
        ])
        .await?;
        Ok(())
    }

    /// Inserts a Ucast_Macs_Remote row referring to an existing
    /// locator. One row exists per `(mac, ipaddr)` pair.
    pub async fn insert_ucast_macs_remote(
        &mut self,
        mac: &str,
        ls_uuid: &str,
        locator_uuid: &str,
        ipaddr: &str,
    ) -> FabricResult<()> {
        self.transact(vec![
            json!({
                "op": "insert",
                "table": "Ucast_Macs_Remote",
                "row": {
                    "MAC": mac,
                    "logical_switch": uuid_ref(ls_uuid),
                    "locator": uuid_ref(locator_uuid),
                    "ipaddr": ipaddr,
                },
            }),
            commit_op(),
        ])
        .await?;
        Ok(())
    }

    /// Inserts a Physical_Locator for `tunnel_ip` and a
    /// Ucast_Macs_Remote row referencing it by named-uuid, in one
    /// transaction.
    pub async fn insert_ucast_macs_remote_and_locator(
        &mut self,
        mac: &str,
        ls_uuid: &str,
        tunnel_ip: &str,
        ipaddr: &str,
    ) -> FabricResult<()> {
        self.transact(vec![
            json!({
                "op": "insert",
                "table": "Physical_Locator",
                "uuid-name": LOCATOR_UUID_NAME,
                "row": {"dst_ip": tunnel_ip, "encapsulation_type": VXLAN_ENCAP},
            }),
            json!({
                "op": "insert",
                "table": "Ucast_Macs_Remote",
                "row": {
                    "MAC": mac,
                    "logical_switch": uuid_ref(ls_uuid),
                    "locator": ["named-uuid", LOCATOR_UUID_NAME],
                    "ipaddr": ipaddr,
                },
            }),
            commit_op(),
        ])
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    use crate::framing::FrameBuffer;

    fn client_pair() -> (OvsdbClient<DuplexStream>, DuplexStream) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        (
            OvsdbClient::over(local, "test:6640", Duration::from_secs(5)),
            remote,
        )
    }

    async fn read_request(server: &mut DuplexStream) -> Value {
        let mut fb = FrameBuffer::new();
        loop {
            if let Some(frame) = fb.next_frame() {
                return serde_json::from_slice(&frame).unwrap();
            }
            let mut chunk = [0u8; 8192];
            let n = server.read(&mut chunk).await.unwrap();
            assert!(n > 0);
            fb.push(&chunk[..n]);
        }
    }

    async fn reply_with(server: &mut DuplexStream, req: &Value, result: Value) {
        let reply = json!({
            "id": req["id"].as_str().unwrap(),
            "result": result,
            "error": null,
        });
        server
            .write_all(reply.to_string().as_bytes())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_insert_logical_switch_commits_durably() {
        let (mut client, mut server) = client_pair();

        let responder = tokio::spawn(async move {
            let req = read_request(&mut server).await;
            let ops = req["params"].as_array().unwrap();
            assert_eq!(ops[0], "hardware_vtep");
            assert_eq!(ops[1]["op"], "insert");
            assert_eq!(ops[1]["table"], "Logical_Switch");
            assert_eq!(ops[1]["row"]["name"], "aabbcc");
            assert_eq!(ops[1]["row"]["tunnel_key"], 1000);
            // Last op is the durable commit
            let last = ops.last().unwrap();
            assert_eq!(last["op"], "commit");
            assert_eq!(last["durable"], true);
            reply_with(&mut server, &req, json!([{"uuid": ["uuid", "u1"]}, {}])).await;
        });

        client.insert_logical_switch(1000, "aabbcc").await.unwrap();
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_get_logical_switch_uuid() {
        let (mut client, mut server) = client_pair();

        let responder = tokio::spawn(async move {
            let req = read_request(&mut server).await;
            assert_eq!(req["params"][1]["op"], "select");
            assert_eq!(req["params"][1]["where"][0], json!(["name", "==", "aabbcc"]));
            reply_with(
                &mut server,
                &req,
                json!([{"rows": [{"_uuid": ["uuid", "ls-uuid-1"], "name": "aabbcc"}]}]),
            )
            .await;
        });

        let uuid = client.get_logical_switch_uuid("aabbcc").await.unwrap();
        assert_eq!(uuid.as_deref(), Some("ls-uuid-1"));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_logical_switch_purges_mcast_rows() {
        let (mut client, mut server) = client_pair();

        let responder = tokio::spawn(async move {
            let req = read_request(&mut server).await;
            let ops = req["params"].as_array().unwrap();
            assert_eq!(ops[1]["table"], "Mcast_Macs_Local");
            assert_eq!(ops[1]["op"], "delete");
            assert_eq!(ops[2]["table"], "Logical_Switch");
            assert_eq!(ops[2]["op"], "delete");
            assert_eq!(ops[3]["op"], "commit");
            reply_with(&mut server, &req, json!([{"count": 2}, {"count": 1}, {}])).await;
        });

        client.delete_logical_switch("ls-uuid-1").await.unwrap();
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_get_binding_vid() {
        let (mut client, mut server) = client_pair();

        let responder = tokio::spawn(async move {
            let req = read_request(&mut server).await;
            reply_with(
                &mut server,
                &req,
                json!([{"rows": [
                    {"name": "0/1", "vlan_bindings": ["map", []]},
                    {"name": "0/2", "vlan_bindings": ["map", [[3, ["uuid", "ls-uuid-1"]]]]},
                ]}]),
            )
            .await;
        });

        let vid = client.get_binding_vid("ls-uuid-1").await.unwrap();
        assert_eq!(vid, 3);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_get_binding_vid_unbound_is_zero() {
        let (mut client, mut server) = client_pair();

        let responder = tokio::spawn(async move {
            let req = read_request(&mut server).await;
            reply_with(
                &mut server,
                &req,
                json!([{"rows": [{"name": "0/1", "vlan_bindings": ["map", []]}]}]),
            )
            .await;
        });

        assert_eq!(client.get_binding_vid("missing").await.unwrap(), 0);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_update_physical_port_overwrites_bindings() {
        let (mut client, mut server) = client_pair();

        let responder = tokio::spawn(async move {
            let req = read_request(&mut server).await;
            let op = &req["params"][1];
            assert_eq!(op["op"], "update");
            assert_eq!(op["where"][0], json!(["name", "==", "0/2"]));
            assert_eq!(
                op["row"]["vlan_bindings"],
                json!(["map", [[3, ["uuid", "ls-uuid-1"]]]])
            );
            assert_eq!(req["params"][2]["op"], "commit");
            reply_with(&mut server, &req, json!([{"count": 1}, {}])).await;
        });

        client.update_physical_port("0/2", 3, "ls-uuid-1").await.unwrap();
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_physical_port_is_one_durable_transact() {
        let (mut client, mut server) = client_pair();

        let responder = tokio::spawn(async move {
            let req = read_request(&mut server).await;
            let ops = req["params"].as_array().unwrap();
            // One transaction carries the whole binding
            assert_eq!(ops[1]["op"], "update");
            assert_eq!(ops[1]["table"], "Physical_Port");
            assert_eq!(ops[1]["where"][0], json!(["name", "==", "0/2"]));
            assert_eq!(
                ops[1]["row"]["vlan_bindings"],
                json!(["map", [[3, ["uuid", "ls-uuid-1"]]]])
            );
            assert_eq!(ops[2]["op"], "delete");
            assert_eq!(ops[2]["table"], "Ucast_Macs_Local");
            assert_eq!(ops[3]["op"], "insert");
            assert_eq!(ops[3]["table"], "Physical_Locator");
            assert_eq!(ops[3]["row"]["dst_ip"], "10.0.0.1");
            assert_eq!(ops[4]["op"], "insert");
            assert_eq!(ops[4]["table"], "Ucast_Macs_Local");
            assert_eq!(
                ops[4]["row"]["locator"],
                json!(["named-uuid", "new_locator"])
            );
            let last = ops.last().unwrap();
            assert_eq!(last["op"], "commit");
            assert_eq!(last["durable"], true);
            reply_with(
                &mut server,
                &req,
                json!([{"count": 1}, {"count": 0}, {"uuid": ["uuid", "loc1"]}, {"uuid": ["uuid", "m1"]}, {}]),
            )
            .await;
        });

        client
            .bind_physical_port("0/2", 3, "ls-uuid-1", "aa:bb:cc:dd:ee:ff", "10.0.0.1", None)
            .await
            .unwrap();
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_physical_port_reuses_existing_locator() {
        let (mut client, mut server) = client_pair();

        let responder = tokio::spawn(async move {
            let req = read_request(&mut server).await;
            let ops = req["params"].as_array().unwrap();
            // No locator insert when one already exists
            assert_eq!(ops.len(), 5); // schema + update + delete + insert + commit
            assert_eq!(ops[3]["table"], "Ucast_Macs_Local");
            assert_eq!(ops[3]["row"]["locator"], json!(["uuid", "loc-1"]));
            reply_with(
                &mut server,
                &req,
                json!([{"count": 1}, {"count": 1}, {"uuid": ["uuid", "m1"]}, {}]),
            )
            .await;
        });

        client
            .bind_physical_port(
                "0/2",
                3,
                "ls-uuid-1",
                "aa:bb:cc:dd:ee:ff",
                "10.0.0.1",
                Some("loc-1"),
            )
            .await
            .unwrap();
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_ucast_macs_local_and_locator_uses_named_uuid() {
        let (mut client, mut server) = client_pair();

        let responder = tokio::spawn(async move {
            let req = read_request(&mut server).await;
            let ops = req["params"].as_array().unwrap();
            assert_eq!(ops[1]["table"], "Physical_Locator");
            assert_eq!(ops[1]["uuid-name"], "new_locator");
            assert_eq!(ops[1]["row"]["dst_ip"], "10.0.0.1");
            assert_eq!(ops[1]["row"]["encapsulation_type"], "vxlan_over_ipv4");
            assert_eq!(ops[2]["table"], "Ucast_Macs_Local");
            assert_eq!(
                ops[2]["row"]["locator"],
                json!(["named-uuid", "new_locator"])
            );
            assert_eq!(ops[3]["op"], "commit");
            reply_with(
                &mut server,
                &req,
                json!([{"uuid": ["uuid", "loc1"]}, {"uuid": ["uuid", "m1"]}, {}]),
            )
            .await;
        });

        client
            .insert_ucast_macs_local_and_locator("aa:bb:cc:dd:ee:ff", "ls-uuid-1", "10.0.0.1")
            .await
            .unwrap();
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_row_carries_ipaddr() {
        let (mut client, mut server) = client_pair();

        let responder = tokio::spawn(async move {
            let req = read_request(&mut server).await;
            let op = &req["params"][2];
            assert_eq!(op["table"], "Ucast_Macs_Remote");
            assert_eq!(op["row"]["ipaddr"], "192.168.2.10");
            reply_with(
                &mut server,
                &req,
                json!([{"uuid": ["uuid", "loc1"]}, {"uuid": ["uuid", "m1"]}, {}]),
            )
            .await;
        });

        client
            .insert_ucast_macs_remote_and_locator(
                "aa:bb:cc:dd:ee:ff",
                "ls-uuid-1",
                "10.0.0.2",
                "192.168.2.10",
            )
            .await
            .unwrap();
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_get_sw_ep_info_set_column() {
        let (mut client, mut server) = client_pair();

        let responder = tokio::spawn(async move {
            let req = read_request(&mut server).await;
            reply_with(
                &mut server,
                &req,
                json!([{"rows": [{"name": "sw1", "tunnel_ips": ["set", ["10.0.0.1"]]}]}]),
            )
            .await;
        });

        let (ip, name) = client.get_sw_ep_info().await.unwrap();
        assert_eq!(ip, "10.0.0.1");
        assert_eq!(name, "sw1");
        responder.await.unwrap();
    }

    #[test]
    fn test_scalar_or_first() {
        assert_eq!(
            scalar_or_first(&json!("10.0.0.1")).unwrap(),
            json!("10.0.0.1")
        );
        assert_eq!(
            scalar_or_first(&json!(["set", ["10.0.0.1", "10.0.0.2"]])).unwrap(),
            json!("10.0.0.1")
        );
    }
}

//! Correlated JSON-RPC transport over the framed OVSDB stream.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace, warn};

use fabric_common::{FabricError, FabricResult};

use crate::framing::FrameBuffer;

/// Default OVSDB management port.
pub const OVSDB_PORT: u16 = 6640;

/// Schema all transactions run against.
pub const HARDWARE_VTEP_SCHEMA: &str = "hardware_vtep";

/// Send/receive attempts before a transport fault is surfaced.
pub const MAX_RETRIES: usize = 3;

/// Read chunk size.
const READ_CHUNK: usize = 8192;

/// JSON-RPC client bound to one OVSDB endpoint.
///
/// Generic over the stream so tests can drive it through an in-memory
/// duplex pipe.
pub struct OvsdbClient<S> {
    stream: S,
    frames: FrameBuffer,
    endpoint: String,
    io_timeout: Duration,
}

impl OvsdbClient<TcpStream> {
    /// Connects to the switch's OVSDB server.
    pub async fn connect(host: &str, port: u16, io_timeout: Duration) -> FabricResult<Self> {
        let endpoint = format!("{}:{}", host, port);
        let stream = timeout(io_timeout, TcpStream::connect(&endpoint))
            .await
            .map_err(|_| FabricError::timeout(&endpoint, "OVSDB connect"))?
            .map_err(|e| FabricError::transport(&endpoint, e.to_string()))?;
        debug!(endpoint = %endpoint, "OVSDB session established");
        Ok(Self::over(stream, endpoint, io_timeout))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> OvsdbClient<S> {
    /// Wraps an already-connected stream.
    pub fn over(stream: S, endpoint: impl Into<String>, io_timeout: Duration) -> Self {
        Self {
            stream,
            frames: FrameBuffer::new(),
            endpoint: endpoint.into(),
            io_timeout,
        }
    }

    /// The endpoint this client talks to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Runs one `transact` against the hardware_vtep schema and
    /// returns the per-op result array.
    ///
    /// The reply must carry our request id; `method: "echo"` traffic
    /// is consumed silently. A populated `error` at the top level or
    /// inside any result element raises an OVSDB error.
    pub async fn transact(&mut self, ops: Vec<Value>) -> FabricResult<Vec<Value>> {
        let id = Self::next_request_id();
        let mut params = vec![json!(HARDWARE_VTEP_SCHEMA)];
        params.extend(ops);
        let request = json!({
            "method": "transact",
            "params": params,
            "id": id,
        });

        self.send(&request).await?;
        let reply = self.recv_matching(&id).await?;
        Self::check_reply(&reply)
    }

    /// 128-bit random request id, hex encoded.
    fn next_request_id() -> String {
        format!("{:032x}", rand::random::<u128>())
    }

    /// Serializes and writes one request, retrying transport faults.
    async fn send(&mut self, request: &Value) -> FabricResult<()> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| FabricError::ovsdb(format!("cannot encode request: {}", e)))?;
        trace!(endpoint = %self.endpoint, request = %request, "OVSDB send");

        let mut last_err = None;
        for attempt in 1..=MAX_RETRIES {
            match timeout(self.io_timeout, self.stream.write_all(&payload)).await {
                Ok(Ok(())) => match timeout(self.io_timeout, self.stream.flush()).await {
                    Ok(Ok(())) => return Ok(()),
                    Ok(Err(e)) => last_err = Some(e.to_string()),
                    Err(_) => last_err = Some("write timed out".to_string()),
                },
                Ok(Err(e)) => last_err = Some(e.to_string()),
                Err(_) => last_err = Some("write timed out".to_string()),
            }
            warn!(
                endpoint = %self.endpoint,
                attempt,
                "OVSDB send failed, retrying"
            );
        }
        Err(FabricError::transport(
            &self.endpoint,
            format!(
                "send failed after {} attempts: {}",
                MAX_RETRIES,
                last_err.unwrap_or_default()
            ),
        ))
    }

    /// Reads frames until one carries `id`, consuming echo traffic.
    async fn recv_matching(&mut self, id: &str) -> FabricResult<Value> {
        let deadline = Instant::now() + self.io_timeout;
        let mut faults = 0usize;
        loop {
            while let Some(frame) = self.frames.next_frame() {
                let value: Value = match serde_json::from_slice(&frame) {
                    Ok(v) => v,
                    Err(e) => {
                        return Err(FabricError::ovsdb(format!("unparseable frame: {}", e)));
                    }
                };
                if value.get("method").and_then(Value::as_str) == Some("echo") {
                    trace!(endpoint = %self.endpoint, "OVSDB echo consumed");
                    continue;
                }
                if value.get("id").and_then(Value::as_str) == Some(id) {
                    trace!(endpoint = %self.endpoint, reply = %value, "OVSDB reply");
                    return Ok(value);
                }
                debug!(endpoint = %self.endpoint, "Dropping uncorrelated OVSDB frame");
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(FabricError::timeout(&self.endpoint, "OVSDB reply"));
            }
            let mut chunk = [0u8; READ_CHUNK];
            match timeout(deadline - now, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) => {
                    return Err(FabricError::transport(&self.endpoint, "connection closed by peer"));
                }
                Ok(Ok(n)) => self.frames.push(&chunk[..n]),
                Ok(Err(e)) => {
                    faults += 1;
                    if faults >= MAX_RETRIES {
                        return Err(FabricError::transport(&self.endpoint, e.to_string()));
                    }
                    warn!(endpoint = %self.endpoint, error = %e, "OVSDB read failed, retrying");
                }
                Err(_) => {
                    return Err(FabricError::timeout(&self.endpoint, "OVSDB reply"));
                }
            }
        }
    }

    /// Validates a reply: the top-level error and every per-op error
    /// must be null or absent. Returns the result array.
    fn check_reply(reply: &Value) -> FabricResult<Vec<Value>> {
        if let Some(err) = reply.get("error") {
            if !err.is_null() {
                return Err(FabricError::ovsdb(err.to_string()));
            }
        }
        let results = reply
            .get("result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for entry in &results {
            if let Some(err) = entry.get("error") {
                if !err.is_null() {
                    return Err(FabricError::ovsdb(format!(
                        "operation failed: {} ({})",
                        err,
                        entry
                            .get("details")
                            .and_then(Value::as_str)
                            .unwrap_or("no details")
                    )));
                }
            }
        }
        Ok(results)
    }
}

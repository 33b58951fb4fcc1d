//! Per-switch SSH shell transport for FOS switches.
//!
//! Each FOS switch gets one SSH session with a PTY-backed shell
//! channel. The switch CLI is line oriented and does not frame its
//! replies, so reads use a dwell loop: collect data until the channel
//! stays silent for one poll interval, up to 50 polls of 100 ms.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh::ChannelMsg;
use russh_keys::key;
use tokio::time::timeout;
use tracing::{debug, trace};

use fabric_common::{FabricError, FabricResult};

/// Receive buffer size for one CLI reply.
pub const RECV_BUFFER_SIZE: usize = 32_768;

/// Number of silent polls before a reply is considered complete.
const MAX_IDLE_POLLS: u32 = 50;

/// Poll interval of the dwell loop.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Client handler that accepts any server host key.
///
/// The switches authenticate us with a plaintext password; there is no
/// provisioned known-hosts store on the management network.
struct PermissiveClient;

#[async_trait]
impl client::Handler for PermissiveClient {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// One SSH shell session to one FOS switch.
pub struct SshSession {
    handle: client::Handle<PermissiveClient>,
    channel: russh::Channel<client::Msg>,
    endpoint: String,
}

impl SshSession {
    /// Connects and opens a PTY shell channel within `connect_timeout`.
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        connect_timeout: Duration,
    ) -> FabricResult<Self> {
        let endpoint = format!("{}:{}", host, port);
        let config = Arc::new(client::Config::default());

        let mut handle = timeout(
            connect_timeout,
            client::connect(config, (host, port), PermissiveClient),
        )
        .await
        .map_err(|_| FabricError::timeout(&endpoint, "SSH connect"))?
        .map_err(|e| FabricError::transport(&endpoint, e.to_string()))?;

        let authenticated = handle
            .authenticate_password(username, password)
            .await
            .map_err(|e| FabricError::transport(&endpoint, e.to_string()))?;
        if !authenticated {
            return Err(FabricError::transport(&endpoint, "password authentication rejected"));
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| FabricError::transport(&endpoint, e.to_string()))?;
        channel
            .request_pty(false, "vt100", 80, 24, 0, 0, &[])
            .await
            .map_err(|e| FabricError::transport(&endpoint, e.to_string()))?;
        channel
            .request_shell(false)
            .await
            .map_err(|e| FabricError::transport(&endpoint, e.to_string()))?;

        debug!(endpoint = %endpoint, "SSH session established");
        Ok(Self {
            handle,
            channel,
            endpoint,
        })
    }

    /// The endpoint this session is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends raw data to the shell.
    pub async fn send(&mut self, data: &str) -> FabricResult<()> {
        trace!(endpoint = %self.endpoint, data = %data.trim_end(), "SSH send");
        self.channel
            .data(data.as_bytes())
            .await
            .map_err(|e| FabricError::transport(&self.endpoint, e.to_string()))
    }

    /// Sends one CLI line, appending the newline.
    pub async fn send_line(&mut self, cmd: &str) -> FabricResult<()> {
        self.send(&format!("{}\n", cmd)).await
    }

    /// Reads one CLI reply via the dwell loop.
    ///
    /// Collects channel data until the shell is silent for one poll
    /// interval; a reply larger than the receive buffer is truncated
    /// at the buffer size. Times out if nothing arrives at all.
    pub async fn read_reply(&mut self) -> FabricResult<String> {
        let mut buf: Vec<u8> = Vec::new();
        let mut polls = 0u32;
        loop {
            match timeout(POLL_INTERVAL, self.channel.wait()).await {
                Ok(Some(ChannelMsg::Data { data })) => {
                    let room = RECV_BUFFER_SIZE.saturating_sub(buf.len());
                    buf.extend_from_slice(&data[..data.len().min(room)]);
                }
                Ok(Some(_)) => {
                    // Window adjusts and other control messages.
                }
                Ok(None) => {
                    return Err(FabricError::transport(&self.endpoint, "SSH channel closed"));
                }
                Err(_) => {
                    if !buf.is_empty() {
                        break;
                    }
                    polls += 1;
                    if polls >= MAX_IDLE_POLLS {
                        return Err(FabricError::timeout(&self.endpoint, "CLI reply"));
                    }
                }
            }
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Closes the session.
    pub async fn close(&mut self) -> FabricResult<()> {
        debug!(endpoint = %self.endpoint, "Closing SSH session");
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| FabricError::transport(&self.endpoint, e.to_string()))
    }
}

//! SSH CLI wrapper for one FOS switch.
//!
//! The FOS shell is line oriented: send a command, collect the reply
//! with the session's dwell loop, strip the echo and trailing prompt.
//! A transport fault drops the session, reconnects once, and retries
//! the command.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use fabric_common::{FabricResult, FosswConfig};
use fabric_session::{LockRegistry, SshSession};

use crate::commands::SAVE_CONFIG_CMD;

/// CLI contract the FOS drivers program against.
#[async_trait]
pub trait FosCli: Send {
    /// Executes one command and returns its output with echo and
    /// prompt framing stripped.
    async fn exec(&mut self, cmd: &str) -> FabricResult<String>;

    /// Closes the session.
    async fn close(&mut self) -> FabricResult<()>;
}

/// Opens CLI sessions to FOS switches.
///
/// The drivers go through this seam so their command sequences are
/// testable against mock sessions; production uses [`SshConnect`].
#[async_trait]
pub trait FosConnect: Send + Sync {
    type Cli: FosCli + 'static;

    /// Opens a session to the switch at `ip`.
    async fn open(&self, ip: &str) -> FabricResult<Self::Cli>;
}

/// Connects over SSH with the adapter's credentials.
pub struct SshConnect {
    cfg: FosswConfig,
}

impl SshConnect {
    pub fn new(cfg: FosswConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl FosConnect for SshConnect {
    type Cli = FosSwitchClient;

    async fn open(&self, ip: &str) -> FabricResult<FosSwitchClient> {
        FosSwitchClient::connect(ip, &self.cfg).await
    }
}

/// One SSH CLI client for one FOS switch.
pub struct FosSwitchClient {
    session: Option<SshSession>,
    host: String,
    port: u16,
    username: String,
    password: String,
    timeout: Duration,
}

impl FosSwitchClient {
    /// Connects to the switch and enters privileged mode.
    pub async fn connect(host: &str, cfg: &FosswConfig) -> FabricResult<Self> {
        let mut client = Self {
            session: None,
            host: host.to_string(),
            port: cfg.port,
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            timeout: Duration::from_secs(cfg.timeout),
        };
        client.open().await?;
        Ok(client)
    }

    async fn open(&mut self) -> FabricResult<()> {
        let mut session = SshSession::connect(
            &self.host,
            self.port,
            &self.username,
            &self.password,
            self.timeout,
        )
        .await?;
        // Drain the banner and initial prompt
        let _ = session.read_reply().await;
        // Privileged mode; some firmware asks for an enable password,
        // which is empty on the management plane
        session.send_line("enable").await?;
        if let Ok(reply) = session.read_reply().await {
            if reply.contains("Password:") {
                session.send_line("").await?;
                let _ = session.read_reply().await;
            }
        }
        debug!(host = %self.host, "FOS CLI ready");
        self.session = Some(session);
        Ok(())
    }

    async fn exec_once(&mut self, cmd: &str) -> FabricResult<String> {
        if self.session.is_none() {
            self.open().await?;
        }
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| fabric_common::FabricError::transport(&self.host, "session not established"))?;
        session.send_line(cmd).await?;
        let raw = session.read_reply().await?;
        Ok(strip_reply(cmd, &raw))
    }

    async fn drop_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                debug!(host = %self.host, error = %e, "Error closing session");
            }
        }
    }
}

#[async_trait]
impl FosCli for FosSwitchClient {
    async fn exec(&mut self, cmd: &str) -> FabricResult<String> {
        match self.exec_once(cmd).await {
            Err(e) if e.is_retryable() => {
                warn!(host = %self.host, error = %e, "Transport fault, reconnecting once");
                self.drop_session().await;
                self.exec_once(cmd).await
            }
            other => other,
        }
    }

    async fn close(&mut self) -> FabricResult<()> {
        self.drop_session().await;
        Ok(())
    }
}

/// Strips the command echo and the trailing prompt line.
fn strip_reply(cmd: &str, raw: &str) -> String {
    let text = raw.replace('\r', "");
    let mut lines: Vec<&str> = text.lines().collect();
    if lines.first().map(|l| l.trim() == cmd.trim()).unwrap_or(false) {
        lines.remove(0);
    }
    if lines
        .last()
        .map(|l| l.trim_end().ends_with('#') || l.trim_end().ends_with('>'))
        .unwrap_or(false)
    {
        lines.pop();
    }
    lines.join("\n")
}

/// Persists the running configuration on every switch in the fleet.
///
/// Runs strictly after the caller's mutations: each switch is taken
/// under its own lock, saved, and released in turn.
pub async fn save_all_fossw(cfg: &FosswConfig, locks: &LockRegistry) -> FabricResult<()> {
    for ip in &cfg.fossw_ips {
        let lock = locks.lock_for(ip);
        let _guard = lock.lock().await;
        let mut cli = FosSwitchClient::connect(ip, cfg).await?;
        let result = cli.exec(SAVE_CONFIG_CMD).await;
        let _ = cli.close().await;
        result?;
        debug!(host = %ip, "Running config persisted");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_reply_removes_echo_and_prompt() {
        let raw = "show hardware\r\nBurned In MAC Address... 00:00:4C:EE:E5:39\r\n(sw1) #";
        assert_eq!(
            strip_reply("show hardware", raw),
            "Burned In MAC Address... 00:00:4C:EE:E5:39"
        );
    }

    #[test]
    fn test_strip_reply_keeps_body_without_prompt() {
        let raw = "vlan 8\nsome output";
        assert_eq!(strip_reply("vlan 8", raw), "some output");
    }

    #[test]
    fn test_strip_reply_empty_body() {
        assert_eq!(strip_reply("exit", "exit\n(sw1) #"), "");
    }
}

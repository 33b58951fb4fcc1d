//! Prompt-driven CLI manager for the C-Fabric controller.
//!
//! The fabric CLI is a finite state machine over prompt modes; one
//! regex discriminates every prompt suffix. The manager owns the
//! telnet session, performs the login handshake (with busy-banner
//! retries), and exposes a request/response contract to the driver:
//! `execute`, config fetches with pager handling, and `configure`
//! batches with the commit decision left to the caller.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use fabric_common::{FabricError, FabricResult};
use fabric_session::TelnetSession;

use crate::commands::{
    show_candidate_config, show_running_config, COMMIT_CMD, CONFIGURE_CMD, EXIT_CMD,
    PAGER_DISABLE_CMD, PAGER_ENABLE_CMD, SAVE_CMD,
};

/// Marker the CLI prints when a command is rejected.
pub const ERROR_MARKER: &str = "<ERROR>";

/// Login prompt.
const LOGIN_PROMPT: &str = "Login: ";

/// Password prompt.
const PASSWORD_PROMPT: &str = "Password: ";

/// Admin prompt suffix awaited after login.
const ADMIN_PROMPT: &str = "# ";

/// Bounded timeout for the login handshake.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Backoff between busy-banner retries.
const BUSY_BACKOFF: Duration = Duration::from_secs(3);

/// Banner markers indicating the switch cannot take another session.
const BUSY_MARKERS: [&str; 2] = ["busy", "too many sessions"];

/// One regex discriminates every prompt suffix; longest first so the
/// config modes win over the bare admin prompt.
static PROMPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\(config-if\)#|\(config\)#|#|>) \z").expect("Invalid regex pattern")
});

/// CLI prompt modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliMode {
    Login,
    User,
    Admin,
    Config,
    ConfigIf,
}

/// Classifies the mode from output ending in a prompt.
fn classify_prompt(output: &str) -> CliMode {
    match PROMPT_RE
        .captures_iter(output)
        .last()
        .map(|cap| cap[1].to_string())
        .as_deref()
    {
        Some("(config-if)#") => CliMode::ConfigIf,
        Some("(config)#") => CliMode::Config,
        Some("#") => CliMode::Admin,
        Some(">") => CliMode::User,
        _ => CliMode::Login,
    }
}

fn is_busy_banner(banner: &str) -> bool {
    let lower = banner.to_ascii_lowercase();
    BUSY_MARKERS.iter().any(|m| lower.contains(m))
}

/// Strips the command echo and trailing prompt from raw output.
fn strip_frame(cmd: &str, raw: &str) -> String {
    let text = raw.replace('\r', "");
    let mut lines: Vec<&str> = text.lines().collect();
    if lines.first().map(|l| l.trim() == cmd.trim()).unwrap_or(false) {
        lines.remove(0);
    }
    if !lines.is_empty() {
        lines.pop();
    }
    lines.join("\n")
}

/// Session-layer contract the fabric VLAN driver programs against.
#[async_trait]
pub trait CfabCli: Send {
    /// Fetches the running configuration, optionally prefix filtered.
    async fn get_running_config(&mut self, prefix: Option<&str>) -> FabricResult<String>;

    /// Fetches the candidate configuration, optionally prefix filtered.
    async fn get_candidate_config(&mut self, prefix: Option<&str>) -> FabricResult<String>;

    /// Enters config mode, submits each command, and commits when
    /// asked. Within one driver operation only the final call may set
    /// `commit`.
    async fn configure(&mut self, cmds: &[String], commit: bool) -> FabricResult<()>;

    /// Closes the session.
    async fn close_session(&mut self) -> FabricResult<()>;
}

/// Stateful CLI driver for one fabric controller.
pub struct CliManager {
    session: Option<TelnetSession>,
    address: String,
    username: String,
    password: String,
    save_on_commit: bool,
    pager_enabled: bool,
    timeout: Duration,
}

impl CliManager {
    /// Creates a manager for the given endpoint. The session is lazy:
    /// nothing connects until the first command.
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        save_on_commit: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            session: None,
            address: address.into(),
            username: username.into(),
            password: password.into(),
            save_on_commit,
            pager_enabled: true,
            timeout,
        }
    }

    /// Establishes or reuses a session for the given credentials.
    ///
    /// Idempotent when the triple matches the stored one and a session
    /// is open; otherwise the old session is dropped and a new login
    /// performed.
    pub async fn connect(&mut self, address: &str, username: &str, password: &str) -> FabricResult<()> {
        let unchanged =
            self.address == address && self.username == username && self.password == password;
        if unchanged && self.session.is_some() {
            return Ok(());
        }
        self.drop_session().await;
        self.address = address.to_string();
        self.username = username.to_string();
        self.password = password.to_string();
        self.open_session().await
    }

    /// Performs the login handshake, retrying on a busy banner.
    ///
    /// A retry is triggered only when the busy marker is present in
    /// banner text actually read from the socket; a clean transport
    /// fault propagates immediately.
    async fn open_session(&mut self) -> FabricResult<()> {
        let attempts = (self.timeout.as_secs() / BUSY_BACKOFF.as_secs()).max(1);
        let mut last_banner = String::new();
        for attempt in 1..=attempts {
            let mut session = TelnetSession::connect(&self.address, self.timeout).await?;
            let banner = match session.read_until(LOGIN_PROMPT, LOGIN_TIMEOUT).await {
                Ok(banner) => banner,
                Err(err) => {
                    let banner = session.buffered();
                    if !is_busy_banner(&banner) {
                        return Err(err);
                    }
                    banner
                }
            };
            if is_busy_banner(&banner) {
                warn!(
                    address = %self.address,
                    attempt,
                    "Switch busy at login, backing off"
                );
                last_banner = banner;
                let _ = session.close().await;
                tokio::time::sleep(BUSY_BACKOFF).await;
                continue;
            }
            session.write_line(&self.username).await?;
            session.read_until(PASSWORD_PROMPT, LOGIN_TIMEOUT).await?;
            session.write_line(&self.password).await?;
            session.read_until(ADMIN_PROMPT, LOGIN_TIMEOUT).await?;
            debug!(address = %self.address, "Fabric CLI login complete");
            self.session = Some(session);
            return Ok(());
        }
        Err(FabricError::switch_busy(
            &self.address,
            last_banner.trim().to_string(),
        ))
    }

    async fn ensure_session(&mut self) -> FabricResult<()> {
        if self.session.is_none() {
            self.open_session().await?;
        }
        Ok(())
    }

    async fn drop_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                debug!(address = %self.address, error = %e, "Error closing session");
            }
        }
    }

    /// Sends the bare newline probe and classifies the prompt.
    pub async fn get_mode(&mut self) -> FabricResult<CliMode> {
        if self.session.is_none() {
            return Ok(CliMode::Login);
        }
        let timeout = self.timeout;
        let session = self.session_mut()?;
        session.write("\n").await?;
        let (_, raw) = session.expect(&[PROMPT_RE.clone()], timeout).await?;
        Ok(classify_prompt(&raw))
    }

    /// Executes one command, stripping echo and prompt framing.
    ///
    /// A transport fault drops the session, reconnects once, and
    /// retries the command; a second fault propagates.
    pub async fn execute(&mut self, cmd: &str) -> FabricResult<String> {
        match self.execute_once(cmd).await {
            Err(e) if e.is_retryable() => {
                warn!(address = %self.address, error = %e, "Transport fault, reconnecting once");
                self.drop_session().await;
                self.execute_once(cmd).await
            }
            other => other,
        }
    }

    async fn execute_once(&mut self, cmd: &str) -> FabricResult<String> {
        self.ensure_session().await?;
        let timeout = self.timeout;
        let session = self.session_mut()?;
        session.write_line(cmd).await?;
        let (_, raw) = session.expect(&[PROMPT_RE.clone()], timeout).await?;
        let output = strip_frame(cmd, &raw);
        if output.contains(ERROR_MARKER) {
            return Err(FabricError::cli(&self.address, cmd, output));
        }
        Ok(output)
    }

    fn session_mut(&mut self) -> FabricResult<&mut TelnetSession> {
        self.session
            .as_mut()
            .ok_or_else(|| FabricError::transport(&self.address, "session not established"))
    }

    /// Leaves any config mode, then fetches a configuration with the
    /// pager temporarily disabled.
    async fn fetch_config(&mut self, cmd: &str) -> FabricResult<String> {
        let mode = self.get_mode().await?;
        if mode == CliMode::ConfigIf {
            self.execute(EXIT_CMD).await?;
        }
        if matches!(mode, CliMode::Config | CliMode::ConfigIf) {
            self.execute(EXIT_CMD).await?;
        }
        let pager_was_enabled = self.pager_enabled;
        if pager_was_enabled {
            self.execute(PAGER_DISABLE_CMD).await?;
            self.pager_enabled = false;
        }
        let result = self.execute(cmd).await;
        if pager_was_enabled {
            if self.execute(PAGER_ENABLE_CMD).await.is_ok() {
                self.pager_enabled = true;
            }
        }
        result
    }
}

#[async_trait]
impl CfabCli for CliManager {
    async fn get_running_config(&mut self, prefix: Option<&str>) -> FabricResult<String> {
        self.fetch_config(&show_running_config(prefix)).await
    }

    async fn get_candidate_config(&mut self, prefix: Option<&str>) -> FabricResult<String> {
        self.fetch_config(&show_candidate_config(prefix)).await
    }

    async fn configure(&mut self, cmds: &[String], commit: bool) -> FabricResult<()> {
        let mode = self.get_mode().await?;
        if !matches!(mode, CliMode::Config | CliMode::ConfigIf) {
            self.execute(CONFIGURE_CMD).await?;
        }
        for cmd in cmds {
            self.execute(cmd).await?;
        }
        if commit {
            self.execute(COMMIT_CMD).await?;
            if self.save_on_commit {
                self.execute(SAVE_CMD).await?;
            }
            self.execute(EXIT_CMD).await?;
        }
        Ok(())
    }

    async fn close_session(&mut self) -> FabricResult<()> {
        self.drop_session().await;
        Ok(())
    }
}

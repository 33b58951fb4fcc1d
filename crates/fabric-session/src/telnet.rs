//! Persistent telnet transport for the C-Fabric CLI.
//!
//! The fabric controller speaks a plain prompt-driven CLI over TCP/23.
//! This session owns one connection, answers telnet option negotiation
//! inline (every option is refused), and exposes bounded-timeout
//! `read_until` / `expect` primitives for prompt matching. Bytes read
//! past a match stay buffered for the next call.

use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace};

use fabric_common::{FabricError, FabricResult};

/// Default telnet port.
pub const TELNET_PORT: u16 = 23;

/// Telnet IAC escape byte.
const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

/// Read chunk size.
const READ_CHUNK: usize = 4096;

/// Parser state for option negotiation spanning reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IacState {
    Normal,
    /// Saw IAC, waiting for the command byte.
    Command,
    /// Saw IAC DO/DONT/WILL/WONT, waiting for the option byte.
    Option(u8),
    /// Inside a subnegotiation, waiting for IAC SE.
    Subnegotiation,
    /// Saw IAC inside a subnegotiation.
    SubnegotiationIac,
}

/// One persistent telnet connection to one switch.
pub struct TelnetSession {
    stream: TcpStream,
    endpoint: String,
    /// Cleaned bytes received but not yet consumed by a match.
    buf: Vec<u8>,
    iac_state: IacState,
}

impl TelnetSession {
    /// Connects to `endpoint` (`host` or `host:port`; port defaults
    /// to 23) within `connect_timeout`.
    pub async fn connect(endpoint: &str, connect_timeout: Duration) -> FabricResult<Self> {
        let addr = if endpoint.contains(':') {
            endpoint.to_string()
        } else {
            format!("{}:{}", endpoint, TELNET_PORT)
        };
        let stream = timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| FabricError::timeout(endpoint, "connect"))?
            .map_err(|e| FabricError::transport(endpoint, e.to_string()))?;
        debug!(endpoint = %endpoint, "Telnet session established");
        Ok(Self {
            stream,
            endpoint: endpoint.to_string(),
            buf: Vec::new(),
            iac_state: IacState::Normal,
        })
    }

    /// The endpoint this session is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the buffered, not-yet-consumed output as text.
    ///
    /// Used by callers that need to inspect a banner after a timed-out
    /// read, e.g. the busy-marker check during login.
    pub fn buffered(&self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }

    /// Discards any buffered output.
    pub fn drain_buffer(&mut self) {
        self.buf.clear();
    }

    /// Writes raw text to the switch.
    pub async fn write(&mut self, data: &str) -> FabricResult<()> {
        trace!(endpoint = %self.endpoint, data = %data.trim_end(), "Telnet write");
        self.stream
            .write_all(data.as_bytes())
            .await
            .map_err(|e| FabricError::transport(&self.endpoint, e.to_string()))?;
        self.stream
            .flush()
            .await
            .map_err(|e| FabricError::transport(&self.endpoint, e.to_string()))
    }

    /// Writes one CLI line, appending the newline.
    pub async fn write_line(&mut self, cmd: &str) -> FabricResult<()> {
        self.write(&format!("{}\n", cmd)).await
    }

    /// Reads until `pattern` occurs in the stream, returning everything
    /// up to and including it. On timeout the partial output stays
    /// buffered and a `Timeout` error is returned.
    pub async fn read_until(&mut self, pattern: &str, wait: Duration) -> FabricResult<String> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(pos) = find_subslice(&self.buf, pattern.as_bytes()) {
                let end = pos + pattern.len();
                let matched: Vec<u8> = self.buf.drain(..end).collect();
                return Ok(String::from_utf8_lossy(&matched).into_owned());
            }
            self.fill(deadline, pattern).await?;
        }
    }

    /// Reads until one of `patterns` matches the buffered output.
    ///
    /// Returns the index of the first matching pattern and the output
    /// up to and including the match.
    pub async fn expect(&mut self, patterns: &[Regex], wait: Duration) -> FabricResult<(usize, String)> {
        let deadline = Instant::now() + wait;
        loop {
            let text = String::from_utf8_lossy(&self.buf).into_owned();
            let mut best: Option<(usize, usize)> = None;
            for (i, re) in patterns.iter().enumerate() {
                if let Some(m) = re.find(&text) {
                    let end = m.end();
                    if best.map(|(_, e)| end < e).unwrap_or(true) {
                        best = Some((i, end));
                    }
                }
            }
            if let Some((idx, end)) = best {
                let matched: Vec<u8> = self.buf.drain(..end).collect();
                return Ok((idx, String::from_utf8_lossy(&matched).into_owned()));
            }
            self.fill(deadline, "prompt").await?;
        }
    }

    /// Reads one chunk from the socket into the cleaned buffer,
    /// answering option negotiation along the way.
    async fn fill(&mut self, deadline: Instant, waiting_for: &str) -> FabricResult<()> {
        let now = Instant::now();
        if now >= deadline {
            return Err(FabricError::timeout(&self.endpoint, waiting_for));
        }
        let mut chunk = [0u8; READ_CHUNK];
        let n = timeout(deadline - now, self.stream.read(&mut chunk))
            .await
            .map_err(|_| FabricError::timeout(&self.endpoint, waiting_for))?
            .map_err(|e| FabricError::transport(&self.endpoint, e.to_string()))?;
        if n == 0 {
            return Err(FabricError::transport(&self.endpoint, "connection closed by peer"));
        }
        let mut replies = Vec::new();
        self.process_incoming(&chunk[..n], &mut replies);
        if !replies.is_empty() {
            self.stream
                .write_all(&replies)
                .await
                .map_err(|e| FabricError::transport(&self.endpoint, e.to_string()))?;
        }
        Ok(())
    }

    /// Strips telnet negotiation from `input`, appending cleaned data
    /// to the buffer and refusal replies (DO→WONT, WILL→DONT) to
    /// `replies`. The state machine survives sequences split across
    /// reads.
    fn process_incoming(&mut self, input: &[u8], replies: &mut Vec<u8>) {
        for &b in input {
            match self.iac_state {
                IacState::Normal => {
                    if b == IAC {
                        self.iac_state = IacState::Command;
                    } else {
                        self.buf.push(b);
                    }
                }
                IacState::Command => match b {
                    IAC => {
                        // Escaped 0xff data byte.
                        self.buf.push(IAC);
                        self.iac_state = IacState::Normal;
                    }
                    DO | DONT | WILL | WONT => {
                        self.iac_state = IacState::Option(b);
                    }
                    SB => {
                        self.iac_state = IacState::Subnegotiation;
                    }
                    _ => {
                        self.iac_state = IacState::Normal;
                    }
                },
                IacState::Option(cmd) => {
                    match cmd {
                        DO => replies.extend_from_slice(&[IAC, WONT, b]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, b]),
                        _ => {}
                    }
                    self.iac_state = IacState::Normal;
                }
                IacState::Subnegotiation => {
                    if b == IAC {
                        self.iac_state = IacState::SubnegotiationIac;
                    }
                }
                IacState::SubnegotiationIac => {
                    if b == SE {
                        self.iac_state = IacState::Normal;
                    } else {
                        self.iac_state = IacState::Subnegotiation;
                    }
                }
            }
        }
    }

    /// Closes the connection.
    pub async fn close(&mut self) -> FabricResult<()> {
        debug!(endpoint = %self.endpoint, "Closing telnet session");
        self.stream
            .shutdown()
            .await
            .map_err(|e| FabricError::transport(&self.endpoint, e.to_string()))
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    #[test]
    fn test_find_subslice() {
        assert_eq!(find_subslice(b"abcdef", b"cd"), Some(2));
        assert_eq!(find_subslice(b"abcdef", b"xy"), None);
        assert_eq!(find_subslice(b"ab", b"abc"), None);
    }

    async fn session_pair() -> (TelnetSession, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = addr.to_string();
        let connect = TelnetSession::connect(&addr_str, Duration::from_secs(5));
        let (session, accepted) = tokio::join!(connect, listener.accept());
        let (peer, _) = accepted.unwrap();
        (session.unwrap(), peer)
    }

    #[tokio::test]
    async fn test_read_until_match() {
        let (mut session, mut peer) = session_pair().await;
        peer.write_all(b"Welcome\nLogin: ").await.unwrap();

        let out = session
            .read_until("Login: ", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out, "Welcome\nLogin: ");
        assert!(session.buffered().is_empty());
    }

    #[tokio::test]
    async fn test_read_until_timeout_keeps_banner() {
        let (mut session, mut peer) = session_pair().await;
        peer.write_all(b"RP is busy now.\n").await.unwrap();

        let err = session
            .read_until("Login: ", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, FabricError::Timeout { .. }));
        assert!(session.buffered().contains("busy"));
    }

    #[tokio::test]
    async fn test_iac_negotiation_refused() {
        let (mut session, mut peer) = session_pair().await;
        // IAC DO ECHO(1), then payload, then IAC WILL SGA(3)
        peer.write_all(&[255, 253, 1, b'o', b'k', b'#', b' ', 255, 251, 3])
            .await
            .unwrap();

        let out = session.read_until("# ", Duration::from_secs(5)).await.unwrap();
        assert_eq!(out, "ok# ");

        // The refusals must come back: IAC WONT ECHO, IAC DONT SGA
        let mut reply = [0u8; 6];
        peer.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [255, 252, 1, 255, 254, 3]);
    }

    #[tokio::test]
    async fn test_iac_split_across_reads() {
        let (mut session, mut peer) = session_pair().await;
        peer.write_all(&[b'a', 255]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        peer.write_all(&[253, 1, b'b', b'#', b' ']).await.unwrap();

        let out = session.read_until("# ", Duration::from_secs(5)).await.unwrap();
        assert_eq!(out, "ab# ");
    }

    #[tokio::test]
    async fn test_expect_returns_first_match() {
        let (mut session, mut peer) = session_pair().await;
        peer.write_all(b"switch(config)# ").await.unwrap();

        let patterns = vec![
            Regex::new(r"\(config\)# $").unwrap(),
            Regex::new(r"# $").unwrap(),
        ];
        let (idx, out) = session
            .expect(&patterns, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(idx, 0);
        assert!(out.ends_with("(config)# "));
    }

    #[tokio::test]
    async fn test_write_line() {
        let (mut session, mut peer) = session_pair().await;
        session.write_line("show running-config").await.unwrap();

        let mut buf = [0u8; 64];
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"show running-config\n");
    }
}

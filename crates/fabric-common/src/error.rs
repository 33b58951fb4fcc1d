//! Error types for fabric adapter operations.
//!
//! One taxonomy covers every switch-facing component: transports,
//! CLI drivers, the OVSDB writer, and configuration loading. All errors
//! implement `std::error::Error` via `thiserror`.

use thiserror::Error;

/// Result type alias for fabric adapter operations.
pub type FabricResult<T> = Result<T, FabricError>;

/// Errors that can occur while realizing network intent on a switch.
#[derive(Debug, Error)]
pub enum FabricError {
    /// Transport-level fault (connection refused, EOF, peer reset).
    ///
    /// Recoverable once via reconnect; unrecoverable after a second
    /// failure on the same operation.
    #[error("Transport error on {endpoint}: {message}")]
    Transport {
        /// The switch endpoint (address or address:port).
        endpoint: String,
        /// Description of the underlying fault.
        message: String,
    },

    /// A blocking I/O call exceeded its bounded timeout.
    #[error("Timed out on {endpoint} waiting for {waiting_for}")]
    Timeout {
        /// The switch endpoint.
        endpoint: String,
        /// What the caller was waiting on (prompt, reply, connect).
        waiting_for: String,
    },

    /// The switch refused the login with a busy / too-many-sessions
    /// banner and the retry budget is exhausted.
    #[error("Switch {endpoint} is busy: {message}")]
    SwitchBusy {
        /// The switch endpoint.
        endpoint: String,
        /// The banner text that triggered the retries.
        message: String,
    },

    /// A CLI command elicited an error marker or unexpected prompt.
    #[error("CLI command '{command}' failed on {endpoint}: {output}")]
    Cli {
        /// The switch endpoint.
        endpoint: String,
        /// The command that failed.
        command: String,
        /// The output containing the error marker.
        output: String,
    },

    /// An OVSDB reply carried a non-null error at any level.
    #[error("OVSDB operation failed: {message}")]
    Ovsdb {
        /// Error detail from the reply (or the transport).
        message: String,
    },

    /// A fixed index domain (ifgroup, LAG, VFAB-pprofile, port-channel)
    /// has no free element left.
    #[error("No available {resource} index")]
    NoAvailableIndex {
        /// The exhausted resource.
        resource: &'static str,
    },

    /// Two switches targeted by an mLAG request are not peerlink
    /// partners.
    #[error("Switches {first} and {second} are not a valid mLAG pair")]
    InvalidMlagPair {
        /// First target switch.
        first: String,
        /// Second target switch.
        second: String,
    },

    /// Malformed adapter configuration.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// A local-link switch MAC does not map to any configured switch.
    #[error("Switch MAC {mac} does not map to any configured switch")]
    UnknownSwitch {
        /// The unmatched MAC address.
        mac: String,
    },
}

impl FabricError {
    /// Creates a transport error.
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(endpoint: impl Into<String>, waiting_for: impl Into<String>) -> Self {
        Self::Timeout {
            endpoint: endpoint.into(),
            waiting_for: waiting_for.into(),
        }
    }

    /// Creates a busy-switch error.
    pub fn switch_busy(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SwitchBusy {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates a CLI failure error.
    pub fn cli(
        endpoint: impl Into<String>,
        command: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::Cli {
            endpoint: endpoint.into(),
            command: command.into(),
            output: output.into(),
        }
    }

    /// Creates an OVSDB error.
    pub fn ovsdb(message: impl Into<String>) -> Self {
        Self::Ovsdb {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown-switch error.
    pub fn unknown_switch(mac: impl Into<String>) -> Self {
        Self::UnknownSwitch { mac: mac.into() }
    }

    /// Returns true if this error indicates a transient transport
    /// condition that a single reconnect may resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FabricError::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FabricError::unknown_switch("00:00:4c:ee:e5:39");
        assert_eq!(
            err.to_string(),
            "Switch MAC 00:00:4c:ee:e5:39 does not map to any configured switch"
        );
    }

    #[test]
    fn test_cli_error() {
        let err = FabricError::cli("192.168.1.1", "ifgroup 0 ether 1/1/0/1", "<ERROR> bad port");
        assert!(err.to_string().contains("ifgroup 0 ether 1/1/0/1"));
        assert!(err.to_string().contains("192.168.1.1"));
    }

    #[test]
    fn test_no_available_index() {
        let err = FabricError::NoAvailableIndex { resource: "ifgroup" };
        assert_eq!(err.to_string(), "No available ifgroup index");
    }

    #[test]
    fn test_is_retryable() {
        assert!(FabricError::transport("sw1", "connection reset").is_retryable());
        assert!(!FabricError::ovsdb("constraint violation").is_retryable());
        assert!(!FabricError::invalid_config("address", "empty").is_retryable());
    }
}

//! All the errors defined by this crate.

use std::io::{self, ErrorKind};
use thiserror::Error;

/// An error in data recieved from a server, for either protocol.
///
/// Protocol clients return [`io::Result`]; these errors are carried inside
/// an [`io::Error`] of kind [`ErrorKind::InvalidData`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// VarInt data ran past five groups without terminating.
    #[error("malformed varint")]
    MalformedVarInt,

    /// The stream or datagram ended before a complete value was read.
    #[error("truncated stream")]
    TruncatedStream,

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid string data")]
    InvalidString,

    /// A frame announced a length outside what the protocol allows.
    #[error("frame length {0} out of range")]
    FrameTooLarge(i32),

    /// The status response carried a packet id other than `0x00`.
    #[error("unexpected packet id {0:#04x}")]
    UnexpectedPacketId(i32),

    /// The status payload was not the JSON object servers are expected to send.
    #[error("invalid status payload")]
    InvalidStatusPayload,

    /// Recieved a query packet type other than the one requested.
    /// Valid types are 9 for handshake, 0 for stat
    #[error("invalid packet type {0}")]
    InvalidPacketType(u8),

    /// The session id echoed by the server does not match ours.
    #[error("session id mismatch (expected {expected}, recieved {received})")]
    SessionIdMismatch {
        /// Session id we sent.
        expected: i32,
        /// Session id the server replied with.
        received: i32,
    },

    /// The handshake response did not contain a decimal challenge token.
    #[error("bad challenge token")]
    BadChallengeToken,

    /// A numeric key/value field of the stat response did not parse.
    #[error("malformed field {key}: {value:?}")]
    MalformedField {
        /// Key of the offending field.
        key: String,
        /// Raw value as recieved.
        value: String,
    },
}

impl From<ProtocolError> for io::Error {
    fn from(err: ProtocolError) -> Self {
        io::Error::new(ErrorKind::InvalidData, err)
    }
}

/// Error for a protocol exchange that did not finish in time.
pub(crate) fn timeout_err<T>() -> io::Result<T> {
    Err(io::Error::new(
        ErrorKind::TimedOut,
        "timed out waiting for the server",
    ))
}

/// A misuse of a control operation (starting, stopping, adding or removing
/// monitored players) or an invalid configuration.
///
/// These are returned synchronously to the caller and never come out of a
/// polling tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// The monitor is already running.
    #[error("monitor is already active")]
    AlreadyActive,

    /// The monitor is not running.
    #[error("monitor is not active")]
    NotActive,

    /// No configured server has this name.
    #[error("unknown server: {0}")]
    UnknownTarget(String),

    /// No servers are configured at all.
    #[error("no servers configured")]
    NoTargets,

    /// Two configured servers share a name (names are case-insensitive).
    #[error("duplicate server name: {0}")]
    DuplicateTarget(String),

    /// A configured server has port 0.
    #[error("invalid port for server {target}")]
    InvalidPort {
        /// Name of the misconfigured server.
        target: String,
    },

    /// An interval or timeout is zero or otherwise unusable.
    #[error("invalid interval: {what}")]
    InvalidInterval {
        /// Which setting is wrong.
        what: &'static str,
    },

    /// A player name was empty.
    #[error("player name must not be empty")]
    EmptyPlayerName,

    /// Monitor loops need a tokio runtime to be spawned on.
    #[error("no tokio runtime available")]
    NoRuntime,
}

/// Why a check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The server answered with data we could not understand.
    Protocol,

    /// The server could not be reached: timeout, refused, unreachable.
    Connectivity,

    /// The check did not finish within the fan-out ceiling.
    Deadline,

    /// The check task panicked or the checker was shut down.
    Internal,
}

impl FailureKind {
    /// Classify an error returned by one of the protocol clients.
    #[must_use]
    pub fn of(err: &io::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidData | ErrorKind::UnexpectedEof => Self::Protocol,
            _ => Self::Connectivity,
        }
    }
}

/// Error a [`Notifier`](crate::monitor::Notifier) or
/// [`HistoryStore`](crate::monitor::HistoryStore) may return.
/// The monitors log these and carry on.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync + 'static>;

//! Payload of a [Server List Ping](https://wiki.vg/Server_List_Ping) response.

use crate::errors::ProtocolError;
use serde::{Deserialize, Serialize};

/// Raw JSON text of a status response, as sent by the server.
///
/// The client does not interpret it; use [`StatusPayload::parse`] or the
/// helpers built on it to pull out player information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPayload(String);

impl StatusPayload {
    /// Wrap raw JSON text.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The JSON text exactly as recieved.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.0
    }

    /// Deserialize into a [`StatusResponse`].
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidStatusPayload`] when the text is not
    /// JSON or the `players` object is missing or mistyped.
    pub fn parse(&self) -> Result<StatusResponse, ProtocolError> {
        serde_json::from_str(&self.0).map_err(|_| ProtocolError::InvalidStatusPayload)
    }

    /// Names listed in `players.sample`, in order. Servers often send only a
    /// handful of names, or none at all, even with many players online.
    ///
    /// # Errors
    /// See [`StatusPayload::parse`].
    pub fn sample_names(&self) -> Result<Vec<String>, ProtocolError> {
        Ok(self
            .parse()?
            .players
            .sample
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.name)
            .collect())
    }

    /// Value of `players.online`.
    ///
    /// # Errors
    /// See [`StatusPayload::parse`].
    pub fn online_count(&self) -> Result<u32, ProtocolError> {
        Ok(self.parse()?.players.online)
    }
}

/// Response from the server with status information.
/// Represents [this JSON object](https://wiki.vg/Server_List_Ping#Status_Response),
/// reduced to the parts presence checks care about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Information about the game and protocol version.
    pub version: Option<Version>,

    /// Information about players on the server.
    pub players: Players,

    /// The "motd", left as raw JSON since it may be a string or a chat object.
    #[serde(rename = "description")]
    pub motd: Option<serde_json::Value>,
}

impl StatusResponse {
    /// Is `player` listed in the sample? Names compare case-insensitively.
    #[must_use]
    pub fn has_player(&self, player: &str) -> bool {
        self.players
            .sample
            .iter()
            .flatten()
            .any(|s| s.name.eq_ignore_ascii_case(player))
    }
}

/// Struct that stores information about players on the server.
///
/// Not intended to be used directly, but only as a part of [`StatusResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Players {
    /// The maximum number of players allowed on the server.
    pub max: u32,

    /// The number of players currently online.
    pub online: u32,

    /// A listing of some online Players.
    pub sample: Option<Vec<Sample>>,
}

/// A player listed on the server's list ping information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// The player's username.
    pub name: String,

    /// The player's UUID. Some proxies leave it out.
    pub id: Option<String>,
}

/// Struct that stores version information about the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    /// The game version (e.g: 1.19.1)
    pub name: String,
    /// The version of the [Protocol](https://wiki.vg/Protocol) being used.
    pub protocol: i64,
}

//! Implementation of the [Query](https://wiki.vg/Query) protocol.
//!
//! Query has to be switched on by the server (`enable-query=true`), so
//! [`is_query_enabled`] is provided to find out whether it is worth using.

mod packet;

use self::packet::{full_stat_request, handshake_request, parse_challenge, parse_full_stat, SESSION_ID};
use crate::errors::timeout_err;
use serde::Serialize;
use std::{net::SocketAddr, time::Duration};
use tokio::{
    io,
    net::{lookup_host, UdpSocket},
    time::timeout,
};

/// Big enough for a full stat response listing a few hundred players.
const RECV_BUFFER_LEN: usize = 16 * 1024;

/// Response to a [full stat](https://wiki.vg/Query#Full_stat) request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    /// The "motd", sent under the `hostname` key.
    pub motd: Option<String>,

    /// Game type, `SMP` on vanilla servers.
    pub game_type: Option<String>,

    /// Game id, `MINECRAFT` on vanilla servers.
    pub game_id: Option<String>,

    /// The game version (e.g: 1.19.1)
    pub version: Option<String>,

    /// Server software and plugin list, empty on vanilla servers.
    pub plugins: Option<String>,

    /// Name of the default world.
    pub map: Option<String>,

    /// The number of players currently online.
    pub online_count: u32,

    /// The maximum number of players allowed on the server.
    pub max_players: u32,

    /// Every player currently online, in the order the server listed them.
    pub players: Vec<String>,
}

impl QueryResult {
    /// Is `player` online? Names compare case-insensitively.
    #[must_use]
    pub fn has_player(&self, player: &str) -> bool {
        self.players.iter().any(|p| p.eq_ignore_ascii_case(player))
    }
}

/// Perform a handshake followed by a full stat request.
///
/// Both round trips happen over one UDP socket, and `dur` bounds the whole exchange.
///
/// # Arguments
/// * `host` - A string slice that holds the hostname of the server to connect to.
/// * `port` - The query port on that server (usually the game port).
/// * `dur` - Timeout for the whole query, host lookup included.
///
/// # Errors
/// Returns `Err` if the host does not resolve, a datagram is lost or late,
/// or the server replies with data that does not follow the protocol.
///
/// # Examples
/// ```no_run
/// use mc_presence::query;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> tokio::io::Result<()> {
///     let stat = query::query("localhost", 25565, Duration::from_secs(5)).await?;
///     println!("{} of {} online: {:?}", stat.online_count, stat.max_players, stat.players);
///
///     Ok(())
/// }
/// ```
pub async fn query(host: &str, port: u16, dur: Duration) -> io::Result<QueryResult> {
    match timeout(dur, full_stat(host, port)).await {
        Ok(result) => result,
        Err(_) => timeout_err(),
    }
}

async fn full_stat(host: &str, port: u16) -> io::Result<QueryResult> {
    let socket = connect(host, port).await?;
    let mut buffer = vec![0; RECV_BUFFER_LEN];

    let len = round_trip(&socket, &handshake_request(SESSION_ID), &mut buffer).await?;
    let challenge_token = parse_challenge(&buffer[..len], SESSION_ID)?;

    let len = round_trip(
        &socket,
        &full_stat_request(SESSION_ID, challenge_token),
        &mut buffer,
    )
    .await?;

    Ok(parse_full_stat(&buffer[..len], SESSION_ID)?)
}

/// Find out whether a server answers Query requests.
///
/// Returns `true` only if a complete [`query`] succeeds within `dur`.
pub async fn is_query_enabled(host: &str, port: u16, dur: Duration) -> bool {
    match query(host, port, dur).await {
        Ok(_) => true,
        Err(err) => {
            tracing::debug!(host, port, error = %err, "query probe failed");
            false
        }
    }
}

async fn connect(host: &str, port: u16) -> io::Result<UdpSocket> {
    let addr = lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host did not resolve"))?;

    let local: SocketAddr = if addr.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };

    let socket = UdpSocket::bind(local).await?;
    socket.connect(addr).await?;

    Ok(socket)
}

async fn round_trip(socket: &UdpSocket, request: &[u8], buffer: &mut [u8]) -> io::Result<usize> {
    socket.send(request).await?;
    socket.recv(buffer).await
}

use super::QueryResult;
use crate::errors::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub(super) const MAGIC: u16 = 0xfe_fd;

/// Session ids are masked by the server; 1 survives the mask unchanged.
pub(super) const SESSION_ID: i32 = 1;

/// Type byte and session id at the front of every response.
const RESPONSE_HEADER_LEN: usize = 5;

/// Everything before the first key of a full stat response: the response
/// header plus the `splitnum\0\x80\0` padding.
const FULL_STAT_HEADER_LEN: usize = 16;

/// `\x01player_\0\0` between the key/value section and the player list,
/// counted after the empty key's own terminator.
const PLAYER_SECTION_SENTINEL_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum QueryPacketType {
    Handshake,
    Stat,
}

impl From<QueryPacketType> for u8 {
    fn from(packet_type: QueryPacketType) -> Self {
        match packet_type {
            QueryPacketType::Handshake => 9,
            QueryPacketType::Stat => 0,
        }
    }
}

impl TryFrom<u8> for QueryPacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            9 => Ok(Self::Handshake),
            0 => Ok(Self::Stat),
            _ => Err(ProtocolError::InvalidPacketType(value)),
        }
    }
}

fn request(packet_type: QueryPacketType, session_id: i32) -> BytesMut {
    let mut bytes = BytesMut::with_capacity(15);
    bytes.put_u16(MAGIC);
    bytes.put_u8(packet_type.into());
    bytes.put_i32(session_id);
    bytes
}

pub(super) fn handshake_request(session_id: i32) -> Bytes {
    request(QueryPacketType::Handshake, session_id).freeze()
}

/// Full stat request. The four trailing zero bytes are what make the server
/// send the full stat instead of the basic one.
pub(super) fn full_stat_request(session_id: i32, challenge_token: i32) -> Bytes {
    let mut bytes = request(QueryPacketType::Stat, session_id);
    bytes.put_i32(challenge_token);
    bytes.put_u32(0);
    bytes.freeze()
}

/// Check the type byte and session id, leaving `buf` just past them.
fn read_header(
    buf: &mut &[u8],
    expected: QueryPacketType,
    session_id: i32,
) -> Result<(), ProtocolError> {
    if buf.remaining() < RESPONSE_HEADER_LEN {
        return Err(ProtocolError::TruncatedStream);
    }

    let packet_type = buf.get_u8();
    if QueryPacketType::try_from(packet_type)? != expected {
        return Err(ProtocolError::InvalidPacketType(packet_type));
    }

    let received = buf.get_i32();
    if received != session_id {
        return Err(ProtocolError::SessionIdMismatch {
            expected: session_id,
            received,
        });
    }

    Ok(())
}

/// Read bytes up to the next NUL and consume the NUL.
fn read_cstring(buf: &mut &[u8]) -> Result<String, ProtocolError> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(ProtocolError::TruncatedStream)?;

    let string = String::from_utf8_lossy(&buf[..end]).into_owned();
    buf.advance(end + 1);

    Ok(string)
}

/// Parse a handshake response into the challenge token.
pub(super) fn parse_challenge(datagram: &[u8], session_id: i32) -> Result<i32, ProtocolError> {
    let mut buf = datagram;
    read_header(&mut buf, QueryPacketType::Handshake, session_id)?;

    // some servers pad the datagram; the token is whatever comes before the NUL
    let token = match buf.iter().position(|&b| b == 0) {
        Some(end) => &buf[..end],
        None => buf,
    };

    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.trim().parse::<i32>().ok())
        .ok_or(ProtocolError::BadChallengeToken)
}

fn parse_count(key: &str, value: String) -> Result<u32, ProtocolError> {
    value.trim().parse::<u32>().map_err(|_| ProtocolError::MalformedField {
        key: key.to_string(),
        value,
    })
}

/// Parse a full stat response.
///
/// Unknown keys are skipped. A numeric field that does not parse fails the
/// whole response rather than defaulting to zero.
pub(super) fn parse_full_stat(datagram: &[u8], session_id: i32) -> Result<QueryResult, ProtocolError> {
    let mut buf = datagram;
    read_header(&mut buf, QueryPacketType::Stat, session_id)?;

    let padding = FULL_STAT_HEADER_LEN - RESPONSE_HEADER_LEN;
    if buf.remaining() < padding {
        return Err(ProtocolError::TruncatedStream);
    }
    buf.advance(padding);

    let mut result = QueryResult::default();

    loop {
        let key = read_cstring(&mut buf)?;

        if key.is_empty() {
            if buf.remaining() < PLAYER_SECTION_SENTINEL_LEN {
                return Err(ProtocolError::TruncatedStream);
            }
            buf.advance(PLAYER_SECTION_SENTINEL_LEN);
            break;
        }

        let value = read_cstring(&mut buf)?;

        match key.as_str() {
            "hostname" => result.motd = Some(value),
            "gametype" => result.game_type = Some(value),
            "game_id" => result.game_id = Some(value),
            "version" => result.version = Some(value),
            "plugins" => result.plugins = Some(value),
            "map" => result.map = Some(value),
            "numplayers" => result.online_count = parse_count(&key, value)?,
            "maxplayers" => result.max_players = parse_count(&key, value)?,
            _ => {}
        }
    }

    // the list ends with an empty name; running out of data first means it was cut short
    loop {
        let name = read_cstring(&mut buf)?;

        if name.is_empty() {
            break;
        }

        result.players.push(name);
    }

    Ok(result)
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;

    /// Build a full stat datagram the way a vanilla server lays it out.
    pub(crate) fn full_stat_datagram(pairs: &[(&str, &str)], players: &[&str]) -> Vec<u8> {
        let mut data = vec![0x00, 0x00, 0x00, 0x00, 0x01];
        data.extend_from_slice(b"splitnum\x00\x80\x00");

        for (key, value) in pairs {
            data.extend_from_slice(key.as_bytes());
            data.push(0);
            data.extend_from_slice(value.as_bytes());
            data.push(0);
        }

        data.push(0);
        data.extend_from_slice(b"\x01player_\x00\x00");

        for player in players {
            data.extend_from_slice(player.as_bytes());
            data.push(0);
        }

        data.push(0);
        data
    }

    #[test]
    fn test_handshake_request_bytes() {
        assert_eq!(&handshake_request(1)[..], b"\xfe\xfd\x09\x00\x00\x00\x01");
    }

    #[test]
    fn test_full_stat_request_bytes() {
        assert_eq!(
            &full_stat_request(1, 9_513_307)[..],
            b"\xfe\xfd\x00\x00\x00\x00\x01\x00\x91\x29\x5b\x00\x00\x00\x00"
        );
    }

    #[test]
    fn test_parse_challenge() {
        assert_eq!(parse_challenge(b"\x09\x00\x00\x00\x0112345\x00", 1), Ok(12345));
        assert_eq!(parse_challenge(b"\x09\x00\x00\x00\x01-42\x00", 1), Ok(-42));
    }

    #[test]
    fn test_parse_challenge_rejects_garbage() {
        assert_eq!(
            parse_challenge(b"\x09\x00\x00\x00\x0112a45\x00", 1),
            Err(ProtocolError::BadChallengeToken)
        );
        assert_eq!(
            parse_challenge(b"\x09\x00\x00\x00\x01\x00", 1),
            Err(ProtocolError::BadChallengeToken)
        );
    }

    #[test]
    fn test_parse_challenge_checks_header() {
        assert_eq!(
            parse_challenge(b"\x00\x00\x00\x00\x0112345\x00", 1),
            Err(ProtocolError::InvalidPacketType(0))
        );
        assert_eq!(
            parse_challenge(b"\x09\x00\x00\x00\x0212345\x00", 1),
            Err(ProtocolError::SessionIdMismatch {
                expected: 1,
                received: 2
            })
        );
        assert_eq!(
            parse_challenge(b"\x09\x00", 1),
            Err(ProtocolError::TruncatedStream)
        );
    }

    #[test]
    fn test_parse_full_stat() {
        let data = full_stat_datagram(
            &[
                ("hostname", "MyServer"),
                ("gametype", "SMP"),
                ("game_id", "MINECRAFT"),
                ("version", "1.20.4"),
                ("plugins", ""),
                ("map", "world"),
                ("numplayers", "3"),
                ("maxplayers", "20"),
                ("hostport", "25565"),
                ("hostip", "127.0.0.1"),
            ],
            &["Alice", "Bob", "Carol"],
        );

        let result = parse_full_stat(&data, 1).unwrap();

        assert_eq!(result.motd.as_deref(), Some("MyServer"));
        assert_eq!(result.game_type.as_deref(), Some("SMP"));
        assert_eq!(result.map.as_deref(), Some("world"));
        assert_eq!(result.online_count, 3);
        assert_eq!(result.max_players, 20);
        assert_eq!(result.players, ["Alice", "Bob", "Carol"]);
        assert!(result.has_player("alice"));
        assert!(!result.has_player("dave"));
    }

    #[test]
    fn test_parse_full_stat_empty_server() {
        let data = full_stat_datagram(&[("numplayers", "0"), ("maxplayers", "10")], &[]);
        let result = parse_full_stat(&data, 1).unwrap();

        assert!(result.players.is_empty());
        assert_eq!(result.max_players, 10);
        assert_eq!(result.motd, None);
    }

    #[test]
    fn test_parse_full_stat_malformed_count() {
        let data = full_stat_datagram(&[("numplayers", "three")], &[]);

        assert_eq!(
            parse_full_stat(&data, 1),
            Err(ProtocolError::MalformedField {
                key: "numplayers".into(),
                value: "three".into()
            })
        );
    }

    #[test]
    fn test_parse_full_stat_truncated() {
        let data = full_stat_datagram(&[("hostname", "MyServer")], &["Alice"]);
        // cut inside the key/value section
        assert_eq!(
            parse_full_stat(&data[..20], 1),
            Err(ProtocolError::TruncatedStream)
        );
        assert_eq!(
            parse_full_stat(&data[..8], 1),
            Err(ProtocolError::TruncatedStream)
        );
    }

    #[test]
    fn test_parse_full_stat_player_list_cut_at_name() {
        let data = full_stat_datagram(&[("numplayers", "2")], &["Alice", "Bob"]);
        // drop the terminating empty name, then Bob as well
        let without_end = &data[..data.len() - 1];
        let without_bob = &data[..data.len() - 5];

        assert_eq!(
            parse_full_stat(without_end, 1),
            Err(ProtocolError::TruncatedStream)
        );
        assert_eq!(
            parse_full_stat(without_bob, 1),
            Err(ProtocolError::TruncatedStream)
        );
    }
}

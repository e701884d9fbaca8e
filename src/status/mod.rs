//! Get the status of a server using the [Server List Ping](https://wiki.vg/Server_List_Ping) protocol.
//! See documentation for [`ping`] for more information.

pub mod data;
mod packet;

pub use self::data::StatusPayload;

use crate::{
    errors::{timeout_err, ProtocolError},
    socket::ReadFrame,
    varint::{get_string, get_varint},
};
use std::time::Duration;
use tokio::{
    io::{self, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

/// Ping the server for information following the [Server List Ping](https://wiki.vg/Server_List_Ping) protocol.
///
/// The JSON payload is returned as-is in a [`StatusPayload`].
///
/// # Arguments
/// * `host` - A string slice that holds the hostname of the server to connect to.
/// * `port` - The port to connect to on that server.
/// * `dur` - Timeout for the whole ping, connecting included.
///
/// # Errors
/// Returns `Err` if there was a network issue, the server sent invalid data or the request timed out.
/// Invalid data is reported as an [`io::ErrorKind::InvalidData`] wrapping a [`ProtocolError`].
///
/// # Examples
/// ```no_run
/// use mc_presence::status;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> tokio::io::Result<()> {
///     let payload = status::ping("localhost", 25565, Duration::from_secs(5)).await?;
///     println!("{:?}", payload.sample_names());
///
///     Ok(())
/// }
/// ```
pub async fn ping(host: &str, port: u16, dur: Duration) -> io::Result<StatusPayload> {
    let session = async {
        let mut socket = TcpStream::connect((host, port)).await?;
        let payload = exchange(&mut socket, host, port).await?;

        // the payload is already in hand; a failed shutdown changes nothing
        let _ = socket.shutdown().await;

        Ok(payload)
    };

    match timeout(dur, session).await {
        Ok(payload) => payload,
        Err(_) => timeout_err(),
    }
}

async fn exchange(socket: &mut TcpStream, host: &str, port: u16) -> io::Result<StatusPayload> {
    socket
        .write_all(&packet::handshake(host, port, packet::PROTOCOL_VERSION))
        .await?;
    socket.write_all(&packet::status_request()).await?;

    // https://wiki.vg/Server_List_Ping#Status_Response
    let mut frame = socket.read_frame().await?;
    let id = get_varint(&mut frame)?;

    if id != 0 {
        return Err(ProtocolError::UnexpectedPacketId(id).into());
    }

    let json = get_string(&mut frame)?;
    Ok(StatusPayload::new(json))
}

#[cfg(test)]
mod tests {
    use super::ping;
    use crate::errors::ProtocolError;
    use crate::varint::{get_string, get_varint, put_string, put_varint};
    use bytes::BytesMut;
    use std::io::ErrorKind;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one connection, check the handshake, and answer with a
    /// response frame carrying `packet_id` and `json`.
    async fn fake_server(packet_id: i32, json: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut request = vec![0; 64];
            let mut read = 0;
            // handshake for "127.0.0.1" is 15 bytes + 1 prefix, status request 2
            while read < 18 {
                read += socket.read(&mut request[read..]).await.unwrap();
            }
            let mut hs = &request[1..read];
            assert_eq!(get_varint(&mut hs), Ok(0));
            assert_eq!(get_varint(&mut hs), Ok(47));
            assert_eq!(get_string(&mut hs).as_deref(), Ok("127.0.0.1"));

            let mut body = BytesMut::new();
            put_varint(&mut body, packet_id);
            put_string(&mut body, json);
            let mut frame = BytesMut::new();
            put_varint(&mut frame, body.len() as i32);
            frame.extend_from_slice(&body);

            socket.write_all(&frame).await.unwrap();
        });

        port
    }

    #[tokio::test]
    async fn test_local_status() {
        let json = r#"{"players":{"max":20,"online":1,"sample":[{"name":"Alice","id":"x"}]}}"#;
        let port = fake_server(0, json).await;

        let payload = ping("127.0.0.1", port, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(payload.raw(), json);
        assert_eq!(payload.sample_names().unwrap(), ["Alice"]);
    }

    #[tokio::test]
    async fn test_unexpected_packet_id() {
        let port = fake_server(1, "{}").await;

        let err = ping("127.0.0.1", port, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<ProtocolError>());
        assert_eq!(inner, Some(&ProtocolError::UnexpectedPacketId(1)));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let err = ping("127.0.0.1", port, Duration::from_millis(200))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = ping("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(result.is_err());
    }
}

use crate::varint::{put_string, put_varint, VarInt};
use bytes::{BufMut, Bytes, BytesMut};

/// Protocol version sent in the handshake. Servers answer a status request
/// regardless of the version they actually run.
pub(crate) const PROTOCOL_VERSION: i32 = 47;

#[derive(Debug, Clone, Copy)]
pub(crate) enum PacketId {
    /// Handshake (serverbound) and status request/response share id 0.
    Handshake = 0,
}

/// State the handshake asks the server to switch to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum NextState {
    Status = 1,
}

#[derive(Debug)]
pub(crate) struct Packet {
    id: i32,
    payload: Bytes,
}

impl Packet {
    pub fn builder(id: PacketId) -> PacketBuilder {
        PacketBuilder::new(id)
    }

    pub fn bytes(self) -> Bytes {
        self.into()
    }
}

impl From<Packet> for Bytes {
    fn from(packet: Packet) -> Self {
        let id = VarInt::from(packet.id);
        let len = (id.len() + packet.payload.len()) as i32;
        let mut bytes = BytesMut::new();

        put_varint(&mut bytes, len);
        bytes.put_slice(&id);
        bytes.put_slice(&packet.payload);

        bytes.freeze()
    }
}

#[derive(Debug)]
pub(crate) struct PacketBuilder {
    id: PacketId,
    bytes: BytesMut,
}

impl PacketBuilder {
    pub fn new(id: PacketId) -> Self {
        Self {
            id,
            bytes: BytesMut::new(),
        }
    }

    pub fn add_varint(mut self, value: i32) -> Self {
        put_varint(&mut self.bytes, value);
        self
    }

    pub fn add_string(mut self, string: &str) -> Self {
        put_string(&mut self.bytes, string);
        self
    }

    pub fn add_u16(mut self, short: u16) -> Self {
        self.bytes.put_u16(short);
        self
    }

    pub fn build(self) -> Packet {
        Packet {
            id: self.id as i32,
            payload: self.bytes.freeze(),
        }
    }
}

/// Handshake packet switching the connection into the status state.
/// https://wiki.vg/Server_List_Ping#Handshake
pub(crate) fn handshake(host: &str, port: u16, protocol_version: i32) -> Bytes {
    Packet::builder(PacketId::Handshake)
        .add_varint(protocol_version)
        .add_string(host)
        .add_u16(port)
        .add_varint(NextState::Status as i32)
        .build()
        .bytes()
}

/// Empty status request.
/// https://wiki.vg/Server_List_Ping#Status_Request
pub(crate) fn status_request() -> Bytes {
    Packet::builder(PacketId::Handshake).build().bytes()
}

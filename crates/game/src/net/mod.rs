mod codec;
mod packet;
mod protocol;

use std::time::{SystemTime, UNIX_EPOCH};

pub use codec::{NAME_LEN, WireReader, decode_name, encode_name, sanitize_name};
pub use packet::{
    PacketError, PacketView, create_packet, decode_payload, encode_message, hex_preview, parse,
};
pub use protocol::{
    ClientConnect, ClientDisconnect, ClientListUpdate, ClientReady, DEFAULT_PORT,
    DisconnectReason, EntityCreate, EntityDestroy, EntityKind, EntityUpdate, HEADER_SIZE,
    MAX_DATAGRAM_SIZE, MAX_LISTED_PLAYERS, MessageType, PROTOCOL_VERSION, PacketFlags,
    PacketHeader, Payload, Ping, PlayerEntry, PlayerId, PlayerShoot, PositionUpdate,
    ServerAccept, StartGame,
};

/// Wall-clock milliseconds; the time base of every timestamp on the wire.
pub fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

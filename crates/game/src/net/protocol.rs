use bitflags::bitflags;

use super::codec::{
    NAME_LEN, WireReader, put_f32, put_i32, put_name, put_u8, put_u16, put_u32, put_u64,
};
use super::packet::PacketError;

pub const HEADER_SIZE: usize = 4;
pub const MAX_DATAGRAM_SIZE: usize = 1500;
pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 8080;
pub const MAX_LISTED_PLAYERS: usize = 8;

pub type PlayerId = u32;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PacketFlags: u8 {
        const SERVER = 0x01;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    ClientConnect = 0x01,
    ServerAccept = 0x02,
    ClientReady = 0x03,
    ClientDisconnect = 0x04,
    Ping = 0x05,
    ClientListUpdate = 0x06,
    StartGame = 0x07,

    PositionUpdate = 0x10,
    EntityCreate = 0x11,
    EntityUpdate = 0x12,
    EntityDestroy = 0x13,
    PlayerShoot = 0x14,
}

impl MessageType {
    pub const ALL: [MessageType; 12] = [
        Self::ClientConnect,
        Self::ServerAccept,
        Self::ClientReady,
        Self::ClientDisconnect,
        Self::Ping,
        Self::ClientListUpdate,
        Self::StartGame,
        Self::PositionUpdate,
        Self::EntityCreate,
        Self::EntityUpdate,
        Self::EntityDestroy,
        Self::PlayerShoot,
    ];

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_system(self) -> bool {
        (0x01..=0x0F).contains(&self.as_u8())
    }

    pub fn is_game(self) -> bool {
        (0x10..=0x1F).contains(&self.as_u8())
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ClientConnect => "ClientConnect",
            Self::ServerAccept => "ServerAccept",
            Self::ClientReady => "ClientReady",
            Self::ClientDisconnect => "ClientDisconnect",
            Self::Ping => "Ping",
            Self::ClientListUpdate => "ClientListUpdate",
            Self::StartGame => "StartGame",
            Self::PositionUpdate => "PositionUpdate",
            Self::EntityCreate => "EntityCreate",
            Self::EntityUpdate => "EntityUpdate",
            Self::EntityDestroy => "EntityDestroy",
            Self::PlayerShoot => "PlayerShoot",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_u8() == value)
            .ok_or(PacketError::UnknownMessageType(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub message_type: u8,
    pub flags: PacketFlags,
    pub payload_size: u16,
}

impl PacketHeader {
    pub fn new(message_type: MessageType, flags: PacketFlags, payload_size: u16) -> Self {
        Self {
            message_type: message_type.as_u8(),
            flags,
            payload_size,
        }
    }

    pub fn kind(&self) -> Result<MessageType, PacketError> {
        MessageType::try_from(self.message_type)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        put_u8(out, self.message_type);
        put_u8(out, self.flags.bits());
        put_u16(out, self.payload_size);
    }

    pub fn decode(reader: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            message_type: reader.read_u8()?,
            flags: PacketFlags::from_bits_retain(reader.read_u8()?),
            payload_size: reader.read_u16()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DisconnectReason {
    #[default]
    Graceful = 0,
    Timeout = 1,
    Kicked = 2,
    ServerFull = 3,
    VersionMismatch = 4,
    ServerShutdown = 5,
    Unknown = 0xFF,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Graceful => "disconnected",
            Self::Timeout => "timed out",
            Self::Kicked => "kicked",
            Self::ServerFull => "server full",
            Self::VersionMismatch => "version mismatch",
            Self::ServerShutdown => "server shutting down",
            Self::Unknown => "unknown reason",
        }
    }
}

impl From<u8> for DisconnectReason {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Graceful,
            1 => Self::Timeout,
            2 => Self::Kicked,
            3 => Self::ServerFull,
            4 => Self::VersionMismatch,
            5 => Self::ServerShutdown,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntityKind {
    #[default]
    Player,
    Enemy,
    Projectile,
    PowerUp,
    Unknown(u8),
}

impl EntityKind {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Player => 0,
            Self::Enemy => 1,
            Self::Projectile => 2,
            Self::PowerUp => 3,
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<u8> for EntityKind {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Player,
            1 => Self::Enemy,
            2 => Self::Projectile,
            3 => Self::PowerUp,
            other => Self::Unknown(other),
        }
    }
}

/// Fixed-layout message body selected by the header's type byte.
pub trait Payload: Sized {
    const MESSAGE_TYPE: MessageType;
    const SIZE: usize;

    fn encode(&self, out: &mut Vec<u8>);

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, PacketError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConnect {
    pub player_name: String,
    pub client_version: u32,
}

impl ClientConnect {
    pub fn new(player_name: impl Into<String>) -> Self {
        Self {
            player_name: player_name.into(),
            client_version: PROTOCOL_VERSION,
        }
    }
}

impl Payload for ClientConnect {
    const MESSAGE_TYPE: MessageType = MessageType::ClientConnect;
    const SIZE: usize = NAME_LEN + 4;

    fn encode(&self, out: &mut Vec<u8>) {
        put_name(out, &self.player_name);
        put_u32(out, self.client_version);
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            player_name: reader.read_name()?,
            client_version: reader.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerAccept {
    pub player_id: PlayerId,
}

impl Payload for ServerAccept {
    const MESSAGE_TYPE: MessageType = MessageType::ServerAccept;
    const SIZE: usize = 4;

    fn encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.player_id);
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            player_id: reader.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientReady {
    pub player_id: PlayerId,
    pub ready: bool,
}

impl Payload for ClientReady {
    const MESSAGE_TYPE: MessageType = MessageType::ClientReady;
    const SIZE: usize = 5;

    fn encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.player_id);
        put_u8(out, self.ready as u8);
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            player_id: reader.read_u32()?,
            ready: reader.read_u8()? != 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientDisconnect {
    pub player_id: PlayerId,
    pub reason: DisconnectReason,
}

impl Payload for ClientDisconnect {
    const MESSAGE_TYPE: MessageType = MessageType::ClientDisconnect;
    const SIZE: usize = 5;

    fn encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.player_id);
        put_u8(out, self.reason as u8);
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            player_id: reader.read_u32()?,
            reason: DisconnectReason::from(reader.read_u8()?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ping;

impl Payload for Ping {
    const MESSAGE_TYPE: MessageType = MessageType::Ping;
    const SIZE: usize = 0;

    fn encode(&self, _out: &mut Vec<u8>) {}

    fn decode(_reader: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerEntry {
    pub player_id: PlayerId,
    pub ready: bool,
    pub name: String,
}

impl PlayerEntry {
    const SIZE: usize = 4 + 1 + NAME_LEN;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientListUpdate {
    pub players: Vec<PlayerEntry>,
}

impl Payload for ClientListUpdate {
    const MESSAGE_TYPE: MessageType = MessageType::ClientListUpdate;
    const SIZE: usize = 1 + MAX_LISTED_PLAYERS * PlayerEntry::SIZE;

    fn encode(&self, out: &mut Vec<u8>) {
        let count = self.players.len().min(MAX_LISTED_PLAYERS);
        put_u8(out, count as u8);
        for entry in &self.players[..count] {
            put_u32(out, entry.player_id);
            put_u8(out, entry.ready as u8);
            put_name(out, &entry.name);
        }
        let padding = (MAX_LISTED_PLAYERS - count) * PlayerEntry::SIZE;
        out.resize(out.len() + padding, 0);
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, PacketError> {
        let count = reader.read_u8()? as usize;
        if count > MAX_LISTED_PLAYERS {
            return Err(PacketError::InvalidField {
                field: "player_count",
                value: count as u64,
            });
        }

        let mut players = Vec::with_capacity(count);
        for _ in 0..count {
            players.push(PlayerEntry {
                player_id: reader.read_u32()?,
                ready: reader.read_u8()? != 0,
                name: reader.read_name()?,
            });
        }
        Ok(Self { players })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartGame {
    pub timestamp: u64,
}

impl Payload for StartGame {
    const MESSAGE_TYPE: MessageType = MessageType::StartGame;
    const SIZE: usize = 8;

    fn encode(&self, out: &mut Vec<u8>) {
        put_u64(out, self.timestamp);
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            timestamp: reader.read_u64()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionUpdate {
    pub entity_id: u32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub timestamp_ms: u64,
}

impl PositionUpdate {
    fn encode_fields(&self, out: &mut Vec<u8>) {
        put_u32(out, self.entity_id);
        put_f32(out, self.x);
        put_f32(out, self.y);
        put_f32(out, self.vx);
        put_f32(out, self.vy);
        put_u64(out, self.timestamp_ms);
    }

    fn decode_fields(reader: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            entity_id: reader.read_u32()?,
            x: reader.read_f32()?,
            y: reader.read_f32()?,
            vx: reader.read_f32()?,
            vy: reader.read_f32()?,
            timestamp_ms: reader.read_u64()?,
        })
    }

    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.vx, self.vy]
            .iter()
            .all(|v| v.is_finite())
    }
}

impl Payload for PositionUpdate {
    const MESSAGE_TYPE: MessageType = MessageType::PositionUpdate;
    const SIZE: usize = 28;

    fn encode(&self, out: &mut Vec<u8>) {
        self.encode_fields(out);
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Self::decode_fields(reader)
    }
}

/// Server relay of a [`PositionUpdate`]; same layout, different type byte.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntityUpdate(pub PositionUpdate);

impl Payload for EntityUpdate {
    const MESSAGE_TYPE: MessageType = MessageType::EntityUpdate;
    const SIZE: usize = PositionUpdate::SIZE;

    fn encode(&self, out: &mut Vec<u8>) {
        self.0.encode_fields(out);
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, PacketError> {
        PositionUpdate::decode_fields(reader).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityCreate {
    pub entity_id: u32,
    pub entity_type: EntityKind,
    pub x: f32,
    pub y: f32,
    pub health: i32,
}

impl Payload for EntityCreate {
    const MESSAGE_TYPE: MessageType = MessageType::EntityCreate;
    const SIZE: usize = 17;

    fn encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.entity_id);
        put_u8(out, self.entity_type.as_u8());
        put_f32(out, self.x);
        put_f32(out, self.y);
        put_i32(out, self.health);
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            entity_id: reader.read_u32()?,
            entity_type: EntityKind::from(reader.read_u8()?),
            x: reader.read_f32()?,
            y: reader.read_f32()?,
            health: reader.read_i32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDestroy {
    pub entity_id: u32,
}

impl Payload for EntityDestroy {
    const MESSAGE_TYPE: MessageType = MessageType::EntityDestroy;
    const SIZE: usize = 4;

    fn encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.entity_id);
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            entity_id: reader.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerShoot {
    pub player_id: PlayerId,
    pub start_x: f32,
    pub start_y: f32,
    pub dir_x: f32,
    pub dir_y: f32,
    pub weapon_type: u8,
}

impl Payload for PlayerShoot {
    const MESSAGE_TYPE: MessageType = MessageType::PlayerShoot;
    const SIZE: usize = 21;

    fn encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.player_id);
        put_f32(out, self.start_x);
        put_f32(out, self.start_y);
        put_f32(out, self.dir_x);
        put_f32(out, self.dir_y);
        put_u8(out, self.weapon_type);
    }

    fn decode(reader: &mut WireReader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            player_id: reader.read_u32()?,
            start_x: reader.read_f32()?,
            start_y: reader.read_f32()?,
            dir_x: reader.read_f32()?,
            dir_y: reader.read_f32()?,
            weapon_type: reader.read_u8()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_len<P: Payload>(payload: &P) -> usize {
        let mut out = Vec::new();
        payload.encode(&mut out);
        out.len()
    }

    #[test]
    fn test_message_type_namespaces_do_not_collide() {
        for (i, a) in MessageType::ALL.iter().enumerate() {
            assert!(a.is_system() ^ a.is_game(), "{} in both ranges", a.name());
            for b in &MessageType::ALL[i + 1..] {
                assert_ne!(a.as_u8(), b.as_u8());
            }
            assert_eq!(MessageType::try_from(a.as_u8()).unwrap(), *a);
        }
        assert!(MessageType::try_from(0xEE).is_err());
    }

    #[test]
    fn test_encoded_sizes_match_layout() {
        assert_eq!(encoded_len(&ClientConnect::new("Alice")), ClientConnect::SIZE);
        assert_eq!(encoded_len(&ServerAccept { player_id: 1 }), 4);
        assert_eq!(encoded_len(&Ping), 0);
        assert_eq!(encoded_len(&ClientListUpdate::default()), 297);
        assert_eq!(encoded_len(&PositionUpdate::default()), 28);
        assert_eq!(encoded_len(&EntityUpdate::default()), 28);
        assert_eq!(
            encoded_len(&EntityCreate {
                entity_id: 1,
                entity_type: EntityKind::Player,
                x: 0.0,
                y: 0.0,
                health: 100,
            }),
            17
        );
        assert_eq!(
            encoded_len(&PlayerShoot {
                player_id: 1,
                start_x: 0.0,
                start_y: 0.0,
                dir_x: 1.0,
                dir_y: 0.0,
                weapon_type: 2,
            }),
            21
        );
    }

    #[test]
    fn test_header_byte_layout() {
        let header = PacketHeader::new(MessageType::PositionUpdate, PacketFlags::SERVER, 28);
        let mut out = Vec::new();
        header.encode(&mut out);
        assert_eq!(out, [0x10, 0x01, 28, 0]);
    }

    #[test]
    fn test_client_list_rejects_oversized_count() {
        let mut bytes = vec![0u8; ClientListUpdate::SIZE];
        bytes[0] = 9;
        let result = ClientListUpdate::decode(&mut WireReader::new(&bytes));
        assert!(matches!(
            result,
            Err(PacketError::InvalidField { field: "player_count", value: 9 })
        ));
    }

    #[test]
    fn test_unknown_wire_enums_are_tolerated() {
        assert_eq!(DisconnectReason::from(42), DisconnectReason::Unknown);
        assert_eq!(EntityKind::from(9), EntityKind::Unknown(9));
        assert_eq!(EntityKind::Unknown(9).as_u8(), 9);
    }
}

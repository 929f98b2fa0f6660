pub mod dispatch;
pub mod entity;
pub mod event;
pub mod lobby;
pub mod net;
pub mod session;

pub use dispatch::{
    HandlerContext, MessageDispatcher, MessageHandler, Outbox, PayloadHandler, Recipient,
};
pub use entity::{EntitySnapshot, LocalEntitySource, PositionSample, RemoteEntitySink, ShotFired};
pub use event::{EventQueue, EventSender, NetworkEvent, event_channel};
pub use lobby::{Lobby, LobbySettings, LobbyState};
pub use net::{
    DEFAULT_PORT, DisconnectReason, EntityKind, HEADER_SIZE, MAX_DATAGRAM_SIZE, MessageType,
    PROTOCOL_VERSION, PacketError, PacketFlags, PacketHeader, PacketView, Payload, PlayerEntry,
    PlayerId, create_packet, encode_message, parse, unix_time_ms,
};
pub use session::{Session, SessionError, SessionId, SessionTable};

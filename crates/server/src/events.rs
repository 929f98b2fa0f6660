use std::fmt;
use std::net::SocketAddr;

use rift::{DisconnectReason, PlayerId, SessionId};

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SessionOpened {
        session_id: SessionId,
        addr: SocketAddr,
    },
    SessionClosed {
        session_id: SessionId,
        addr: SocketAddr,
    },
    SessionLimitReached {
        addr: SocketAddr,
    },
    PlayerJoined {
        player_id: PlayerId,
        name: String,
        addr: SocketAddr,
    },
    PlayerLeft {
        player_id: PlayerId,
        name: String,
        reason: DisconnectReason,
    },
    PacketRejected {
        addr: SocketAddr,
        len: usize,
    },
    GameStarted {
        timestamp_ms: u64,
    },
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionOpened { session_id, addr } => {
                write!(f, "Session {} opened for {}", session_id, addr)
            }
            Self::SessionClosed { session_id, addr } => {
                write!(f, "Session {} for {} closed", session_id, addr)
            }
            Self::SessionLimitReached { addr } => {
                write!(f, "Session limit reached, ignoring {}", addr)
            }
            Self::PlayerJoined {
                player_id,
                name,
                addr,
            } => write!(f, "Player {} ({}) joined from {}", player_id, name, addr),
            Self::PlayerLeft {
                player_id,
                name,
                reason,
            } => write!(f, "Player {} ({}) {}", player_id, name, reason.as_str()),
            Self::PacketRejected { addr, len } => {
                write!(f, "Rejected {} byte packet from {}", len, addr)
            }
            Self::GameStarted { timestamp_ms } => write!(f, "Game started at {}", timestamp_ms),
        }
    }
}

use glam::Vec2;

use crate::entity::{PositionSample, ShotFired};
use crate::net::{DisconnectReason, EntityKind, PlayerEntry, PlayerId};

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    PlayerJoin {
        player_id: PlayerId,
        name: String,
    },
    PlayerLeave {
        player_id: PlayerId,
        reason: DisconnectReason,
    },
    PlayerMove(PositionSample),
    PlayerShoot(ShotFired),
    EntityCreate {
        entity_id: u32,
        kind: EntityKind,
        position: Vec2,
        health: i32,
    },
    EntityUpdate(PositionSample),
    EntityDestroy {
        entity_id: u32,
    },
    StartGame {
        timestamp_ms: u64,
    },
    PlayerListUpdate(Vec<PlayerEntry>),
    Disconnected {
        reason: DisconnectReason,
    },
}

impl NetworkEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlayerJoin { .. } => "PlayerJoin",
            Self::PlayerLeave { .. } => "PlayerLeave",
            Self::PlayerMove(_) => "PlayerMove",
            Self::PlayerShoot(_) => "PlayerShoot",
            Self::EntityCreate { .. } => "EntityCreate",
            Self::EntityUpdate(_) => "EntityUpdate",
            Self::EntityDestroy { .. } => "EntityDestroy",
            Self::StartGame { .. } => "StartGame",
            Self::PlayerListUpdate(_) => "PlayerListUpdate",
            Self::Disconnected { .. } => "Disconnected",
        }
    }

    pub fn position_sample(&self) -> Option<&PositionSample> {
        match self {
            Self::PlayerMove(sample) | Self::EntityUpdate(sample) => Some(sample),
            _ => None,
        }
    }
}

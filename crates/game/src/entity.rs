use glam::Vec2;

use crate::net::{PlayerId, PlayerShoot, PositionUpdate, unix_time_ms};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntitySnapshot {
    pub entity_id: u32,
    pub position: Vec2,
    pub velocity: Vec2,
}

impl EntitySnapshot {
    pub fn to_update(&self, timestamp_ms: u64) -> PositionUpdate {
        PositionUpdate {
            entity_id: self.entity_id,
            x: self.position.x,
            y: self.position.y,
            vx: self.velocity.x,
            vy: self.velocity.y,
            timestamp_ms,
        }
    }
}

/// Authoritative sample for a remote entity, velocity in units per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub entity_id: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub timestamp_ms: u64,
}

impl PositionSample {
    pub fn at_rest(entity_id: u32, position: Vec2, timestamp_ms: u64) -> Self {
        Self {
            entity_id,
            position,
            velocity: Vec2::ZERO,
            timestamp_ms,
        }
    }

    pub fn now(entity_id: u32, position: Vec2, velocity: Vec2) -> Self {
        Self {
            entity_id,
            position,
            velocity,
            timestamp_ms: unix_time_ms(),
        }
    }
}

impl From<PositionUpdate> for PositionSample {
    fn from(update: PositionUpdate) -> Self {
        Self {
            entity_id: update.entity_id,
            position: Vec2::new(update.x, update.y),
            velocity: Vec2::new(update.vx, update.vy),
            timestamp_ms: update.timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotFired {
    pub player_id: PlayerId,
    pub origin: Vec2,
    pub direction: Vec2,
    pub weapon_type: u8,
}

impl ShotFired {
    pub fn to_message(&self) -> PlayerShoot {
        PlayerShoot {
            player_id: self.player_id,
            start_x: self.origin.x,
            start_y: self.origin.y,
            dir_x: self.direction.x,
            dir_y: self.direction.y,
            weapon_type: self.weapon_type,
        }
    }
}

impl From<PlayerShoot> for ShotFired {
    fn from(shot: PlayerShoot) -> Self {
        Self {
            player_id: shot.player_id,
            origin: Vec2::new(shot.start_x, shot.start_y),
            direction: Vec2::new(shot.dir_x, shot.dir_y),
            weapon_type: shot.weapon_type,
        }
    }
}

/// Entity storage side that owns the locally controlled entity.
pub trait LocalEntitySource {
    fn controlled_entity(&self) -> Option<EntitySnapshot>;
}

/// Entity storage side that receives reconciled remote positions.
pub trait RemoteEntitySink {
    fn apply_remote_position(&mut self, entity_id: u32, position: Vec2);
}

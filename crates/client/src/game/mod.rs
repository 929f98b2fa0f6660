use std::collections::HashMap;

use glam::Vec2;

use rift::{EntitySnapshot, LocalEntitySource, PlayerId, RemoteEntitySink};

const ORBIT_RADIUS: f32 = 120.0;
const ORBIT_SPEED: f32 = 1.5;

/// Minimal entity storage for the headless client: one ship flying a
/// circle, plus the last displayed position of every remote entity.
#[derive(Debug)]
pub struct LocalWorld {
    player_id: Option<PlayerId>,
    center: Vec2,
    angle: f32,
    position: Vec2,
    velocity: Vec2,
    remote: HashMap<u32, Vec2>,
}

impl LocalWorld {
    pub fn new(center: Vec2) -> Self {
        let mut world = Self {
            player_id: None,
            center,
            angle: 0.0,
            position: center,
            velocity: Vec2::ZERO,
            remote: HashMap::new(),
        };
        world.step(0.0);
        world
    }

    pub fn set_player(&mut self, player_id: PlayerId) {
        self.player_id = Some(player_id);
    }

    pub fn step(&mut self, dt: f32) {
        self.angle = (self.angle + ORBIT_SPEED * dt) % std::f32::consts::TAU;
        let (sin, cos) = self.angle.sin_cos();
        self.position = self.center + Vec2::new(cos, sin) * ORBIT_RADIUS;
        self.velocity = Vec2::new(-sin, cos) * ORBIT_RADIUS * ORBIT_SPEED;
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn forget(&mut self, entity_id: u32) {
        self.remote.remove(&entity_id);
    }

    pub fn remote_positions(&self) -> impl Iterator<Item = (u32, Vec2)> + '_ {
        self.remote.iter().map(|(id, pos)| (*id, *pos))
    }
}

impl LocalEntitySource for LocalWorld {
    fn controlled_entity(&self) -> Option<EntitySnapshot> {
        self.player_id.map(|entity_id| EntitySnapshot {
            entity_id,
            position: self.position,
            velocity: self.velocity,
        })
    }
}

impl RemoteEntitySink for LocalWorld {
    fn apply_remote_position(&mut self, entity_id: u32, position: Vec2) {
        self.remote.insert(entity_id, position);
    }
}

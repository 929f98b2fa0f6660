use std::collections::HashMap;

use glam::Vec2;

use rift::{NetworkEvent, PositionSample, RemoteEntitySink};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub max_extrapolation_ms: f32,
    pub snap_threshold_px: f32,
    pub correction_duration_ms: f32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_extrapolation_ms: 150.0,
            snap_threshold_px: 30.0,
            correction_duration_ms: 150.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteEntityState {
    pub authoritative: PositionSample,
    pub displayed: Vec2,
    pub target: Vec2,
    pub correction_duration_ms: f32,
    pub correction_remaining_ms: f32,
}

impl RemoteEntityState {
    fn new(sample: PositionSample, correction_duration_ms: f32) -> Self {
        Self {
            authoritative: sample,
            displayed: sample.position,
            target: sample.position,
            correction_duration_ms,
            correction_remaining_ms: 0.0,
        }
    }

    pub fn is_correcting(&self) -> bool {
        self.correction_remaining_ms > 0.0
    }

    pub fn projected(&self, now_ms: u64, max_extrapolation_ms: f32) -> Vec2 {
        // samples stamped in the future count as fresh
        let age_ms = now_ms.saturating_sub(self.authoritative.timestamp_ms) as f32;
        let server_dt = age_ms.min(max_extrapolation_ms) / 1000.0;
        self.authoritative.position + self.authoritative.velocity * server_dt
    }

    fn step(&mut self, projected: Vec2, dt_ms: f32, config: &ReconcilerConfig) {
        if projected.distance(self.displayed) > config.snap_threshold_px {
            self.displayed = projected;
            self.target = projected;
            self.correction_remaining_ms = 0.0;
            return;
        }

        if projected != self.target {
            self.target = projected;
            self.correction_remaining_ms = self.correction_duration_ms;
        }

        if !self.is_correcting() {
            self.displayed = self.target;
            return;
        }

        let consumed = dt_ms.clamp(0.0, self.correction_remaining_ms);
        let fraction = consumed / self.correction_remaining_ms;
        self.displayed += (self.target - self.displayed) * fraction;
        self.correction_remaining_ms -= consumed;

        if self.correction_remaining_ms <= 0.0 {
            self.correction_remaining_ms = 0.0;
            self.displayed = self.target;
        }
    }
}

/// Turns sparse authoritative samples into a per-frame display position for
/// every remote entity.
#[derive(Debug, Default)]
pub struct RemoteEntityReconciler {
    config: ReconcilerConfig,
    entities: HashMap<u32, RemoteEntityState>,
}

impl RemoteEntityReconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            entities: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Returns false when the sample is older than the one already held.
    pub fn on_position_update(&mut self, sample: PositionSample) -> bool {
        match self.entities.get_mut(&sample.entity_id) {
            Some(state) => {
                if sample.timestamp_ms < state.authoritative.timestamp_ms {
                    log::trace!(
                        "Dropping stale sample for entity {} ({} < {})",
                        sample.entity_id,
                        sample.timestamp_ms,
                        state.authoritative.timestamp_ms
                    );
                    return false;
                }
                state.authoritative = sample;
            }
            None => {
                self.entities.insert(
                    sample.entity_id,
                    RemoteEntityState::new(sample, self.config.correction_duration_ms),
                );
            }
        }
        true
    }

    pub fn update(&mut self, now_ms: u64, dt_ms: f32) {
        for state in self.entities.values_mut() {
            let projected = state.projected(now_ms, self.config.max_extrapolation_ms);
            state.step(projected, dt_ms, &self.config);
        }
    }

    pub fn handle_event(&mut self, event: &NetworkEvent) {
        match event {
            NetworkEvent::PlayerMove(sample) | NetworkEvent::EntityUpdate(sample) => {
                self.on_position_update(*sample);
            }
            NetworkEvent::EntityCreate {
                entity_id,
                position,
                ..
            } => {
                // spawn position only seeds entities we have not heard from yet
                if !self.entities.contains_key(entity_id) {
                    self.on_position_update(PositionSample::at_rest(*entity_id, *position, 0));
                }
            }
            NetworkEvent::EntityDestroy { entity_id } => {
                self.remove(*entity_id);
            }
            NetworkEvent::PlayerLeave { player_id, .. } => {
                self.remove(*player_id);
            }
            NetworkEvent::Disconnected { .. } => self.clear(),
            _ => {}
        }
    }

    pub fn remove(&mut self, entity_id: u32) -> Option<RemoteEntityState> {
        self.entities.remove(&entity_id)
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }

    pub fn displayed_position(&self, entity_id: u32) -> Option<Vec2> {
        self.entities.get(&entity_id).map(|s| s.displayed)
    }

    pub fn get(&self, entity_id: u32) -> Option<&RemoteEntityState> {
        self.entities.get(&entity_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &RemoteEntityState)> {
        self.entities.iter().map(|(id, state)| (*id, state))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn apply_to(&self, sink: &mut impl RemoteEntitySink) {
        for (entity_id, state) in &self.entities {
            sink.apply_remote_position(*entity_id, state.displayed);
        }
    }
}

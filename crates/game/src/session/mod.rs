use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use glam::Vec2;

use crate::net::{PlayerEntry, PlayerId};

pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session {session} already has player id {existing}")]
    PlayerAlreadyAssigned {
        session: SessionId,
        existing: PlayerId,
    },
    #[error("player id space exhausted")]
    PlayerIdsExhausted,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    addr: SocketAddr,
    player_id: Option<PlayerId>,
    pub authenticated: bool,
    pub ready: bool,
    pub player_name: String,
    pub position: Vec2,
    pub velocity: Vec2,
    last_activity: Instant,
    created_at: Instant,
    active: bool,
}

impl Session {
    pub fn new(id: SessionId, addr: SocketAddr, now: Instant) -> Self {
        Self {
            id,
            addr,
            player_id: None,
            authenticated: false,
            ready: false,
            player_name: String::new(),
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            last_activity: now,
            created_at: now,
            active: true,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_player(&self) -> bool {
        self.authenticated && self.player_id.is_some()
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn connected_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub fn touch(&mut self, now: Instant) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        self.idle_for(now) > timeout
    }

    /// Player ids are write-once for the lifetime of the session.
    pub fn assign_player(&mut self, player_id: PlayerId, name: String) -> Result<(), SessionError> {
        if let Some(existing) = self.player_id {
            return Err(SessionError::PlayerAlreadyAssigned {
                session: self.id,
                existing,
            });
        }
        self.player_id = Some(player_id);
        self.player_name = name;
        self.authenticated = true;
        Ok(())
    }

    /// Marks the underlying connection inactive; the server drops the
    /// session on its next pass.
    pub fn close(&mut self) {
        self.active = false;
    }

    pub fn summary(&self) -> Option<PlayerEntry> {
        if !self.authenticated {
            return None;
        }
        self.player_id.map(|player_id| PlayerEntry {
            player_id,
            ready: self.ready,
            name: self.player_name.clone(),
        })
    }
}

#[derive(Debug)]
pub struct PlayerIdAllocator {
    next: PlayerId,
}

impl Default for PlayerIdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl PlayerIdAllocator {
    pub fn allocate(&mut self) -> Result<PlayerId, SessionError> {
        let id = self.next;
        self.next = self
            .next
            .checked_add(1)
            .ok_or(SessionError::PlayerIdsExhausted)?;
        Ok(id)
    }

    pub fn peek(&self) -> PlayerId {
        self.next
    }
}

#[derive(Debug)]
pub struct SessionTable {
    sessions: HashMap<SocketAddr, Session>,
    next_session_id: u64,
    player_ids: PlayerIdAllocator,
    timeout: Duration,
    max_sessions: usize,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT, DEFAULT_MAX_SESSIONS)
    }
}

impl SessionTable {
    pub fn new(timeout: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            next_session_id: 1,
            player_ids: PlayerIdAllocator::default(),
            timeout,
            max_sessions,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns `None` when the table is full and `addr` is new.
    pub fn get_or_create(&mut self, addr: SocketAddr, now: Instant) -> Option<&mut Session> {
        if !self.sessions.contains_key(&addr) {
            if self.sessions.len() >= self.max_sessions {
                return None;
            }
            let id = SessionId(self.next_session_id);
            self.next_session_id += 1;
            self.sessions.insert(addr, Session::new(id, addr, now));
        }
        self.sessions.get_mut(&addr)
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.sessions.contains_key(addr)
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&Session> {
        self.sessions.get(addr)
    }

    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut Session> {
        self.sessions.get_mut(addr)
    }

    pub fn find(&self, id: SessionId) -> Option<&Session> {
        self.sessions.values().find(|s| s.id == id)
    }

    /// Detaches a session so it can be mutated alongside the rest of the
    /// table; pair with [`SessionTable::restore`].
    pub fn take(&mut self, addr: &SocketAddr) -> Option<Session> {
        self.sessions.remove(addr)
    }

    pub fn restore(&mut self, session: Session) {
        self.sessions.insert(session.addr, session);
    }

    pub fn remove(&mut self, addr: &SocketAddr) -> Option<Session> {
        self.sessions.remove(addr)
    }

    pub fn expired(&self, now: Instant) -> Vec<SocketAddr> {
        self.sessions
            .values()
            .filter(|s| !s.active || s.is_idle(now, self.timeout))
            .map(|s| s.addr)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn players(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values().filter(|s| s.is_player() && s.active)
    }

    pub fn player_count(&self) -> usize {
        self.players().count()
    }

    pub fn allocate_player_id(&mut self) -> Result<PlayerId, SessionError> {
        self.player_ids.allocate()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&mut self) -> Vec<Session> {
        self.sessions.drain().map(|(_, s)| s).collect()
    }
}

use std::net::SocketAddr;
use std::time::Duration;

use rift::LobbySettings;
use rift::net::DEFAULT_PORT;
use rift::session::{DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TIMEOUT};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub session_timeout: Duration,
    pub cleanup_interval: Duration,
    pub max_sessions: usize,
    pub lobby: LobbySettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            cleanup_interval: Duration::from_secs(30),
            max_sessions: DEFAULT_MAX_SESSIONS,
            lobby: LobbySettings::default(),
        }
    }
}

impl ServerConfig {
    pub fn local(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], port)),
            ..Default::default()
        }
    }
}

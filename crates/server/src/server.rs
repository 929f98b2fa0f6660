use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};

use rift::net::{ClientDisconnect, ClientListUpdate, EntityDestroy, MAX_DATAGRAM_SIZE, Payload};
use rift::{
    DisconnectReason, HandlerContext, Lobby, MessageDispatcher, Outbox, PacketFlags, PlayerEntry,
    PlayerId, Recipient, Session, SessionTable, encode_message, unix_time_ms,
};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::events::ServerEvent;
use crate::handlers::register_default_handlers;

const MIN_CLEANUP_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub packets_rejected: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
}

pub struct UdpServer {
    config: ServerConfig,
    state: ServerState,
    socket: Option<Arc<UdpSocket>>,
    local_addr: Option<SocketAddr>,
    sessions: SessionTable,
    dispatcher: MessageDispatcher,
    lobby: Lobby,
    observer: Option<mpsc::UnboundedSender<ServerEvent>>,
    stats: ServerStats,
}

impl UdpServer {
    pub fn new(config: ServerConfig) -> Self {
        let mut dispatcher = MessageDispatcher::new();
        register_default_handlers(&mut dispatcher);

        Self {
            sessions: SessionTable::new(config.session_timeout, config.max_sessions),
            lobby: Lobby::new(config.lobby.clone()),
            dispatcher,
            config,
            state: ServerState::Stopped,
            socket: None,
            local_addr: None,
            observer: None,
            stats: ServerStats::default(),
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn dispatcher_mut(&mut self) -> &mut MessageDispatcher {
        &mut self.dispatcher
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer = Some(tx);
        rx
    }

    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.state != ServerState::Stopped {
            return Err(ServerError::AlreadyRunning);
        }
        self.state = ServerState::Starting;

        let addr = self.config.bind_addr;
        let socket = match UdpSocket::bind(addr).await {
            Ok(socket) => socket,
            Err(source) => {
                self.state = ServerState::Stopped;
                return Err(ServerError::Bind { addr, source });
            }
        };
        let local_addr = socket.local_addr()?;

        self.socket = Some(Arc::new(socket));
        self.local_addr = Some(local_addr);
        self.state = ServerState::Running;
        log::info!("Server listening on {}", local_addr);
        Ok(local_addr)
    }

    /// Runs until `shutdown` flips to true or its sender is dropped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
        let socket = self.socket.clone().ok_or(ServerError::NotRunning)?;
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        let period = self.config.cleanup_interval.max(MIN_CLEANUP_INTERVAL);
        let mut cleanup = time::interval_at(time::Instant::now() + period, period);
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.state == ServerState::Running {
            tokio::select! {
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, addr)) => {
                        self.handle_datagram(addr, &buf[..len], Instant::now());
                    }
                    // ICMP unreachable from a departed peer surfaces here on some platforms
                    Err(e) => log::warn!("Receive failed: {}", e),
                },
                _ = cleanup.tick() => {
                    let removed = self.cleanup_sessions(Instant::now());
                    if removed > 0 {
                        log::debug!(
                            "Cleanup removed {} session(s), {} left",
                            removed,
                            self.sessions.len()
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.stop();
        Ok(())
    }

    pub fn handle_datagram(&mut self, addr: SocketAddr, data: &[u8], now: Instant) -> bool {
        self.stats.packets_received += 1;
        self.stats.bytes_received += data.len() as u64;

        let is_new = !self.sessions.contains(&addr);
        let Some(session) = self.sessions.get_or_create(addr, now) else {
            log::warn!(
                "Session table full ({}), dropping datagram from {}",
                self.config.max_sessions,
                addr
            );
            self.emit(ServerEvent::SessionLimitReached { addr });
            return false;
        };
        session.touch(now);
        let session_id = session.id();
        if is_new {
            self.emit(ServerEvent::SessionOpened { session_id, addr });
        }

        let Some(mut session) = self.sessions.take(&addr) else {
            return false;
        };
        let player_before = session.player_id();
        let was_in_game = self.lobby.in_game();

        let mut outbox = Outbox::new();
        let handled = {
            let mut ctx = HandlerContext {
                session: &mut session,
                sessions: &mut self.sessions,
                lobby: &mut self.lobby,
                outbox: &mut outbox,
                now_ms: unix_time_ms(),
            };
            self.dispatcher.dispatch(&mut ctx, data)
        };

        let joined = match (player_before, session.player_id()) {
            (None, Some(player_id)) => Some((player_id, session.player_name.clone())),
            _ => None,
        };
        let still_active = session.is_active();
        self.sessions.restore(session);

        if !handled {
            self.stats.packets_rejected += 1;
            self.emit(ServerEvent::PacketRejected {
                addr,
                len: data.len(),
            });
        }
        if let Some((player_id, name)) = joined {
            self.emit(ServerEvent::PlayerJoined {
                player_id,
                name,
                addr,
            });
        }
        if !was_in_game && let Some(timestamp_ms) = self.lobby.started_at_ms() {
            self.emit(ServerEvent::GameStarted { timestamp_ms });
        }

        self.flush(&mut outbox);

        if !still_active {
            self.close_session(&addr, DisconnectReason::Graceful);
        }

        handled
    }

    pub fn cleanup_sessions(&mut self, now: Instant) -> usize {
        let expired = self.sessions.expired(now);
        for addr in &expired {
            let reason = match self.sessions.get(addr) {
                Some(session) if session.is_active() => DisconnectReason::Timeout,
                _ => DisconnectReason::Graceful,
            };
            self.close_session(addr, reason);
        }
        expired.len()
    }

    pub fn close_session(&mut self, addr: &SocketAddr, reason: DisconnectReason) {
        let Some(session) = self.sessions.remove(addr) else {
            return;
        };
        self.emit(ServerEvent::SessionClosed {
            session_id: session.id(),
            addr: *addr,
        });
        if let Some(player_id) = session.player_id() {
            self.announce_leave(player_id, session.player_name, reason);
        }
    }

    fn announce_leave(&mut self, player_id: PlayerId, name: String, reason: DisconnectReason) {
        self.broadcast(&ClientDisconnect { player_id, reason });
        self.broadcast(&EntityDestroy {
            entity_id: player_id,
        });
        self.broadcast(&ClientListUpdate {
            players: self.roster(),
        });
        self.emit(ServerEvent::PlayerLeft {
            player_id,
            name,
            reason,
        });

        if self.sessions.player_count() == 0 && self.lobby.in_game() {
            log::info!("Last player left, lobby reset");
            self.lobby.reset();
        }
    }

    fn roster(&self) -> Vec<PlayerEntry> {
        let mut players: Vec<PlayerEntry> =
            self.sessions.players().filter_map(Session::summary).collect();
        players.sort_by_key(|p| p.player_id);
        players
    }

    fn flush(&mut self, outbox: &mut Outbox) {
        for (to, data) in outbox.drain() {
            for addr in self.resolve(to) {
                self.send_datagram(addr, &data);
            }
        }
    }

    fn resolve(&self, to: Recipient) -> Vec<SocketAddr> {
        match to {
            Recipient::Session(id) => self
                .sessions
                .find(id)
                .map(Session::addr)
                .into_iter()
                .collect(),
            Recipient::All => self.sessions.players().map(Session::addr).collect(),
            Recipient::AllExcept(excluded) => self
                .sessions
                .players()
                .filter(|s| s.id() != excluded)
                .map(Session::addr)
                .collect(),
        }
    }

    pub fn broadcast<P: Payload>(&mut self, payload: &P) {
        let data = encode_message(payload, PacketFlags::SERVER);
        for addr in self.resolve(Recipient::All) {
            self.send_datagram(addr, &data);
        }
    }

    pub fn broadcast_except<P: Payload>(&mut self, excluded: &SocketAddr, payload: &P) {
        let data = encode_message(payload, PacketFlags::SERVER);
        let targets: Vec<SocketAddr> = self
            .sessions
            .players()
            .map(Session::addr)
            .filter(|addr| addr != excluded)
            .collect();
        for addr in targets {
            self.send_datagram(addr, &data);
        }
    }

    pub fn send_to_client<P: Payload>(&mut self, addr: SocketAddr, payload: &P) -> bool {
        let data = encode_message(payload, PacketFlags::SERVER);
        self.send_datagram(addr, &data)
    }

    fn send_datagram(&mut self, addr: SocketAddr, data: &[u8]) -> bool {
        let Some(socket) = &self.socket else {
            return false;
        };
        match socket.try_send_to(data, addr) {
            Ok(sent) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += sent as u64;
                true
            }
            Err(e) => {
                self.stats.send_failures += 1;
                log::warn!("Send to {} failed: {}", addr, e);
                false
            }
        }
    }

    pub fn stop(&mut self) {
        if matches!(self.state, ServerState::Stopped | ServerState::Stopping) {
            return;
        }
        self.state = ServerState::Stopping;

        let players: Vec<(SocketAddr, PlayerId)> = self
            .sessions
            .players()
            .filter_map(|s| s.player_id().map(|id| (s.addr(), id)))
            .collect();
        for (addr, player_id) in players {
            self.send_to_client(
                addr,
                &ClientDisconnect {
                    player_id,
                    reason: DisconnectReason::ServerShutdown,
                },
            );
        }

        for session in self.sessions.clear() {
            if let Some(player_id) = session.player_id() {
                self.emit(ServerEvent::PlayerLeft {
                    player_id,
                    name: session.player_name,
                    reason: DisconnectReason::ServerShutdown,
                });
            }
        }
        self.lobby.reset();
        self.socket = None;
        self.state = ServerState::Stopped;
        log::info!(
            "Server stopped ({} packets in, {} out)",
            self.stats.packets_received,
            self.stats.packets_sent
        );
    }

    fn emit(&self, event: ServerEvent) {
        match event {
            ServerEvent::PacketRejected { .. } => log::debug!("{}", event),
            _ => log::info!("{}", event),
        }
        if let Some(observer) = &self.observer {
            let _ = observer.send(event);
        }
    }
}

/// A server running on its own thread with a current-thread runtime.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Returns once the socket is bound.
    pub fn spawn(config: ServerConfig) -> Result<Self, ServerError> {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let thread = thread::Builder::new()
            .name("rift-server".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(ServerError::Io(e)));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let mut server = UdpServer::new(config);
                    match server.start().await {
                        Ok(addr) => {
                            let _ = ready_tx.send(Ok(addr));
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    }
                    if let Err(e) = server.run(shutdown_rx).await {
                        log::error!("Server loop failed: {}", e);
                    }
                });
            })?;

        let local_addr = ready_rx.recv().map_err(|_| ServerError::NotRunning)??;

        Ok(Self {
            local_addr,
            shutdown: shutdown_tx,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("Server thread panicked");
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use rift::net::{ClientConnect, ClientReady, PROTOCOL_VERSION, Ping};
    use rift::{create_packet, encode_message};

    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn packet<P: Payload>(payload: &P) -> Vec<u8> {
        encode_message(payload, PacketFlags::empty())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_same_address_reuses_session() {
        let mut server = UdpServer::new(ServerConfig::default());
        let now = Instant::now();

        assert!(server.handle_datagram(addr(5000), &packet(&Ping), now));
        let first = server.sessions().get(&addr(5000)).unwrap().id();
        assert!(server.handle_datagram(addr(5000), &packet(&Ping), now));

        assert_eq!(server.sessions().len(), 1);
        assert_eq!(server.sessions().get(&addr(5000)).unwrap().id(), first);

        server.handle_datagram(addr(5001), &packet(&Ping), now);
        assert_eq!(server.sessions().len(), 2);
    }

    #[test]
    fn test_idle_sessions_are_cleaned_up() {
        let mut server = UdpServer::new(ServerConfig::default());
        let start = Instant::now();
        server.handle_datagram(addr(5000), &packet(&Ping), start);

        assert_eq!(server.cleanup_sessions(start + Duration::from_secs(299)), 0);
        assert_eq!(server.cleanup_sessions(start + Duration::from_secs(301)), 1);
        assert!(server.sessions().is_empty());
    }

    #[test]
    fn test_idle_player_is_announced_as_timed_out() {
        let mut server = UdpServer::new(ServerConfig::default());
        let mut events = server.subscribe();
        let start = Instant::now();
        server.handle_datagram(addr(5000), &packet(&ClientConnect::new("Alice")), start);
        server.handle_datagram(addr(5001), &packet(&ClientConnect::new("Bob")), start);
        server.handle_datagram(
            addr(5001),
            &packet(&Ping),
            start + Duration::from_secs(200),
        );
        drain(&mut events);

        assert_eq!(server.cleanup_sessions(start + Duration::from_secs(301)), 1);
        assert!(!server.sessions().contains(&addr(5000)));
        assert_eq!(server.sessions().player_count(), 1);
        assert!(drain(&mut events).iter().any(|e| matches!(
            e,
            ServerEvent::PlayerLeft {
                player_id: 1,
                reason: DisconnectReason::Timeout,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_zero_cleanup_interval_is_clamped() {
        let mut server = UdpServer::new(ServerConfig {
            cleanup_interval: Duration::ZERO,
            ..ServerConfig::local(0)
        });
        server.start().await.unwrap();

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        server.run(rx).await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[test]
    fn test_activity_postpones_timeout() {
        let mut server = UdpServer::new(ServerConfig::default());
        let start = Instant::now();
        server.handle_datagram(addr(5000), &packet(&Ping), start);
        server.handle_datagram(
            addr(5000),
            &packet(&Ping),
            start + Duration::from_secs(200),
        );

        assert_eq!(server.cleanup_sessions(start + Duration::from_secs(301)), 0);
        assert_eq!(server.sessions().len(), 1);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let mut server = UdpServer::new(ServerConfig::default());
        let mut events = server.subscribe();

        let data = create_packet(0x99, PacketFlags::empty(), &[0; 8]).unwrap();
        assert!(!server.handle_datagram(addr(5000), &data, Instant::now()));

        let session = server.sessions().get(&addr(5000)).unwrap();
        assert_eq!(session.player_id(), None);
        assert!(!session.authenticated);
        assert_eq!(server.stats().packets_rejected, 1);
        assert!(matches!(
            drain(&mut events).as_slice(),
            [
                ServerEvent::SessionOpened { .. },
                ServerEvent::PacketRejected { len: 12, .. }
            ]
        ));
    }

    #[test]
    fn test_connect_assigns_sequential_ids() {
        let mut server = UdpServer::new(ServerConfig::default());
        let mut events = server.subscribe();
        let now = Instant::now();

        assert!(server.handle_datagram(addr(5000), &packet(&ClientConnect::new("Alice")), now));
        assert!(server.handle_datagram(addr(5001), &packet(&ClientConnect::new("Bob")), now));

        let alice = server.sessions().get(&addr(5000)).unwrap();
        let bob = server.sessions().get(&addr(5001)).unwrap();
        assert_eq!(alice.player_id(), Some(1));
        assert_eq!(bob.player_id(), Some(2));
        assert_eq!(server.sessions().player_count(), 2);

        let joined: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::PlayerJoined { player_id, name, .. } => Some((player_id, name)),
                _ => None,
            })
            .collect();
        assert_eq!(joined, vec![(1, "Alice".to_string()), (2, "Bob".to_string())]);
    }

    #[test]
    fn test_version_mismatch_drops_session() {
        let mut server = UdpServer::new(ServerConfig::default());
        let connect = ClientConnect {
            player_name: "Old".into(),
            client_version: PROTOCOL_VERSION + 1,
        };

        assert!(server.handle_datagram(addr(5000), &packet(&connect), Instant::now()));
        assert!(server.sessions().is_empty());
    }

    #[test]
    fn test_session_limit() {
        let mut server = UdpServer::new(ServerConfig {
            max_sessions: 1,
            ..Default::default()
        });
        let mut events = server.subscribe();
        let now = Instant::now();

        assert!(server.handle_datagram(addr(5000), &packet(&Ping), now));
        assert!(!server.handle_datagram(addr(5001), &packet(&Ping), now));
        assert_eq!(server.sessions().len(), 1);
        assert!(
            drain(&mut events)
                .iter()
                .any(|e| matches!(e, ServerEvent::SessionLimitReached { .. }))
        );
    }

    #[test]
    fn test_last_player_leaving_resets_lobby() {
        let mut server = UdpServer::new(ServerConfig::default());
        let mut events = server.subscribe();
        let now = Instant::now();

        server.handle_datagram(addr(5000), &packet(&ClientConnect::new("Alice")), now);
        server.handle_datagram(
            addr(5000),
            &packet(&ClientReady {
                player_id: 1,
                ready: true,
            }),
            now,
        );
        assert!(server.lobby().in_game());

        let leave = ClientDisconnect {
            player_id: 1,
            reason: DisconnectReason::Graceful,
        };
        assert!(server.handle_datagram(addr(5000), &packet(&leave), now));

        assert!(server.sessions().is_empty());
        assert!(!server.lobby().in_game());
        let events = drain(&mut events);
        assert!(events.iter().any(|e| matches!(e, ServerEvent::GameStarted { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::PlayerLeft {
                player_id: 1,
                reason: DisconnectReason::Graceful,
                ..
            }
        )));
    }

    #[test]
    fn test_run_requires_start() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (_tx, rx) = watch::channel(false);
        let mut server = UdpServer::new(ServerConfig::default());

        let result = runtime.block_on(server.run(rx));
        assert!(matches!(result, Err(ServerError::NotRunning)));
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let mut server = UdpServer::new(ServerConfig::local(0));
        let bound = server.start().await.unwrap();
        assert_ne!(bound.port(), 0);
        assert_eq!(server.state(), ServerState::Running);
        assert!(matches!(server.start().await, Err(ServerError::AlreadyRunning)));

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        server.run(rx).await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
    }
}

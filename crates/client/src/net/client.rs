use std::collections::HashSet;
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use glam::Vec2;

use rift::net::{
    ClientConnect, ClientDisconnect, ClientListUpdate, ClientReady, EntityCreate, EntityDestroy,
    EntityUpdate, Ping, PlayerShoot, ServerAccept, StartGame, hex_preview,
};
use rift::{
    DisconnectReason, EntitySnapshot, EventQueue, EventSender, LocalEntitySource,
    MAX_DATAGRAM_SIZE, MessageType, NetworkEvent, PacketFlags, PacketView, Payload, PlayerId,
    PositionSample, ShotFired, encode_message, event_channel, parse, unix_time_ms,
};

use super::config::ClientConfig;
use super::error::ClientError;

const NO_PLAYER: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug)]
struct Shared {
    running: AtomicBool,
    connected: AtomicBool,
    confirmed: AtomicBool,
    rejected: AtomicBool,
    reject_reason: AtomicU8,
    local_player_id: AtomicI64,
}

impl Shared {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            confirmed: AtomicBool::new(false),
            rejected: AtomicBool::new(false),
            reject_reason: AtomicU8::new(0),
            local_player_id: AtomicI64::new(NO_PLAYER),
        }
    }

    fn reset(&self) {
        self.connected.store(false, Ordering::Release);
        self.confirmed.store(false, Ordering::Release);
        self.rejected.store(false, Ordering::Release);
        self.local_player_id.store(NO_PLAYER, Ordering::Release);
    }

    fn player_id(&self) -> Option<PlayerId> {
        PlayerId::try_from(self.local_player_id.load(Ordering::Acquire)).ok()
    }
}

pub struct ClientNetworkService {
    config: ClientConfig,
    state: ConnectionState,
    socket: Option<Arc<UdpSocket>>,
    server_addr: Option<SocketAddr>,
    receiver: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
    event_tx: EventSender,
    events: EventQueue,
    tick_count: u64,
}

impl ClientNetworkService {
    pub fn new(config: ClientConfig) -> Self {
        let (event_tx, events) = event_channel();
        Self {
            config,
            state: ConnectionState::Disconnected,
            socket: None,
            server_addr: None,
            receiver: None,
            shared: Arc::new(Shared::new()),
            event_tx,
            events,
            tick_count: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.state {
            // the server may have dropped us from the receive thread
            ConnectionState::Connected if !self.shared.connected.load(Ordering::Acquire) => {
                ConnectionState::Disconnected
            }
            state => state,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn local_player_id(&self) -> Option<PlayerId> {
        self.shared.player_id()
    }

    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server_addr
    }

    /// Blocks the caller for at most `handshake_timeout`.
    pub fn connect(&mut self, host: &str, port: u16, name: &str) -> Result<PlayerId, ClientError> {
        if self.state() != ConnectionState::Disconnected {
            return Err(ClientError::AlreadyConnected);
        }
        // a server-side disconnect leaves the old socket and thread behind
        self.teardown();

        let server_addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| ClientError::Resolve(format!("{}:{} ({})", host, port, e)))?
            .next()
            .ok_or_else(|| ClientError::Resolve(format!("{}:{}", host, port)))?;

        log::info!("Connecting to {} as {}", server_addr, name);
        self.state = ConnectionState::Connecting;

        if let Err(e) = self.open(server_addr) {
            self.teardown();
            return Err(e.into());
        }

        if let Err(e) = self.send_raw(&ClientConnect::new(name)) {
            self.teardown();
            return Err(e);
        }

        match self.await_confirmation() {
            Ok(player_id) => {
                self.state = ConnectionState::Connected;
                self.tick_count = 0;
                log::info!("Connected to {} as player {}", server_addr, player_id);
                Ok(player_id)
            }
            Err(e) => {
                log::warn!("Handshake with {} failed: {}", server_addr, e);
                self.teardown();
                Err(e)
            }
        }
    }

    fn open(&mut self, server_addr: SocketAddr) -> io::Result<()> {
        let local: SocketAddr = if server_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(server_addr)?;
        socket.set_read_timeout(Some(self.config.receive_timeout))?;
        let socket = Arc::new(socket);

        self.shared.reset();
        self.shared.running.store(true, Ordering::Release);

        // events from an earlier attempt must not leak into this connection
        let (event_tx, events) = event_channel();
        self.event_tx = event_tx;
        self.events = events;

        let receiver = ReceiveLoop {
            socket: Arc::clone(&socket),
            shared: Arc::clone(&self.shared),
            events: self.event_tx.clone(),
            known_players: HashSet::new(),
        };
        let handle = thread::Builder::new()
            .name("rift-net-recv".into())
            .spawn(move || receiver.run())?;

        self.socket = Some(socket);
        self.server_addr = Some(server_addr);
        self.receiver = Some(handle);
        Ok(())
    }

    fn await_confirmation(&self) -> Result<PlayerId, ClientError> {
        let deadline = Instant::now() + self.config.handshake_timeout;
        loop {
            if self.shared.confirmed.load(Ordering::Acquire)
                && let Some(player_id) = self.shared.player_id()
            {
                return Ok(player_id);
            }
            if self.shared.rejected.load(Ordering::Acquire) {
                let reason = self.shared.reject_reason.load(Ordering::Acquire);
                return Err(ClientError::Rejected(DisconnectReason::from(reason)));
            }
            if Instant::now() >= deadline {
                return Err(ClientError::HandshakeTimeout(self.config.handshake_timeout));
            }
            thread::sleep(self.config.handshake_poll_interval);
        }
    }

    pub fn disconnect(&mut self) {
        if self.is_connected()
            && let Some(player_id) = self.local_player_id()
        {
            let goodbye = ClientDisconnect {
                player_id,
                reason: DisconnectReason::Graceful,
            };
            if let Err(e) = self.send_raw(&goodbye) {
                log::warn!("Failed to send disconnect: {}", e);
            }
            log::info!("Disconnected from server");
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.receiver.take()
            && handle.join().is_err()
        {
            log::error!("Receive thread panicked");
        }
        self.socket = None;
        self.server_addr = None;
        self.shared.reset();
        self.state = ConnectionState::Disconnected;
    }

    fn send_raw<P: Payload>(&self, payload: &P) -> Result<(), ClientError> {
        let socket = self.socket.as_ref().ok_or(ClientError::NotConnected)?;
        socket.send(&encode_message(payload, PacketFlags::empty()))?;
        Ok(())
    }

    fn send<P: Payload>(&self, payload: &P) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.send_raw(payload)
    }

    fn require_player(&self) -> Result<PlayerId, ClientError> {
        self.local_player_id().ok_or(ClientError::NotConnected)
    }

    pub fn send_ready(&self, ready: bool) -> Result<(), ClientError> {
        let player_id = self.require_player()?;
        self.send(&ClientReady { player_id, ready })
    }

    pub fn send_position(&self, snapshot: EntitySnapshot) -> Result<(), ClientError> {
        self.send(&snapshot.to_update(unix_time_ms()))
    }

    pub fn send_shoot(&self, shot: ShotFired) -> Result<(), ClientError> {
        let player_id = self.require_player()?;
        self.send(&ShotFired { player_id, ..shot }.to_message())
    }

    pub fn send_ping(&self) -> Result<(), ClientError> {
        self.send(&Ping)
    }

    /// Returns whether a position was sent this tick.
    pub fn tick(&mut self, source: &impl LocalEntitySource) -> Result<bool, ClientError> {
        if !self.is_connected() {
            return Ok(false);
        }
        self.tick_count += 1;
        let interval = u64::from(self.config.send_interval_ticks.max(1));
        if self.tick_count % interval != 0 {
            return Ok(false);
        }
        match source.controlled_entity() {
            Some(snapshot) => {
                self.send_position(snapshot)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn poll_events(&self) -> Vec<NetworkEvent> {
        self.events.drain().collect()
    }
}

impl Drop for ClientNetworkService {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct ReceiveLoop {
    socket: Arc<UdpSocket>,
    shared: Arc<Shared>,
    events: EventSender,
    known_players: HashSet<PlayerId>,
}

impl ReceiveLoop {
    fn run(mut self) {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        while self.shared.running.load(Ordering::Acquire) {
            match self.socket.recv(&mut buf) {
                Ok(len) => self.handle_datagram(&buf[..len]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                // ICMP port unreachable from an absent server
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
                    ) =>
                {
                    log::debug!("Server unreachable: {}", e);
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    log::warn!("Receive failed: {}", e);
                    thread::sleep(Duration::from_millis(10));
                }
            }
        }
        log::debug!("Receive thread exiting");
    }

    fn local_player(&self) -> Option<PlayerId> {
        self.shared.player_id()
    }

    fn emit(&self, event: NetworkEvent) {
        log::debug!("Event {}", event.name());
        self.events.emit(event);
    }

    fn handle_datagram(&mut self, data: &[u8]) {
        let packet = match parse(data) {
            Ok(packet) => packet,
            Err(e) => {
                log::warn!("Dropping malformed packet: {} [{}]", e, hex_preview(data, 16));
                return;
            }
        };
        let kind = match packet.kind() {
            Ok(kind) => kind,
            Err(e) => {
                log::debug!("Ignoring packet: {}", e);
                return;
            }
        };

        if let Err(e) = self.handle_packet(kind, &packet) {
            log::warn!("Bad {} payload: {}", kind.name(), e);
        }
    }

    fn handle_packet(
        &mut self,
        kind: MessageType,
        packet: &PacketView<'_>,
    ) -> Result<(), rift::PacketError> {
        match kind {
            MessageType::ServerAccept => self.on_accept(packet.decode()?),
            MessageType::ClientListUpdate => self.on_client_list(packet.decode()?),
            MessageType::ClientDisconnect => self.on_disconnect(packet.decode()?),
            MessageType::EntityUpdate => self.on_entity_update(packet.decode()?),
            MessageType::EntityCreate => {
                let create: EntityCreate = packet.decode()?;
                self.emit(NetworkEvent::EntityCreate {
                    entity_id: create.entity_id,
                    kind: create.entity_type,
                    position: Vec2::new(create.x, create.y),
                    health: create.health,
                });
            }
            MessageType::EntityDestroy => {
                let destroy: EntityDestroy = packet.decode()?;
                self.emit(NetworkEvent::EntityDestroy {
                    entity_id: destroy.entity_id,
                });
            }
            MessageType::StartGame => {
                let start: StartGame = packet.decode()?;
                self.emit(NetworkEvent::StartGame {
                    timestamp_ms: start.timestamp,
                });
            }
            MessageType::PlayerShoot => {
                let shot: PlayerShoot = packet.decode()?;
                self.emit(NetworkEvent::PlayerShoot(ShotFired::from(shot)));
            }
            MessageType::Ping => {}
            other => log::debug!("Ignoring client-bound {}", other.name()),
        }
        Ok(())
    }

    fn on_accept(&mut self, accept: ServerAccept) {
        if self.shared.confirmed.load(Ordering::Acquire) {
            return;
        }
        self.shared
            .local_player_id
            .store(i64::from(accept.player_id), Ordering::Release);
        self.shared.connected.store(true, Ordering::Release);
        self.shared.confirmed.store(true, Ordering::Release);
    }

    fn on_client_list(&mut self, update: ClientListUpdate) {
        let me = self.local_player();
        let listed: HashSet<PlayerId> = update
            .players
            .iter()
            .map(|p| p.player_id)
            .filter(|id| Some(*id) != me)
            .collect();

        for player in &update.players {
            if Some(player.player_id) != me && self.known_players.insert(player.player_id) {
                self.emit(NetworkEvent::PlayerJoin {
                    player_id: player.player_id,
                    name: player.name.clone(),
                });
            }
        }

        let vanished: Vec<PlayerId> = self.known_players.difference(&listed).copied().collect();
        for player_id in vanished {
            self.known_players.remove(&player_id);
            self.emit(NetworkEvent::PlayerLeave {
                player_id,
                reason: DisconnectReason::Unknown,
            });
        }

        self.emit(NetworkEvent::PlayerListUpdate(update.players));
    }

    fn on_disconnect(&mut self, message: ClientDisconnect) {
        if !self.shared.confirmed.load(Ordering::Acquire) {
            self.shared
                .reject_reason
                .store(message.reason as u8, Ordering::Release);
            self.shared.rejected.store(true, Ordering::Release);
            self.emit(NetworkEvent::Disconnected {
                reason: message.reason,
            });
            return;
        }

        if Some(message.player_id) == self.local_player() {
            log::info!("Server closed the connection: {}", message.reason.as_str());
            self.shared.connected.store(false, Ordering::Release);
            self.known_players.clear();
            self.emit(NetworkEvent::Disconnected {
                reason: message.reason,
            });
            return;
        }

        self.known_players.remove(&message.player_id);
        self.emit(NetworkEvent::PlayerLeave {
            player_id: message.player_id,
            reason: message.reason,
        });
    }

    fn on_entity_update(&mut self, update: EntityUpdate) {
        if !update.0.is_finite() {
            log::debug!("Dropping non-finite update for entity {}", update.0.entity_id);
            return;
        }
        let sample = PositionSample::from(update.0);
        if self.known_players.contains(&sample.entity_id) {
            self.emit(NetworkEvent::PlayerMove(sample));
        } else {
            self.emit(NetworkEvent::EntityUpdate(sample));
        }
    }
}

#[cfg(test)]
mod tests {
    use rift::PlayerEntry;

    use super::*;

    fn receive_loop() -> (ReceiveLoop, EventQueue) {
        let (events, queue) = event_channel();
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let receiver = ReceiveLoop {
            socket: Arc::new(socket),
            shared: Arc::new(Shared::new()),
            events,
            known_players: HashSet::new(),
        };
        (receiver, queue)
    }

    fn deliver<P: Payload>(receiver: &mut ReceiveLoop, payload: &P) {
        receiver.handle_datagram(&encode_message(payload, PacketFlags::SERVER));
    }

    fn entry(player_id: PlayerId, name: &str) -> PlayerEntry {
        PlayerEntry {
            player_id,
            ready: false,
            name: name.into(),
        }
    }

    #[test]
    fn test_accept_confirms_and_stores_id() {
        let (mut receiver, _queue) = receive_loop();
        deliver(&mut receiver, &ServerAccept { player_id: 3 });

        assert!(receiver.shared.confirmed.load(Ordering::Acquire));
        assert!(receiver.shared.connected.load(Ordering::Acquire));
        assert_eq!(receiver.shared.player_id(), Some(3));
    }

    #[test]
    fn test_refusal_during_handshake() {
        let (mut receiver, queue) = receive_loop();
        deliver(
            &mut receiver,
            &ClientDisconnect {
                player_id: 0,
                reason: DisconnectReason::ServerFull,
            },
        );

        assert!(receiver.shared.rejected.load(Ordering::Acquire));
        assert_eq!(
            DisconnectReason::from(receiver.shared.reject_reason.load(Ordering::Acquire)),
            DisconnectReason::ServerFull
        );
        assert_eq!(
            queue.drain().collect::<Vec<_>>(),
            vec![NetworkEvent::Disconnected {
                reason: DisconnectReason::ServerFull
            }]
        );
    }

    #[test]
    fn test_client_list_diffs_into_join_and_leave() {
        let (mut receiver, queue) = receive_loop();
        deliver(&mut receiver, &ServerAccept { player_id: 1 });

        deliver(
            &mut receiver,
            &ClientListUpdate {
                players: vec![entry(1, "me"), entry(2, "Bob")],
            },
        );
        let events: Vec<_> = queue.drain().collect();
        assert_eq!(
            events[0],
            NetworkEvent::PlayerJoin {
                player_id: 2,
                name: "Bob".into()
            }
        );
        assert_eq!(events[1].name(), "PlayerListUpdate");
        assert_eq!(events.len(), 2);

        deliver(
            &mut receiver,
            &ClientListUpdate {
                players: vec![entry(1, "me")],
            },
        );
        let events: Vec<_> = queue.drain().collect();
        assert_eq!(
            events[0],
            NetworkEvent::PlayerLeave {
                player_id: 2,
                reason: DisconnectReason::Unknown
            }
        );
    }

    #[test]
    fn test_updates_for_players_become_moves() {
        let (mut receiver, queue) = receive_loop();
        deliver(&mut receiver, &ServerAccept { player_id: 1 });
        deliver(
            &mut receiver,
            &ClientListUpdate {
                players: vec![entry(1, "me"), entry(2, "Bob")],
            },
        );
        queue.drain().for_each(drop);

        let mut update = rift::net::PositionUpdate {
            entity_id: 2,
            x: 5.0,
            ..Default::default()
        };
        deliver(&mut receiver, &EntityUpdate(update));
        update.entity_id = 40;
        deliver(&mut receiver, &EntityUpdate(update));

        let events: Vec<_> = queue.drain().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name(), "PlayerMove");
        assert_eq!(events[1].name(), "EntityUpdate");
        assert_eq!(events[0].position_sample().unwrap().position, Vec2::new(5.0, 0.0));
    }

    #[test]
    fn test_own_disconnect_drops_connection() {
        let (mut receiver, queue) = receive_loop();
        deliver(&mut receiver, &ServerAccept { player_id: 1 });
        deliver(
            &mut receiver,
            &ClientDisconnect {
                player_id: 1,
                reason: DisconnectReason::ServerShutdown,
            },
        );

        assert!(!receiver.shared.connected.load(Ordering::Acquire));
        assert_eq!(
            queue.drain().last(),
            Some(NetworkEvent::Disconnected {
                reason: DisconnectReason::ServerShutdown
            })
        );
    }

    #[test]
    fn test_malformed_datagrams_are_dropped() {
        let (mut receiver, queue) = receive_loop();
        receiver.handle_datagram(&[]);
        receiver.handle_datagram(&[0x02, 0x01, 0x09, 0x00, 1]);
        receiver.handle_datagram(&[0x02, 0x01, 0x02, 0x00, 1, 2]);

        assert_eq!(receiver.shared.player_id(), None);
        assert_eq!(queue.drain().count(), 0);
    }

    #[test]
    fn test_sending_requires_connection() {
        let client = ClientNetworkService::new(ClientConfig::default());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(matches!(client.send_ping(), Err(ClientError::NotConnected)));
        assert!(matches!(
            client.send_ready(true),
            Err(ClientError::NotConnected)
        ));
    }
}

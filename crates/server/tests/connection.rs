use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use rift::net::{
    ClientConnect, ClientDisconnect, ClientListUpdate, EntityCreate, EntityDestroy, EntityUpdate,
    Ping, PositionUpdate, ServerAccept,
};
use rift::{
    DisconnectReason, LobbySettings, MessageType, PacketFlags, Payload, encode_message, parse,
};
use rift_server::{ServerConfig, ServerHandle};

fn spawn_server(config: ServerConfig) -> ServerHandle {
    ServerHandle::spawn(config).unwrap()
}

fn client(server: &ServerHandle) -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_millis(50)))
        .unwrap();
    socket.connect(server.local_addr()).unwrap();
    socket
}

fn send<P: Payload>(socket: &UdpSocket, payload: &P) {
    socket
        .send(&encode_message(payload, PacketFlags::empty()))
        .unwrap();
}

/// Waits for the next packet of type `P`, skipping anything else.
fn wait_for<P: Payload>(socket: &UdpSocket, timeout_ms: u64) -> Option<P> {
    let start = Instant::now();
    let mut buf = [0u8; 1500];
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        let Ok(len) = socket.recv(&mut buf) else {
            continue;
        };
        let packet = parse(&buf[..len]).unwrap();
        assert!(packet.header.flags.contains(PacketFlags::SERVER));
        if packet.kind().ok() == Some(P::MESSAGE_TYPE) {
            return Some(packet.decode().unwrap());
        }
    }
    None
}

fn join(server: &ServerHandle, name: &str) -> (UdpSocket, u32) {
    let socket = client(server);
    send(&socket, &ClientConnect::new(name));
    let accept: ServerAccept = wait_for(&socket, 1000).expect("no ServerAccept");
    (socket, accept.player_id)
}

#[test]
fn test_connect_handshake() {
    let server = spawn_server(ServerConfig::local(0));
    let socket = client(&server);

    send(&socket, &ClientConnect::new("Alice"));
    let accept: ServerAccept = wait_for(&socket, 1000).expect("no ServerAccept");
    assert_eq!(accept.player_id, 1);

    let list: ClientListUpdate = wait_for(&socket, 1000).expect("no ClientListUpdate");
    assert_eq!(list.players.len(), 1);
    assert_eq!(list.players[0].name, "Alice");
}

#[test]
fn test_ping_is_echoed() {
    let server = spawn_server(ServerConfig::local(0));
    let socket = client(&server);

    send(&socket, &Ping);
    assert!(wait_for::<Ping>(&socket, 1000).is_some());
}

#[test]
fn test_position_is_relayed_to_other_players() {
    let server = spawn_server(ServerConfig::local(0));
    let (alice, alice_id) = join(&server, "Alice");
    let (bob, bob_id) = join(&server, "Bob");
    assert_ne!(alice_id, bob_id);

    let created: EntityCreate = wait_for(&alice, 1000).expect("alice never saw bob spawn");
    assert_eq!(created.entity_id, bob_id);

    send(
        &bob,
        &PositionUpdate {
            entity_id: bob_id,
            x: 12.0,
            y: -4.0,
            vx: 1.0,
            vy: 0.0,
            timestamp_ms: 1234,
        },
    );

    let relay: EntityUpdate = wait_for(&alice, 1000).expect("no relay");
    assert_eq!(relay.0.entity_id, bob_id);
    assert_eq!((relay.0.x, relay.0.y), (12.0, -4.0));
    assert_eq!(relay.0.timestamp_ms, 1234);

    // the sender never receives its own update back
    assert!(wait_for::<EntityUpdate>(&bob, 200).is_none());
}

#[test]
fn test_graceful_leave_is_announced() {
    let server = spawn_server(ServerConfig::local(0));
    let (alice, _) = join(&server, "Alice");
    let (bob, bob_id) = join(&server, "Bob");

    send(
        &bob,
        &ClientDisconnect {
            player_id: bob_id,
            reason: DisconnectReason::Graceful,
        },
    );

    let leave: ClientDisconnect = wait_for(&alice, 1000).expect("no leave notice");
    assert_eq!(leave.player_id, bob_id);
    assert_eq!(leave.reason, DisconnectReason::Graceful);
    let destroyed: EntityDestroy = wait_for(&alice, 1000).expect("no despawn");
    assert_eq!(destroyed.entity_id, bob_id);
}

#[test]
fn test_full_server_rejects() {
    let server = spawn_server(ServerConfig {
        lobby: LobbySettings {
            max_players: 1,
            min_players: 1,
        },
        ..ServerConfig::local(0)
    });
    let _first = join(&server, "Alice");

    let socket = client(&server);
    send(&socket, &ClientConnect::new("Bob"));
    let refusal: ClientDisconnect = wait_for(&socket, 1000).expect("no refusal");
    assert_eq!(refusal.reason, DisconnectReason::ServerFull);
}

#[test]
fn test_garbage_does_not_stop_server() {
    let server = spawn_server(ServerConfig::local(0));
    let socket = client(&server);

    socket.send(&[0xFF, 0x00]).unwrap();
    socket.send(&[MessageType::PositionUpdate.as_u8(), 0, 200, 0]).unwrap();
    socket.send(&[]).unwrap();

    send(&socket, &Ping);
    assert!(wait_for::<Ping>(&socket, 1000).is_some());
}

#[test]
fn test_shutdown_notifies_players() {
    let server = spawn_server(ServerConfig::local(0));
    let (alice, _) = join(&server, "Alice");
    let addr: SocketAddr = server.local_addr();
    assert_eq!(addr.ip().to_string(), "127.0.0.1");

    server.shutdown();
    let notice: ClientDisconnect = wait_for(&alice, 1000).expect("no shutdown notice");
    assert_eq!(notice.reason, DisconnectReason::ServerShutdown);
}

#[test]
fn test_idle_player_times_out_for_others() {
    let server = spawn_server(ServerConfig {
        session_timeout: Duration::from_millis(200),
        cleanup_interval: Duration::from_millis(50),
        ..ServerConfig::local(0)
    });
    let (alice, _) = join(&server, "Alice");
    let (_bob, bob_id) = join(&server, "Bob");

    let start = Instant::now();
    let mut leave = None;
    while leave.is_none() && start.elapsed() < Duration::from_secs(2) {
        send(&alice, &Ping);
        leave = wait_for::<ClientDisconnect>(&alice, 50);
    }

    let leave = leave.expect("bob never timed out");
    assert_eq!(leave.player_id, bob_id);
    assert_eq!(leave.reason, DisconnectReason::Timeout);

    let destroyed: EntityDestroy = wait_for(&alice, 500).expect("no despawn");
    assert_eq!(destroyed.entity_id, bob_id);
    let list: ClientListUpdate = wait_for(&alice, 500).expect("no roster refresh");
    let ids: Vec<_> = list.players.iter().map(|p| p.player_id).collect();
    assert!(!ids.contains(&bob_id));
}

use glam::Vec2;

use rift::net::{
    ClientConnect, ClientDisconnect, ClientListUpdate, ClientReady, DisconnectReason,
    EntityCreate, EntityKind, EntityUpdate, PROTOCOL_VERSION, Ping, PlayerId, PlayerShoot,
    PositionUpdate, ServerAccept, StartGame, sanitize_name,
};
use rift::{HandlerContext, MessageDispatcher, PayloadHandler};

pub const PLAYER_HEALTH: i32 = 100;

pub fn register_default_handlers(dispatcher: &mut MessageDispatcher) {
    dispatcher.register(ConnectionHandler);
    dispatcher.register(ReadyHandler);
    dispatcher.register(DisconnectHandler);
    dispatcher.register(PingHandler);
    dispatcher.register(PositionUpdateHandler);
    dispatcher.register(PlayerShootHandler);
}

pub fn player_entity(player_id: PlayerId, position: Vec2) -> EntityCreate {
    EntityCreate {
        entity_id: player_id,
        entity_type: EntityKind::Player,
        x: position.x,
        y: position.y,
        health: PLAYER_HEALTH,
    }
}

fn reject(ctx: &mut HandlerContext<'_>, reason: DisconnectReason) {
    log::info!(
        "Refusing connection from {}: {}",
        ctx.session.addr(),
        reason.as_str()
    );
    ctx.outbox.reply(
        ctx.session.id(),
        &ClientDisconnect {
            player_id: 0,
            reason,
        },
    );
    ctx.session.close();
}

pub struct ConnectionHandler;

impl PayloadHandler for ConnectionHandler {
    type Payload = ClientConnect;

    fn apply(&self, ctx: &mut HandlerContext<'_>, payload: ClientConnect) -> bool {
        let session_id = ctx.session.id();

        // duplicated connect datagram; answer again, assign nothing new
        if let Some(player_id) = ctx.session.player_id() {
            ctx.outbox.reply(session_id, &ServerAccept { player_id });
            return true;
        }

        if payload.client_version != PROTOCOL_VERSION {
            reject(ctx, DisconnectReason::VersionMismatch);
            return true;
        }

        if ctx.lobby.is_full(ctx.player_count()) {
            reject(ctx, DisconnectReason::ServerFull);
            return true;
        }

        let player_id = match ctx.sessions.allocate_player_id() {
            Ok(id) => id,
            Err(e) => {
                log::error!("Cannot admit {}: {}", ctx.session.addr(), e);
                reject(ctx, DisconnectReason::ServerFull);
                return true;
            }
        };

        let name = sanitize_name(&payload.player_name);
        if let Err(e) = ctx.session.assign_player(player_id, name) {
            log::warn!("{}", e);
            return false;
        }

        ctx.outbox.reply(session_id, &ServerAccept { player_id });
        ctx.outbox.broadcast(&ClientListUpdate {
            players: ctx.roster(),
        });

        for peer in ctx.sessions.players() {
            if let Some(peer_id) = peer.player_id() {
                ctx.outbox
                    .reply(session_id, &player_entity(peer_id, peer.position));
            }
        }
        ctx.outbox.broadcast_except(
            session_id,
            &player_entity(player_id, ctx.session.position),
        );

        if let Some(timestamp) = ctx.lobby.started_at_ms() {
            ctx.outbox.reply(session_id, &StartGame { timestamp });
        }

        true
    }
}

pub struct ReadyHandler;

impl PayloadHandler for ReadyHandler {
    type Payload = ClientReady;

    fn apply(&self, ctx: &mut HandlerContext<'_>, payload: ClientReady) -> bool {
        let Some(player_id) = ctx.session.player_id() else {
            return false;
        };
        if payload.player_id != player_id {
            log::debug!(
                "Session {} sent ready for player {}, owns {}",
                ctx.session.id(),
                payload.player_id,
                player_id
            );
            return false;
        }

        ctx.session.ready = payload.ready;
        ctx.outbox.broadcast(&ClientListUpdate {
            players: ctx.roster(),
        });

        if ctx.lobby.should_start(ctx.ready_count(), ctx.player_count())
            && ctx.lobby.start(ctx.now_ms)
        {
            ctx.outbox.broadcast(&StartGame {
                timestamp: ctx.now_ms,
            });
        }

        true
    }
}

pub struct DisconnectHandler;

impl PayloadHandler for DisconnectHandler {
    type Payload = ClientDisconnect;

    fn apply(&self, ctx: &mut HandlerContext<'_>, payload: ClientDisconnect) -> bool {
        log::debug!(
            "Session {} disconnecting: {}",
            ctx.session.id(),
            payload.reason.as_str()
        );
        ctx.session.close();
        true
    }
}

pub struct PingHandler;

impl PayloadHandler for PingHandler {
    type Payload = Ping;

    fn apply(&self, ctx: &mut HandlerContext<'_>, payload: Ping) -> bool {
        ctx.outbox.reply(ctx.session.id(), &payload);
        true
    }
}

pub struct PositionUpdateHandler;

impl PayloadHandler for PositionUpdateHandler {
    type Payload = PositionUpdate;

    fn apply(&self, ctx: &mut HandlerContext<'_>, payload: PositionUpdate) -> bool {
        let Some(player_id) = ctx.session.player_id() else {
            return false;
        };
        if !payload.is_finite() {
            return false;
        }

        ctx.session.position = Vec2::new(payload.x, payload.y);
        ctx.session.velocity = Vec2::new(payload.vx, payload.vy);

        let relay = EntityUpdate(PositionUpdate {
            entity_id: player_id,
            ..payload
        });
        ctx.outbox.broadcast_except(ctx.session.id(), &relay);
        true
    }
}

pub struct PlayerShootHandler;

impl PayloadHandler for PlayerShootHandler {
    type Payload = PlayerShoot;

    fn apply(&self, ctx: &mut HandlerContext<'_>, payload: PlayerShoot) -> bool {
        let Some(player_id) = ctx.session.player_id() else {
            return false;
        };
        let finite = [payload.start_x, payload.start_y, payload.dir_x, payload.dir_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return false;
        }

        ctx.outbox.broadcast_except(
            ctx.session.id(),
            &PlayerShoot {
                player_id,
                ..payload
            },
        );
        true
    }
}

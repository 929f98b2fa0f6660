mod outbox;

use std::collections::HashMap;

use crate::lobby::Lobby;
use crate::net::{Payload, PlayerEntry, decode_payload, hex_preview, parse};
use crate::session::{Session, SessionTable};

pub use outbox::{Outbox, Recipient};

const DIAGNOSTIC_PREVIEW_BYTES: usize = 16;

/// Everything a handler may touch while processing one message. `session`
/// is detached from `sessions` for the duration of the call.
pub struct HandlerContext<'a> {
    pub session: &'a mut Session,
    pub sessions: &'a mut SessionTable,
    pub lobby: &'a mut Lobby,
    pub outbox: &'a mut Outbox,
    pub now_ms: u64,
}

impl HandlerContext<'_> {
    pub fn roster(&self) -> Vec<PlayerEntry> {
        let mut players: Vec<PlayerEntry> = self
            .sessions
            .players()
            .filter_map(Session::summary)
            .chain(self.session.summary())
            .collect();
        players.sort_by_key(|p| p.player_id);
        players
    }

    pub fn player_count(&self) -> usize {
        self.sessions.player_count() + usize::from(self.session.is_player())
    }

    pub fn ready_count(&self) -> usize {
        self.roster().iter().filter(|p| p.ready).count()
    }
}

pub trait MessageHandler: Send {
    fn message_type(&self) -> u8;

    /// Returns false when the message was not handled. Must not block.
    fn handle(&self, ctx: &mut HandlerContext<'_>, payload: &[u8]) -> bool;
}

/// Typed handler; decoding and the size check are done before `apply`.
pub trait PayloadHandler: Send {
    type Payload: Payload;

    fn apply(&self, ctx: &mut HandlerContext<'_>, payload: Self::Payload) -> bool;
}

impl<H: PayloadHandler> MessageHandler for H {
    fn message_type(&self) -> u8 {
        H::Payload::MESSAGE_TYPE.as_u8()
    }

    fn handle(&self, ctx: &mut HandlerContext<'_>, payload: &[u8]) -> bool {
        match decode_payload::<H::Payload>(payload) {
            Ok(decoded) => self.apply(ctx, decoded),
            Err(e) => {
                log::debug!("Session {} sent bad payload: {}", ctx.session.id(), e);
                false
            }
        }
    }
}

#[derive(Default)]
pub struct MessageDispatcher {
    handlers: HashMap<u8, Box<dyn MessageHandler>>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: MessageHandler + 'static>(&mut self, handler: H) {
        let message_type = handler.message_type();
        if self
            .handlers
            .insert(message_type, Box::new(handler))
            .is_some()
        {
            log::warn!("Replaced handler for message type {:#04x}", message_type);
        }
    }

    pub fn handles(&self, message_type: u8) -> bool {
        self.handlers.contains_key(&message_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Routes one raw datagram by its leading type byte. Unknown types and
    /// malformed packets are logged and reported as `false`; neither is fatal.
    pub fn dispatch(&self, ctx: &mut HandlerContext<'_>, data: &[u8]) -> bool {
        let Some(&message_type) = data.first() else {
            log::warn!("Empty datagram from session {}", ctx.session.id());
            return false;
        };

        let Some(handler) = self.handlers.get(&message_type) else {
            log::warn!(
                "Unknown message type {:#04x} from session {} ({} bytes): {}",
                message_type,
                ctx.session.id(),
                data.len(),
                hex_preview(data, DIAGNOSTIC_PREVIEW_BYTES)
            );
            return false;
        };

        let packet = match parse(data) {
            Ok(packet) => packet,
            Err(e) => {
                log::warn!(
                    "Rejected packet from session {}: {} [{}]",
                    ctx.session.id(),
                    e,
                    hex_preview(data, DIAGNOSTIC_PREVIEW_BYTES)
                );
                return false;
            }
        };

        handler.handle(ctx, packet.payload)
    }
}

use crate::net::{PacketFlags, Payload, encode_message};
use crate::session::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Session(SessionId),
    All,
    AllExcept(SessionId),
}

#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<(Recipient, Vec<u8>)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send<P: Payload>(&mut self, to: Recipient, payload: &P) {
        self.messages
            .push((to, encode_message(payload, PacketFlags::SERVER)));
    }

    pub fn send_raw(&mut self, to: Recipient, data: Vec<u8>) {
        self.messages.push((to, data));
    }

    pub fn reply<P: Payload>(&mut self, session: SessionId, payload: &P) {
        self.send(Recipient::Session(session), payload);
    }

    pub fn broadcast<P: Payload>(&mut self, payload: &P) {
        self.send(Recipient::All, payload);
    }

    pub fn broadcast_except<P: Payload>(&mut self, excluded: SessionId, payload: &P) {
        self.send(Recipient::AllExcept(excluded), payload);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (Recipient, Vec<u8>)> + '_ {
        self.messages.drain(..)
    }

    pub fn messages(&self) -> &[(Recipient, Vec<u8>)] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

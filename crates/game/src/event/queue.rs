use std::sync::mpsc::{self, Receiver, Sender};

use super::types::NetworkEvent;

#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<NetworkEvent>,
}

impl EventSender {
    /// Returns false once the consumer is gone.
    pub fn emit(&self, event: NetworkEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

#[derive(Debug)]
pub struct EventQueue {
    rx: Receiver<NetworkEvent>,
}

impl EventQueue {
    pub fn poll(&self) -> Option<NetworkEvent> {
        self.rx.try_recv().ok()
    }

    pub fn drain(&self) -> impl Iterator<Item = NetworkEvent> + '_ {
        self.rx.try_iter()
    }
}

pub fn event_channel() -> (EventSender, EventQueue) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx }, EventQueue { rx })
}

//! Outbound message delivery

use alior_api::OutboundMessage;
use std::sync::Mutex;

/// Delivers replies to the chat transport.
///
/// Fire-and-forget: implementations log delivery problems themselves.
pub trait Sender: Send + Sync {
    fn send(&self, message: OutboundMessage);
}

/// Sender that keeps every message, for tests
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the recorded messages
    pub fn take(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Most recent message, if any
    pub fn last(&self) -> Option<OutboundMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Sender for RecordingSender {
    fn send(&self, message: OutboundMessage) {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }
}

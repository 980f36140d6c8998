//! Recording transport for controller tests

use super::message::{AckId, ClientEvent, ClientMessage};
use super::transport::{
    ConnectOutcome, ConnectionInfo, ListenerId, Listeners, Subscription, Transport,
    TransportError, TransportEvent,
};
use crate::token::AccessToken;

/// Transport that records what the controller does with it
#[derive(Debug, Default)]
pub struct RecordingTransport {
    /// Tokens passed to `connect` that created a connection
    pub tokens: Vec<AccessToken>,
    /// Every emitted message, oldest first
    pub sent: Vec<ClientMessage>,
    pub disconnects: usize,
    connection: Option<ConnectionInfo>,
    listeners: Listeners,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an event to subscribers
    pub fn deliver(&self, event: TransportEvent) {
        self.listeners.broadcast(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn take_sent(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.sent)
    }

    /// Ack ID of the most recent message carrying `event`'s name
    pub fn last_ack_for(&self, name: &str) -> Option<AckId> {
        self.sent
            .iter()
            .rev()
            .find(|m| m.event.name() == name)
            .and_then(|m| m.ack)
    }

    pub fn events(&self) -> Vec<ClientEvent> {
        self.sent.iter().map(|m| m.event.clone()).collect()
    }
}

impl Transport for RecordingTransport {
    fn connect(&mut self, token: &AccessToken) -> ConnectOutcome {
        if self.connection.is_some() {
            return ConnectOutcome::Existing;
        }
        self.tokens.push(token.clone());
        self.connection = Some(ConnectionInfo {
            id: format!("recording-{}", self.tokens.len()),
            url: "ws://test".to_string(),
        });
        ConnectOutcome::Created
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
        self.connection = None;
    }

    fn connection(&self) -> Option<&ConnectionInfo> {
        self.connection.as_ref()
    }

    fn emit(&mut self, message: ClientMessage) -> Result<(), TransportError> {
        if self.connection.is_none() {
            return Err(TransportError::NotConnected);
        }
        self.sent.push(message);
        Ok(())
    }

    fn subscribe(&mut self) -> Subscription {
        self.listeners.subscribe()
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }
}

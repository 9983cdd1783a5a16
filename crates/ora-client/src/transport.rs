//! Seams to the network layer.
//!
//! The connection core never touches sockets itself. A [`Connector`] opens
//! authenticated [`Session`]s and a session processes one [`Message`] at a
//! time. Wire framing, TLS and authentication handshakes live behind these
//! traits.

use std::fmt::Debug;

use async_trait::async_trait;
use ora_protocol::{Message, Response};

use crate::config::ConnectParams;
use crate::error::Result;

/// How a session should be torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectMode {
    /// Orderly shutdown after a logoff or session release.
    #[default]
    Graceful,
    /// Drop the transport without further round trips.
    Abort,
}

/// Opens new sessions.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    /// Connect and authenticate a new session.
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Session>>;
}

/// An authenticated server session.
#[async_trait]
pub trait Session: Send + Debug {
    /// Send a message and wait for the server response.
    async fn process_message(&mut self, message: Message) -> Result<Response>;

    /// Whether the transport is still connected.
    fn is_connected(&self) -> bool;

    /// Cheap liveness check without a round trip.
    fn is_healthy(&self) -> bool;

    /// Close the transport.
    async fn disconnect(&mut self, mode: DisconnectMode);
}

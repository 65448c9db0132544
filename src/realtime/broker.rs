//! Pub/sub broker boundary
//!
//! The realtime transport is an external collaborator; the crate only defines
//! the seam the channel manager drives. A broker implementation owns its own
//! connection lifecycle, including reconnection - the manager never retries
//! on its behalf. During any subscription attempt for a private channel the
//! broker calls back into the [`SubscriptionAuthorizer`] it was handed at
//! connect time; that may happen again at any point in the connection's life,
//! which is why authorizers fetch a fresh token per attempt.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Channel-name prefix that marks a channel as requiring authorization,
/// per the broker protocol.
pub const PRIVATE_CHANNEL_MARKER: &str = "private-";

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(String),
    #[error("subscription denied: {0}")]
    Denied(String),
}

/// Outcome of one authorization handshake, handed back to the broker as
/// proof (or refusal) of access to a private channel.
#[derive(Debug, Clone)]
pub enum ChannelAuthorization {
    /// The server signed off; the payload is passed to the broker unchanged.
    Granted(Value),
    /// The handshake failed; the broker marks the subscription failed and
    /// must not silently retry.
    Denied(String),
}

/// Authorizes one subscription attempt. Implementations must not reuse
/// tokens across attempts.
#[async_trait]
pub trait SubscriptionAuthorizer: Send + Sync {
    async fn authorize(&self, socket_id: &str, channel_name: &str) -> ChannelAuthorization;
}

/// Receives events the broker delivers on subscribed channels.
pub trait EventSink: Send + Sync {
    fn deliver(&self, channel: &str, event: &str, payload: &Value);
}

/// Factory for broker connections.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Establish a connection. The broker keeps the authorizer for the life
    /// of the connection and consults it on every private subscription
    /// attempt; events on subscribed channels go to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connection`] when the transport cannot be
    /// established.
    async fn connect(
        &self,
        authorizer: Arc<dyn SubscriptionAuthorizer>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

/// One live broker connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Connection identifier assigned by the broker, required by the
    /// authorization endpoint.
    fn socket_id(&self) -> String;

    /// Subscribe to a channel. Channels named with the
    /// [`PRIVATE_CHANNEL_MARKER`] prefix run the authorization handshake
    /// before the subscription is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Denied`] when the authorization handshake is
    /// refused.
    async fn subscribe(&self, channel: &str) -> Result<(), BrokerError>;

    /// Tear the connection down. Idempotent.
    async fn disconnect(&self);
}

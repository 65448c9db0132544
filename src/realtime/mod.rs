//! Realtime channel management
//!
//! Owns the broker connection and the two notification subscriptions: the
//! fixed public broadcast channel and the per-user private channel. Private
//! subscriptions run the CSRF-backed authorization handshake in
//! [`authorizer`]; the public channel subscribes without one (the broker does
//! not authorize public channels). Events from either channel are forwarded
//! unmodified to the notification presenter.

pub mod authorizer;
pub mod broker;

pub use authorizer::ChannelAuthorizer;
pub use broker::{
    Broker, BrokerConnection, BrokerError, ChannelAuthorization, EventSink,
    SubscriptionAuthorizer, PRIVATE_CHANNEL_MARKER,
};

use crate::models::{
    AuthorizationState, ChannelSubscription, NotificationEnvelope, UserId,
};
use crate::presenter::NotificationPresenter;
use crate::settings::BrokerSettings;
use std::sync::{Arc, Mutex, PoisonError};

/// Event carried on the public broadcast channel.
pub const PUBLIC_NOTIFICATION_EVENT: &str = "WebNotificationSentEvent";

/// Event carried on the per-user private channel.
pub const PRIVATE_NOTIFICATION_EVENT: &str = "PrivateNotificationEvent";

#[derive(Default)]
struct ManagerState {
    connection: Option<Box<dyn broker::BrokerConnection>>,
    subscriptions: Vec<ChannelSubscription>,
    // Bumped by every close(); lets open() detect a teardown that happened
    // while the connection was still being established.
    epoch: u64,
}

/// Opens and tears down the notification subscriptions for one session.
///
/// Never created before the session's user id is known; [`ChannelManager::open`]
/// takes the id explicitly to keep that ordering visible at the call site.
pub struct ChannelManager {
    broker: Arc<dyn Broker>,
    authorizer: Arc<dyn SubscriptionAuthorizer>,
    presenter: Arc<dyn NotificationPresenter>,
    public_channel: String,
    private_prefix: String,
    state: Mutex<ManagerState>,
}

impl ChannelManager {
    #[must_use]
    pub fn new(
        broker: Arc<dyn Broker>,
        authorizer: Arc<dyn SubscriptionAuthorizer>,
        presenter: Arc<dyn NotificationPresenter>,
        settings: &BrokerSettings,
    ) -> Self {
        Self {
            broker,
            authorizer,
            presenter,
            public_channel: settings.public_channel.clone(),
            private_prefix: settings.private_channel_prefix.clone(),
            state: Mutex::new(ManagerState::default()),
        }
    }

    /// Name of the private channel for `user_id`, including the broker's
    /// private marker.
    #[must_use]
    pub fn private_channel_name(&self, user_id: &UserId) -> String {
        format!("{PRIVATE_CHANNEL_MARKER}{}{user_id}", self.private_prefix)
    }

    /// Connect and subscribe to the public and per-user channels.
    ///
    /// A denied subscription is recorded as [`AuthorizationState::Denied`]
    /// and not retried; the other subscription still proceeds. Calling
    /// `open` while a connection exists is a no-op. A [`ChannelManager::close`]
    /// arriving while the connection is still being established wins: the
    /// late connection is disconnected instead of stored.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connection`] when the broker connection itself
    /// cannot be established.
    pub async fn open(&self, user_id: &UserId) -> Result<(), BrokerError> {
        let epoch = {
            let state = self.lock();
            if state.connection.is_some() {
                log::debug!("Channels already open, ignoring open()");
                return Ok(());
            }
            state.epoch
        };

        let sink: Arc<dyn EventSink> = Arc::new(PresenterSink {
            presenter: Arc::clone(&self.presenter),
        });
        let connection = self
            .broker
            .connect(Arc::clone(&self.authorizer), sink)
            .await?;
        log::info!(
            "Broker connected with socket id {}",
            connection.socket_id()
        );

        let mut subscriptions = Vec::with_capacity(2);
        for channel in [
            self.public_channel.clone(),
            self.private_channel_name(user_id),
        ] {
            let mut subscription = ChannelSubscription::pending(&channel);
            match connection.subscribe(&channel).await {
                Ok(()) => {
                    log::info!("Subscribed to {channel}");
                    subscription.state = AuthorizationState::Authorized;
                }
                Err(err) => {
                    log::warn!("Subscription to {channel} failed: {err}");
                    subscription.state = AuthorizationState::Denied;
                }
            }
            subscriptions.push(subscription);
        }

        {
            let mut state = self.lock();
            if !(state.epoch != epoch || state.connection.is_some()) {
                state.connection = Some(connection);
                state.subscriptions = subscriptions;
                return Ok(());
            }
        }
        log::info!("Channels were closed while opening, discarding connection");
        connection.disconnect().await;
        Ok(())
    }

    /// Tear down the subscriptions and the connection. Safe to call when
    /// `open` never completed; idempotent. Also cancels an `open` still
    /// waiting on its connection.
    pub async fn close(&self) {
        let connection = {
            let mut state = self.lock();
            state.epoch += 1;
            state.subscriptions.clear();
            state.connection.take()
        };
        if let Some(connection) = connection {
            connection.disconnect().await;
            log::info!("Broker connection closed");
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock().connection.is_some()
    }

    /// Snapshot of the current subscriptions and their authorization states.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<ChannelSubscription> {
        self.lock().subscriptions.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Forwards notification events to the presenter's two sinks. Anything that
/// is not a notification event, or does not parse as one, is dropped with a
/// log line - presenter concerns never feed back into the channel layer.
struct PresenterSink {
    presenter: Arc<dyn NotificationPresenter>,
}

impl EventSink for PresenterSink {
    fn deliver(&self, channel: &str, event: &str, payload: &serde_json::Value) {
        // Broker clients commonly prefix non-namespaced events with '.'.
        let event = event.trim_start_matches('.');
        if event != PUBLIC_NOTIFICATION_EVENT && event != PRIVATE_NOTIFICATION_EVENT {
            log::debug!("Ignoring event {event} on {channel}");
            return;
        }
        let envelope: NotificationEnvelope = match serde_json::from_value(payload.clone()) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("Malformed notification on {channel}: {err}");
                return;
            }
        };
        let Some(notification) = envelope.notification else {
            log::debug!("Event {event} on {channel} carried no notification");
            return;
        };
        self.presenter.append(&notification);
        self.presenter.notify(&notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingPresenter;
    use serde_json::json;

    fn sink(presenter: &Arc<RecordingPresenter>) -> PresenterSink {
        PresenterSink {
            presenter: Arc::clone(presenter) as Arc<dyn NotificationPresenter>,
        }
    }

    #[test]
    fn notification_events_reach_both_sinks() {
        let presenter = Arc::new(RecordingPresenter::new());
        let sink = sink(&presenter);

        sink.deliver(
            "global.notifications",
            PUBLIC_NOTIFICATION_EVENT,
            &json!({"notification": {"title": "Hello"}}),
        );

        assert_eq!(presenter.appended().len(), 1);
        assert_eq!(presenter.notified().len(), 1);
        assert_eq!(presenter.appended()[0].title.as_deref(), Some("Hello"));
    }

    #[test]
    fn dot_prefixed_event_names_are_accepted() {
        let presenter = Arc::new(RecordingPresenter::new());
        let sink = sink(&presenter);

        sink.deliver(
            "private-user.42",
            ".PrivateNotificationEvent",
            &json!({"notification": {"body": "direct"}}),
        );
        assert_eq!(presenter.appended().len(), 1);
    }

    #[test]
    fn unrelated_events_are_dropped() {
        let presenter = Arc::new(RecordingPresenter::new());
        let sink = sink(&presenter);

        sink.deliver("global.notifications", "SomethingElse", &json!({}));
        sink.deliver(
            "global.notifications",
            PUBLIC_NOTIFICATION_EVENT,
            &json!({}),
        );
        assert!(presenter.appended().is_empty());
        assert!(presenter.notified().is_empty());
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque user identifier as returned by the `otp` and `api/v1/user` endpoints.
///
/// The server may encode the id as a JSON number or string; either form is
/// accepted and normalized to its string rendering, which is what channel
/// names are built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    /// Extract a user id from a JSON value, accepting numbers and non-empty
    /// strings. Anything else means "no user".
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self(n.to_string())),
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The current authenticated identity.
///
/// Established by a successful second login step or the startup "who am I"
/// probe, cleared by logout or any authentication failure. Owned exclusively
/// by the auth flow controller; the CSRF token itself lives in the cookie jar
/// and is re-read before every use rather than cached here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
}

/// The mutually exclusive phases of the login form. Exactly one is active at
/// any time; transitions are driven only by [`crate::auth::AuthFlow`].
///
/// Not persisted across reloads - recomputed from the session probe on every
/// startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPhase {
    AwaitingCredentials,
    AwaitingOtp,
    Authenticated,
}

impl fmt::Display for LoginPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingCredentials => "awaiting-credentials",
            Self::AwaitingOtp => "awaiting-otp",
            Self::Authenticated => "authenticated",
        };
        f.write_str(name)
    }
}

/// Authorization progress of a single channel subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationState {
    Pending,
    Authorized,
    Denied,
}

/// An open (or attempted) subscription to a broker channel.
///
/// Created once the session's user id is known, destroyed when the session is
/// cleared. Owned by [`crate::realtime::ChannelManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSubscription {
    pub channel_name: String,
    pub state: AuthorizationState,
}

impl ChannelSubscription {
    #[must_use]
    pub fn pending(channel_name: impl Into<String>) -> Self {
        Self {
            channel_name: channel_name.into(),
            state: AuthorizationState::Pending,
        }
    }
}

/// An inbound notification. Transient - consumed immediately by the
/// presenter, never stored by the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationEvent {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Placeholder shown when a notification arrives without a title or body.
pub const NOTIFICATION_PLACEHOLDER: &str = "-";

impl NotificationEvent {
    #[must_use]
    pub fn title_or_placeholder(&self) -> &str {
        self.title.as_deref().unwrap_or(NOTIFICATION_PLACEHOLDER)
    }

    #[must_use]
    pub fn body_or_placeholder(&self) -> &str {
        self.body.as_deref().unwrap_or(NOTIFICATION_PLACEHOLDER)
    }
}

/// Wire envelope for both the public and the private notification events:
/// `{ "notification": { "title": ..., "body": ..., "icon": ... } }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    #[serde(default)]
    pub notification: Option<NotificationEvent>,
}

/// Response of the external-provider login endpoint: the URL the browser (or
/// host shell) must navigate to in order to continue at the provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedirectResponse {
    #[serde(default)]
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_id_accepts_numbers_and_strings() {
        assert_eq!(
            UserId::from_value(&json!(42)).map(|id| id.to_string()),
            Some("42".to_string())
        );
        assert_eq!(
            UserId::from_value(&json!("abc-123")).map(|id| id.to_string()),
            Some("abc-123".to_string())
        );
    }

    #[test]
    fn user_id_rejects_empty_and_non_scalar_values() {
        assert!(UserId::from_value(&json!("")).is_none());
        assert!(UserId::from_value(&json!(null)).is_none());
        assert!(UserId::from_value(&json!({"id": 1})).is_none());
        assert!(UserId::from_value(&json!([1])).is_none());
    }

    #[test]
    fn notification_event_placeholders() {
        let event = NotificationEvent::default();
        assert_eq!(event.title_or_placeholder(), "-");
        assert_eq!(event.body_or_placeholder(), "-");

        let event = NotificationEvent {
            title: Some("Order shipped".to_string()),
            body: None,
            icon: None,
        };
        assert_eq!(event.title_or_placeholder(), "Order shipped");
        assert_eq!(event.body_or_placeholder(), "-");
    }

    #[test]
    fn envelope_tolerates_missing_notification() {
        let envelope: NotificationEnvelope = serde_json::from_value(json!({})).unwrap();
        assert!(envelope.notification.is_none());

        let envelope: NotificationEnvelope = serde_json::from_value(json!({
            "notification": {"title": "Hi", "icon": "https://cdn.example/icon.png"}
        }))
        .unwrap();
        let event = envelope.notification.unwrap();
        assert_eq!(event.title.as_deref(), Some("Hi"));
        assert_eq!(event.icon.as_deref(), Some("https://cdn.example/icon.png"));
        assert!(event.body.is_none());
    }
}

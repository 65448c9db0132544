//! Notification rendering boundary
//!
//! The core never renders anything itself; it hands every inbound event to a
//! [`NotificationPresenter`]. Two independent sinks exist: an in-page feed
//! (ordered, most-recent-last, kept for the whole session) and a native OS
//! notification that only fires once permission has been granted. Both sinks
//! are fire-and-forget; nothing a presenter does can fail a flow.

use crate::models::NotificationEvent;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Rendering collaborator for inbound notifications.
pub trait NotificationPresenter: Send + Sync {
    /// Append the event to the in-page feed.
    fn append(&self, event: &NotificationEvent);

    /// Raise a native OS notification for the event. Implementations must
    /// stay silent while permission has not been granted.
    fn notify(&self, event: &NotificationEvent);

    /// Ask the user for native notification permission. Called once, at the
    /// moment the user becomes authenticated - not at page load.
    fn request_permission(&self);
}

/// One rendered feed line.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub received_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
}

/// Reference presenter: keeps the session feed in memory and routes the
/// native sink through the logger. Hosts with a real rendering surface supply
/// their own [`NotificationPresenter`] instead.
#[derive(Debug, Default)]
pub struct FeedPresenter {
    entries: Mutex<Vec<FeedEntry>>,
    permission_granted: AtomicBool,
}

impl FeedPresenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the feed so far, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<FeedEntry> {
        self.lock().clone()
    }

    #[must_use]
    pub fn permission_granted(&self) -> bool {
        self.permission_granted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<FeedEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NotificationPresenter for FeedPresenter {
    fn append(&self, event: &NotificationEvent) {
        let entry = FeedEntry {
            received_at: Utc::now(),
            title: event.title_or_placeholder().to_string(),
            body: event.body_or_placeholder().to_string(),
            icon: event.icon.clone(),
        };
        log::info!("Notification: {} - {}", entry.title, entry.body);
        self.lock().push(entry);
    }

    fn notify(&self, event: &NotificationEvent) {
        if !self.permission_granted() {
            log::debug!("Native notification suppressed, no permission granted");
            return;
        }
        log::info!(
            "Native notification: {} - {}",
            event.title_or_placeholder(),
            event.body_or_placeholder()
        );
    }

    fn request_permission(&self) {
        // The reference implementation has no OS prompt to show; treat the
        // request itself as a grant.
        self.permission_granted.store(true, Ordering::Relaxed);
        log::debug!("Notification permission granted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(title: &str) -> NotificationEvent {
        NotificationEvent {
            title: Some(title.to_string()),
            body: Some(format!("{title} body")),
            icon: None,
        }
    }

    #[test]
    fn feed_keeps_events_most_recent_last() {
        let presenter = FeedPresenter::new();
        presenter.append(&event("first"));
        presenter.append(&event("second"));
        presenter.append(&event("third"));

        let titles: Vec<String> = presenter
            .entries()
            .into_iter()
            .map(|entry| entry.title)
            .collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[test]
    fn missing_fields_render_placeholders() {
        let presenter = FeedPresenter::new();
        presenter.append(&NotificationEvent::default());

        let entries = presenter.entries();
        assert_eq!(entries[0].title, "-");
        assert_eq!(entries[0].body, "-");
    }

    #[test]
    fn permission_starts_denied_until_requested() {
        let presenter = FeedPresenter::new();
        assert!(!presenter.permission_granted());
        presenter.request_permission();
        assert!(presenter.permission_granted());
    }
}

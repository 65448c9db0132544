//! Mock objects and fake implementations for testing
//!
//! Scripted doubles for the three external boundaries: the REST API, the
//! realtime broker, and the two rendering collaborators. The API double
//! records every call in order so tests can assert CSRF priming happens
//! immediately before each state-changing call.

use crate::api::{endpoints, ApiError, SessionApi};
use crate::models::{LoginPhase, NotificationEvent, UserId};
use crate::presenter::NotificationPresenter;
use crate::realtime::broker::{
    Broker, BrokerConnection, BrokerError, ChannelAuthorization, EventSink,
    SubscriptionAuthorizer, PRIVATE_CHANNEL_MARKER,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted [`SessionApi`] double.
///
/// Responses are keyed by `"METHOD path"`. Unscripted calls succeed with a
/// null body, which matches the endpoints whose responses the widget ignores.
#[derive(Default)]
pub struct MockApi {
    calls: Mutex<Vec<String>>,
    responses: Mutex<HashMap<String, Value>>,
    failures: Mutex<HashSet<String>>,
    csrf: Mutex<Option<String>>,
    rotate_csrf: AtomicBool,
    primes: AtomicUsize,
    auth_requests: Mutex<Vec<(String, Value)>>,
}

impl MockApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful JSON response for `METHOD path`.
    #[must_use]
    pub fn respond(self, method: &str, path: &str, body: Value) -> Self {
        lock(&self.responses).insert(format!("{method} {path}"), body);
        self
    }

    /// Script a rejected (HTTP 422) response for `METHOD path`.
    #[must_use]
    pub fn fail(self, method: &str, path: &str) -> Self {
        lock(&self.failures).insert(format!("{method} {path}"));
        self
    }

    /// Seed the CSRF cookie the double reports.
    #[must_use]
    pub fn with_csrf(self, token: &str) -> Self {
        *lock(&self.csrf) = Some(token.to_string());
        self
    }

    /// Issue a new token on every priming call, the way a single-use-token
    /// server behaves. Tokens are `token-1`, `token-2`, ...
    #[must_use]
    pub fn with_rotating_csrf(self) -> Self {
        self.rotate_csrf.store(true, Ordering::Relaxed);
        self
    }

    /// Every call so far, in order, as `"METHOD path"`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// How many times a given `"METHOD path"` was called.
    #[must_use]
    pub fn count(&self, call: &str) -> usize {
        lock(&self.calls).iter().filter(|c| *c == call).count()
    }

    /// The `(token, body)` pairs of every authorization POST.
    #[must_use]
    pub fn auth_requests(&self) -> Vec<(String, Value)> {
        lock(&self.auth_requests).clone()
    }

    fn record(&self, method: &str, path: &str) -> Result<Value, ApiError> {
        let key = format!("{method} {path}");
        lock(&self.calls).push(key.clone());

        if method == "GET" && path == endpoints::CSRF_COOKIE {
            let n = self.primes.fetch_add(1, Ordering::Relaxed) + 1;
            if self.rotate_csrf.load(Ordering::Relaxed) {
                *lock(&self.csrf) = Some(format!("token-{n}"));
            }
        }

        if lock(&self.failures).contains(&key) {
            return Err(ApiError::Rejected {
                status: reqwest::StatusCode::UNPROCESSABLE_ENTITY,
                body: String::new(),
            });
        }
        Ok(lock(&self.responses)
            .get(&key)
            .cloned()
            .unwrap_or(Value::Null))
    }
}

#[async_trait]
impl SessionApi for MockApi {
    async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.record("GET", path)
    }

    async fn post(&self, path: &str, _body: &Value) -> Result<Value, ApiError> {
        self.record("POST", path)
    }

    async fn post_with_csrf(
        &self,
        path: &str,
        body: &Value,
        csrf_token: &str,
        _referer: Option<&str>,
    ) -> Result<Value, ApiError> {
        lock(&self.auth_requests).push((csrf_token.to_string(), body.clone()));
        self.record("POST", path)
    }

    fn csrf_token(&self) -> Option<String> {
        lock(&self.csrf).clone()
    }
}

/// Shared observable state of a [`MockBroker`] and its connection.
#[derive(Default)]
pub struct MockBrokerState {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    subscriptions: Mutex<Vec<String>>,
    auth_payloads: Mutex<Vec<Value>>,
    denials: Mutex<Vec<String>>,
    sink: Mutex<Option<Arc<dyn EventSink>>>,
}

impl MockBrokerState {
    /// Channels that reached a subscribed state, in order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.subscriptions).clone()
    }

    /// Authorization payloads the broker was handed for private channels.
    #[must_use]
    pub fn auth_payloads(&self) -> Vec<Value> {
        lock(&self.auth_payloads).clone()
    }

    /// Channels whose authorization was denied.
    #[must_use]
    pub fn denials(&self) -> Vec<String> {
        lock(&self.denials).clone()
    }
}

/// Fake broker. Private channels run the real authorizer handed over at
/// connect time; public channels subscribe directly, mirroring the broker
/// protocol.
pub struct MockBroker {
    pub socket_id: String,
    pub state: Arc<MockBrokerState>,
    fail_connect: AtomicBool,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new("12345.67890")
    }
}

impl MockBroker {
    #[must_use]
    pub fn new(socket_id: &str) -> Self {
        Self {
            socket_id: socket_id.to_string(),
            state: Arc::new(MockBrokerState::default()),
            fail_connect: AtomicBool::new(false),
        }
    }

    /// Make the next `connect` fail at the transport level.
    pub fn refuse_connections(&self) {
        self.fail_connect.store(true, Ordering::Relaxed);
    }

    /// Deliver an event to the sink registered at connect time, as if it
    /// arrived on the wire.
    ///
    /// # Panics
    ///
    /// Panics when no connection was established.
    pub fn emit(&self, channel: &str, event: &str, payload: &Value) {
        let sink = lock(&self.state.sink)
            .clone()
            .expect("emit before connect");
        sink.deliver(channel, event, payload);
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn connect(
        &self,
        authorizer: Arc<dyn SubscriptionAuthorizer>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        if self.fail_connect.load(Ordering::Relaxed) {
            return Err(BrokerError::Connection("connection refused".to_string()));
        }
        self.state.connects.fetch_add(1, Ordering::Relaxed);
        *lock(&self.state.sink) = Some(sink);
        Ok(Box::new(MockConnection {
            socket_id: self.socket_id.clone(),
            state: Arc::clone(&self.state),
            authorizer,
        }))
    }
}

struct MockConnection {
    socket_id: String,
    state: Arc<MockBrokerState>,
    authorizer: Arc<dyn SubscriptionAuthorizer>,
}

#[async_trait]
impl BrokerConnection for MockConnection {
    fn socket_id(&self) -> String {
        self.socket_id.clone()
    }

    async fn subscribe(&self, channel: &str) -> Result<(), BrokerError> {
        if channel.starts_with(PRIVATE_CHANNEL_MARKER) {
            match self.authorizer.authorize(&self.socket_id, channel).await {
                ChannelAuthorization::Granted(payload) => {
                    lock(&self.state.auth_payloads).push(payload);
                }
                ChannelAuthorization::Denied(reason) => {
                    lock(&self.state.denials).push(channel.to_string());
                    return Err(BrokerError::Denied(reason));
                }
            }
        }
        lock(&self.state.subscriptions).push(channel.to_string());
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.disconnects.fetch_add(1, Ordering::Relaxed);
    }
}

/// Records everything the controller tells the login view.
#[derive(Default)]
pub struct RecordingView {
    phases: Mutex<Vec<LoginPhase>>,
    errors: Mutex<Vec<String>>,
    users: Mutex<Vec<String>>,
    navigations: Mutex<Vec<String>>,
}

impl RecordingView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phases(&self) -> Vec<LoginPhase> {
        lock(&self.phases).clone()
    }

    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }

    #[must_use]
    pub fn users(&self) -> Vec<String> {
        lock(&self.users).clone()
    }

    #[must_use]
    pub fn navigations(&self) -> Vec<String> {
        lock(&self.navigations).clone()
    }
}

impl crate::auth::LoginView for RecordingView {
    fn show_phase(&self, phase: LoginPhase) {
        lock(&self.phases).push(phase);
    }

    fn show_error(&self, message: &str) {
        lock(&self.errors).push(message.to_string());
    }

    fn show_user(&self, user_id: &UserId) {
        lock(&self.users).push(user_id.to_string());
    }

    fn navigate(&self, url: &str) {
        lock(&self.navigations).push(url.to_string());
    }
}

/// Records events and permission requests reaching the presenter.
#[derive(Default)]
pub struct RecordingPresenter {
    appended: Mutex<Vec<NotificationEvent>>,
    notified: Mutex<Vec<NotificationEvent>>,
    permission_requests: AtomicUsize,
}

impl RecordingPresenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn appended(&self) -> Vec<NotificationEvent> {
        lock(&self.appended).clone()
    }

    #[must_use]
    pub fn notified(&self) -> Vec<NotificationEvent> {
        lock(&self.notified).clone()
    }

    #[must_use]
    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::Relaxed)
    }
}

impl NotificationPresenter for RecordingPresenter {
    fn append(&self, event: &NotificationEvent) {
        lock(&self.appended).push(event.clone());
    }

    fn notify(&self, event: &NotificationEvent) {
        lock(&self.notified).push(event.clone());
    }

    fn request_permission(&self) {
        self.permission_requests.fetch_add(1, Ordering::Relaxed);
    }
}

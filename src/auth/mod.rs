//! Login/session flow controller
//!
//! Owns the three-phase login state machine and the session. Every entry
//! point is a command dispatched by the host (form submit, button click, page
//! load); each one primes the CSRF cookie immediately before its
//! state-changing call, reports failures inline through the view, and
//! returns the form to its previous valid phase. Duplicate submissions of
//! the same control are dropped by a per-control busy flag while a call is in
//! flight.

pub mod view;

pub use view::LoginView;

use crate::api::{endpoints, ApiError, SessionApi};
use crate::models::{LoginPhase, RedirectResponse, Session, UserId};
use crate::presenter::NotificationPresenter;
use crate::realtime::ChannelManager;
use crate::settings::ApplicationSettings;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The controls a user can trigger. Each has its own busy flag so that, for
/// example, logout stays clickable while a login call is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Credentials,
    Otp,
    Logout,
    OAuth,
}

struct FlowState {
    phase: LoginPhase,
    session: Option<Session>,
    busy_credentials: bool,
    busy_otp: bool,
    busy_logout: bool,
    busy_oauth: bool,
}

impl FlowState {
    fn flag(&mut self, control: Control) -> &mut bool {
        match control {
            Control::Credentials => &mut self.busy_credentials,
            Control::Otp => &mut self.busy_otp,
            Control::Logout => &mut self.busy_logout,
            Control::OAuth => &mut self.busy_oauth,
        }
    }
}

/// Clears the busy flag of its control when the flow finishes, however it
/// finishes.
struct BusyGuard<'a> {
    state: &'a Mutex<FlowState>,
    control: Control,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        *state.flag(self.control) = false;
    }
}

fn lock(state: &Mutex<FlowState>) -> MutexGuard<'_, FlowState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The auth flow controller. See the module docs for the contract.
pub struct AuthFlow {
    api: Arc<dyn SessionApi>,
    view: Arc<dyn LoginView>,
    presenter: Arc<dyn NotificationPresenter>,
    channels: Arc<ChannelManager>,
    oauth_callback_path: String,
    state: Mutex<FlowState>,
}

impl AuthFlow {
    #[must_use]
    pub fn new(
        api: Arc<dyn SessionApi>,
        view: Arc<dyn LoginView>,
        presenter: Arc<dyn NotificationPresenter>,
        channels: Arc<ChannelManager>,
        settings: &ApplicationSettings,
    ) -> Self {
        Self {
            api,
            view,
            presenter,
            channels,
            oauth_callback_path: settings.oauth_callback_path.clone(),
            state: Mutex::new(FlowState {
                phase: LoginPhase::AwaitingCredentials,
                session: None,
                busy_credentials: false,
                busy_otp: false,
                busy_logout: false,
                busy_oauth: false,
            }),
        }
    }

    /// The currently active form phase.
    #[must_use]
    pub fn phase(&self) -> LoginPhase {
        lock(&self.state).phase
    }

    /// The authenticated user, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        lock(&self.state)
            .session
            .as_ref()
            .map(|session| session.user_id.clone())
    }

    /// Page-load entry point. Completes a pending provider handshake when
    /// the landing path matches the configured callback path, then probes the
    /// server for an existing session. Probe failures mean "no session" and
    /// are never fatal.
    pub async fn startup(&self, path: &str, query: &str) {
        if path == self.oauth_callback_path {
            if let Err(err) = self.complete_oauth_callback(query).await {
                log::warn!("OAuth callback completion failed: {err}");
            }
        }

        match self.probe_user().await {
            Some(user_id) => {
                log::info!("Existing session for user {user_id}");
                self.establish_session(user_id).await;
            }
            None => {
                log::debug!("No existing session");
                self.transition(LoginPhase::AwaitingCredentials);
            }
        }
    }

    /// Step 1: submit credentials. On success the form advances to the
    /// one-time-code step; on failure it stays where it is and the error is
    /// shown inline.
    pub async fn submit_credentials(&self, fields: Value) {
        let Some(_guard) = self.try_begin(Control::Credentials) else {
            log::debug!("Credentials submit ignored, already in flight");
            return;
        };
        if self.phase() != LoginPhase::AwaitingCredentials {
            log::debug!("Credentials submit ignored in phase {}", self.phase());
            return;
        }

        match self.prime_then_post(endpoints::LOGIN, &fields).await {
            Ok(_) => self.transition(LoginPhase::AwaitingOtp),
            Err(err) => {
                log::error!("Credential submission failed: {err}");
                self.view
                    .show_error("Login failed. Check your details and try again.");
            }
        }
    }

    /// Step 2: submit the one-time code. On success the session is
    /// established and the realtime channels open; on failure the form stays
    /// on the code step.
    pub async fn submit_otp(&self, fields: Value) {
        let Some(_guard) = self.try_begin(Control::Otp) else {
            log::debug!("Code submit ignored, already in flight");
            return;
        };
        if self.phase() != LoginPhase::AwaitingOtp {
            log::debug!("Code submit ignored in phase {}", self.phase());
            return;
        }

        match self.prime_then_post(endpoints::OTP, &fields).await {
            Ok(response) => {
                let user_id = response.get("id").and_then(UserId::from_value);
                if let Some(user_id) = user_id {
                    self.establish_session(user_id).await;
                } else {
                    log::error!("Code verification response carried no user id");
                    self.view
                        .show_error("Code verification failed. Try again.");
                }
            }
            Err(err) => {
                log::error!("Code verification failed: {err}");
                self.view
                    .show_error("Code verification failed. Try again.");
            }
        }
    }

    /// Return from the code step to the credentials step, discarding
    /// whatever was in flight.
    pub fn back(&self) {
        let mut state = lock(&self.state);
        if state.phase != LoginPhase::AwaitingOtp {
            log::debug!("Back ignored in phase {}", state.phase);
            return;
        }
        state.phase = LoginPhase::AwaitingCredentials;
        drop(state);
        self.view.show_phase(LoginPhase::AwaitingCredentials);
    }

    /// Log out. The HTTP call is best effort: whatever it returns, the
    /// channels close, the session clears, and the form returns to the
    /// credentials step.
    pub async fn logout(&self) {
        let Some(_guard) = self.try_begin(Control::Logout) else {
            log::debug!("Logout ignored, already in flight");
            return;
        };

        match self.prime_then_post(endpoints::LOGOUT, &Value::Null).await {
            Ok(_) => log::info!("Logged out"),
            Err(err) => log::warn!("Logout request failed, clearing session anyway: {err}"),
        }

        self.channels.close().await;
        let mut state = lock(&self.state);
        state.session = None;
        state.phase = LoginPhase::AwaitingCredentials;
        drop(state);
        self.view.show_phase(LoginPhase::AwaitingCredentials);
    }

    /// Start a login via the external provider. On success the host is asked
    /// to navigate to the server-provided URL; no local phase change happens.
    pub async fn oauth_login(&self) {
        let Some(_guard) = self.try_begin(Control::OAuth) else {
            log::debug!("Provider login ignored, already in flight");
            return;
        };

        match self
            .prime_then_post(endpoints::OAUTH_LOGIN, &Value::Null)
            .await
        {
            Ok(response) => {
                let redirect: RedirectResponse =
                    serde_json::from_value(response).unwrap_or_default();
                if let Some(url) = redirect.url {
                    log::info!("Navigating to provider login");
                    self.view.navigate(&url);
                } else {
                    log::warn!("Provider login response carried no redirect URL");
                }
            }
            Err(err) => {
                log::error!("Provider login failed: {err}");
                self.view
                    .show_error("Could not start the provider login. Try again.");
            }
        }
    }

    async fn complete_oauth_callback(&self, query: &str) -> Result<(), ApiError> {
        self.api.prime_csrf().await?;
        let path = format!("{}{query}", endpoints::OAUTH_CALLBACK);
        self.api.get(&path).await?;
        log::info!("OAuth callback completed");
        Ok(())
    }

    async fn probe_user(&self) -> Option<UserId> {
        self.api.prime_csrf().await.ok()?;
        let response = self.api.get(endpoints::USER_INFO).await.ok()?;
        response.get("id").and_then(UserId::from_value)
    }

    async fn establish_session(&self, user_id: UserId) {
        {
            let mut state = lock(&self.state);
            state.session = Some(Session {
                user_id: user_id.clone(),
            });
            state.phase = LoginPhase::Authenticated;
        }
        self.view.show_user(&user_id);
        self.view.show_phase(LoginPhase::Authenticated);

        // Permission is requested here, at the moment of authentication,
        // not at page load.
        self.presenter.request_permission();

        if let Err(err) = self.channels.open(&user_id).await {
            log::warn!("Could not open realtime channels: {err}");
        }
    }

    async fn prime_then_post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.api.prime_csrf().await?;
        self.api.post(path, body).await
    }

    fn transition(&self, phase: LoginPhase) {
        lock(&self.state).phase = phase;
        self.view.show_phase(phase);
    }

    fn try_begin(&self, control: Control) -> Option<BusyGuard<'_>> {
        let mut state = lock(&self.state);
        let flag = state.flag(control);
        if *flag {
            return None;
        }
        *flag = true;
        drop(state);
        Some(BusyGuard {
            state: &self.state,
            control,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_flow, MockApi, RecordingView};
    use serde_json::json;

    #[tokio::test]
    async fn busy_control_drops_duplicate_submission() {
        let harness = test_flow(MockApi::new().respond("POST", "login", json!({})));
        let flow = &harness.flow;

        // Hold the credentials control busy, as an in-flight submit would.
        let guard = flow.try_begin(Control::Credentials).unwrap();
        flow.submit_credentials(json!({"phone": "1"})).await;
        assert!(harness.api.calls().is_empty(), "busy submit must not hit the network");

        drop(guard);
        flow.submit_credentials(json!({"phone": "1"})).await;
        assert_eq!(
            harness.api.calls(),
            vec!["GET api/csrf-cookie", "POST login"]
        );
    }

    #[tokio::test]
    async fn busy_flag_clears_after_failure() {
        let harness = test_flow(MockApi::new().fail("POST", "login"));
        harness.flow.submit_credentials(json!({})).await;
        assert_eq!(harness.flow.phase(), LoginPhase::AwaitingCredentials);

        // The control must be usable again.
        assert!(harness.flow.try_begin(Control::Credentials).is_some());
    }

    #[tokio::test]
    async fn back_only_applies_on_the_code_step() {
        let harness = test_flow(MockApi::new().respond("POST", "login", json!({})));
        let flow = &harness.flow;

        flow.back();
        assert_eq!(flow.phase(), LoginPhase::AwaitingCredentials);

        flow.submit_credentials(json!({"phone": "1"})).await;
        assert_eq!(flow.phase(), LoginPhase::AwaitingOtp);

        flow.back();
        assert_eq!(flow.phase(), LoginPhase::AwaitingCredentials);
    }

    #[tokio::test]
    async fn submissions_in_the_wrong_phase_are_ignored() {
        let harness = test_flow(MockApi::new());
        harness.flow.submit_otp(json!({"code": "000000"})).await;
        assert!(harness.api.calls().is_empty());
        assert_eq!(harness.flow.phase(), LoginPhase::AwaitingCredentials);
    }

    #[tokio::test]
    async fn oauth_login_navigates_to_server_url() {
        let harness = test_flow(
            MockApi::new().respond("POST", "login/google", json!({"url": "https://provider.test/auth"})),
        );
        harness.flow.oauth_login().await;

        assert_eq!(
            harness.view.navigations(),
            vec!["https://provider.test/auth"]
        );
        assert_eq!(harness.flow.phase(), LoginPhase::AwaitingCredentials);
    }

    #[tokio::test]
    async fn oauth_login_failure_stays_put_with_error() {
        let harness = test_flow(MockApi::new().fail("POST", "login/google"));
        harness.flow.oauth_login().await;

        assert!(harness.view.navigations().is_empty());
        assert_eq!(harness.view.errors().len(), 1);
        assert_eq!(harness.flow.phase(), LoginPhase::AwaitingCredentials);
    }

    #[test]
    fn view_errors_are_recorded_in_order() {
        let view = RecordingView::new();
        view.show_error("one");
        view.show_error("two");
        assert_eq!(view.errors(), vec!["one", "two"]);
    }
}

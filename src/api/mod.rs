//! CSRF-protected HTTP session client
//!
//! Wraps the REST API behind a small object-safe trait so flows can be tested
//! against a scripted double. The client always sends browser-style
//! credentials (the shared cookie jar) and the `Accept` /
//! `X-Requested-With` markers the API expects; it never retries and never
//! sequences CSRF priming on its own - every call site primes immediately
//! before its state-changing call.

pub mod client;
pub mod cookies;

pub use client::ApiClient;
pub use cookies::SessionJar;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// REST endpoint paths, relative to the configured base URL.
pub mod endpoints {
    /// Primes the CSRF cookie; the only call that needs no prior priming.
    pub const CSRF_COOKIE: &str = "api/csrf-cookie";
    /// Step 1 of the login: credential submission.
    pub const LOGIN: &str = "login";
    /// Step 2 of the login: one-time code verification.
    pub const OTP: &str = "otp";
    /// Current-user probe.
    pub const USER_INFO: &str = "api/v1/user";
    /// Requests an external-provider login URL.
    pub const OAUTH_LOGIN: &str = "login/google";
    /// Completes the provider handshake; the callback query is appended.
    pub const OAUTH_CALLBACK: &str = "login/google/callback";
    /// Best-effort session termination.
    pub const LOGOUT: &str = "logout";
}

/// Name of the anti-forgery cookie issued by the server.
pub const CSRF_COOKIE_NAME: &str = "XSRF-TOKEN";

/// Header the decoded CSRF token is echoed back in.
pub const CSRF_HEADER: &str = "X-XSRF-TOKEN";

/// The two failure kinds the API surface produces. Both are handled the same
/// way by callers: logged and shown inline, never propagated past the
/// triggering flow.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never completed.
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("server rejected request with status {status}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
    /// A request path did not resolve against the base URL. Configuration
    /// error rather than a runtime failure; handled like a network failure.
    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Object-safe view of the REST session surface.
///
/// Implemented by [`ApiClient`] for production and by the scripted mock in
/// [`crate::testing`] for tests.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Perform a GET against `path` with credentials attached.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] when the request never completes and
    /// [`ApiError::Rejected`] on a non-2xx status.
    async fn get(&self, path: &str) -> Result<Value, ApiError>;

    /// Perform a POST of a JSON `body` against `path` with credentials
    /// attached.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`SessionApi::get`].
    async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError>;

    /// POST used by the channel authorization handshake: like
    /// [`SessionApi::post`] but with the decoded CSRF token in the
    /// `X-XSRF-TOKEN` header and an optional `Referer`.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`SessionApi::get`].
    async fn post_with_csrf(
        &self,
        path: &str,
        body: &Value,
        csrf_token: &str,
        referer: Option<&str>,
    ) -> Result<Value, ApiError>;

    /// Ask the server to issue or refresh the CSRF cookie. Must be called
    /// immediately before every state-changing request; tokens are not cached
    /// across flows.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`SessionApi::get`].
    async fn prime_csrf(&self) -> Result<(), ApiError> {
        self.get(endpoints::CSRF_COOKIE).await.map(|_| ())
    }

    /// Read the current decoded CSRF token from the cookie store, if the
    /// server has issued one.
    fn csrf_token(&self) -> Option<String>;
}

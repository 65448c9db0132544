//! In-memory cookie store shared between the HTTP client and the widget
//!
//! The browser original leaned on `document.cookie`: the server sets cookies
//! as a side effect of responses and the page reads the CSRF token back out
//! by name. [`SessionJar`] replays that arrangement for `reqwest` - it
//! implements [`reqwest::cookie::CookieStore`] so responses populate it and
//! requests carry it, while [`SessionJar::read_token`] gives the widget the
//! synchronous, decoded read the authorization handshake needs.

use reqwest::header::HeaderValue;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use url::Url;

/// Name/value cookie store. Attributes (path, expiry, flags) are ignored:
/// the widget only ever talks to its own API origin, and the server refreshes
/// the cookies it cares about on every priming call.
#[derive(Debug, Default)]
pub struct SessionJar {
    cookies: Mutex<HashMap<String, String>>,
}

impl SessionJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the URL-decoded value of the named cookie, or `None` when the
    /// cookie is absent. Pure read, no side effects.
    #[must_use]
    pub fn read_token(&self, name: &str) -> Option<String> {
        let cookies = self.lock();
        let raw = cookies.get(name)?;
        match urlencoding::decode(raw) {
            Ok(decoded) => Some(decoded.into_owned()),
            Err(err) => {
                log::warn!("Cookie {name} holds undecodable value: {err}");
                None
            }
        }
    }

    /// Store a cookie value directly. Useful for seeding tests; production
    /// values arrive through `Set-Cookie` headers.
    pub fn store(&self, name: &str, value: &str) {
        self.lock().insert(name.to_string(), value.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_set_cookie(&self, header: &str) {
        // Only the name=value pair matters; everything after ';' is attributes.
        let pair = header.split(';').next().unwrap_or_default().trim();
        let Some((name, value)) = pair.split_once('=') else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        if value.is_empty() {
            // An empty value is how the server expires a cookie.
            self.lock().remove(name);
        } else {
            self.lock().insert(name.to_string(), value.to_string());
        }
    }
}

impl reqwest::cookie::CookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, _url: &Url) {
        for header in cookie_headers {
            if let Ok(header) = header.to_str() {
                self.apply_set_cookie(header);
            }
        }
    }

    fn cookies(&self, _url: &Url) -> Option<HeaderValue> {
        let cookies = self.lock();
        if cookies.is_empty() {
            return None;
        }
        let joined = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&joined).ok()
    }
}

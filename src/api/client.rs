//! `reqwest`-backed implementation of the session API

use crate::api::{ApiError, SessionApi, CSRF_COOKIE_NAME, CSRF_HEADER};
use crate::settings::ApplicationSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, REFERER};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// HTTP client bound to the API base URL. Cookies set by the server land in
/// the shared [`SessionJar`](crate::api::SessionJar) and ride along on every
/// subsequent request, mirroring a browser's `withCredentials` behavior.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    jar: Arc<crate::api::SessionJar>,
}

impl ApiClient {
    /// Build a client for the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse or the underlying
    /// client cannot be constructed.
    pub fn new(settings: &ApplicationSettings) -> Result<Self> {
        let mut base = settings.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .with_context(|| format!("invalid base_url in settings: {base}"))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );

        let jar = Arc::new(crate::api::SessionJar::new());
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            jar,
        })
    }

    /// The cookie jar this client reads and writes.
    #[must_use]
    pub fn jar(&self) -> Arc<crate::api::SessionJar> {
        Arc::clone(&self.jar)
    }

    fn resolve(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(ApiError::from)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Value, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Rejected { status, body: text });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        // Responses we only care about as success/failure may not be JSON.
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }
}

#[async_trait]
impl SessionApi for ApiClient {
    async fn get(&self, path: &str) -> Result<Value, ApiError> {
        let url = self.resolve(path)?;
        log::debug!("GET {url}");
        self.execute(self.http.request(Method::GET, url)).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let url = self.resolve(path)?;
        log::debug!("POST {url}");
        self.execute(self.http.request(Method::POST, url).json(body))
            .await
    }

    async fn post_with_csrf(
        &self,
        path: &str,
        body: &Value,
        csrf_token: &str,
        referer: Option<&str>,
    ) -> Result<Value, ApiError> {
        let url = self.resolve(path)?;
        log::debug!("POST {url} (with CSRF header)");
        let mut request = self
            .http
            .request(Method::POST, url)
            .header(CSRF_HEADER, csrf_token)
            .json(body);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        self.execute(request).await
    }

    fn csrf_token(&self) -> Option<String> {
        self.jar.read_token(CSRF_COOKIE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::LoginfeedSettings;

    fn client() -> ApiClient {
        let settings = LoginfeedSettings::default();
        ApiClient::new(&settings.application).unwrap()
    }

    #[test]
    fn resolve_joins_relative_and_absolute_paths_alike() {
        let client = client();
        assert_eq!(
            client.resolve("api/csrf-cookie").unwrap().as_str(),
            "http://127.0.0.1:8001/api/csrf-cookie"
        );
        assert_eq!(
            client.resolve("/login/google").unwrap().as_str(),
            "http://127.0.0.1:8001/login/google"
        );
    }

    #[test]
    fn resolve_keeps_callback_query() {
        let client = client();
        let url = client
            .resolve("login/google/callback?code=abc&state=xyz")
            .unwrap();
        assert_eq!(url.query(), Some("code=abc&state=xyz"));
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let settings = ApplicationSettings {
            base_url: "https://api.example.test".to_string(),
            oauth_callback_path: "/oauth/google/callback".to_string(),
        };
        let client = ApiClient::new(&settings).unwrap();
        assert_eq!(
            client.resolve("login").unwrap().as_str(),
            "https://api.example.test/login"
        );
    }

    #[test]
    fn csrf_token_reads_the_jar() {
        let client = client();
        assert!(client.csrf_token().is_none());
        client.jar().store("XSRF-TOKEN", "abc%3Ddef");
        assert_eq!(client.csrf_token().as_deref(), Some("abc=def"));
    }
}

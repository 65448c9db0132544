//! Private-channel authorization handshake
//!
//! One handshake per subscription attempt: prime the CSRF cookie, read the
//! freshly issued token back out of the jar, then POST the socket and channel
//! to the authorization endpoint with the decoded token in `X-XSRF-TOKEN`.
//! The response payload goes back to the broker untouched. Failures become
//! [`ChannelAuthorization::Denied`] - never an error the flow has to catch,
//! and never a retry.

use crate::api::SessionApi;
use crate::realtime::broker::{ChannelAuthorization, SubscriptionAuthorizer};
use crate::settings::BrokerSettings;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct ChannelAuthorizer {
    api: Arc<dyn SessionApi>,
    auth_path: String,
    referer: Option<String>,
}

impl ChannelAuthorizer {
    #[must_use]
    pub fn new(api: Arc<dyn SessionApi>, settings: &BrokerSettings) -> Self {
        Self {
            api,
            auth_path: settings.auth_path.clone(),
            referer: settings.auth_referer.clone(),
        }
    }
}

#[async_trait]
impl SubscriptionAuthorizer for ChannelAuthorizer {
    async fn authorize(&self, socket_id: &str, channel_name: &str) -> ChannelAuthorization {
        // Fresh token every attempt; the broker may re-authorize at any time.
        if let Err(err) = self.api.prime_csrf().await {
            log::warn!("CSRF priming failed before authorizing {channel_name}: {err}");
            return ChannelAuthorization::Denied(err.to_string());
        }

        let token = self.api.csrf_token().unwrap_or_default();
        if token.is_empty() {
            log::warn!("No CSRF cookie present while authorizing {channel_name}");
        }

        let body = json!({
            "socket_id": socket_id,
            "channel_name": channel_name,
        });
        match self
            .api
            .post_with_csrf(&self.auth_path, &body, &token, self.referer.as_deref())
            .await
        {
            Ok(payload) => {
                log::debug!("Authorized subscription to {channel_name}");
                ChannelAuthorization::Granted(payload)
            }
            Err(err) => {
                log::warn!("Authorization denied for {channel_name}: {err}");
                ChannelAuthorization::Denied(err.to_string())
            }
        }
    }
}

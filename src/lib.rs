#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the loginfeed library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod api;
pub mod auth;
pub mod models;
pub mod presenter;
pub mod realtime;
pub mod settings;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use api::{ApiClient, ApiError, SessionApi, SessionJar};
pub use auth::{AuthFlow, LoginView};
pub use models::{LoginPhase, NotificationEvent, Session, UserId};
pub use presenter::{FeedPresenter, NotificationPresenter};
pub use realtime::{Broker, ChannelAuthorizer, ChannelManager};
pub use settings::LoginfeedSettings;

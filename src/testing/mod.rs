//! Testing utilities for loginfeed
//!
//! Scripted doubles for every external boundary plus a wiring helper that
//! assembles a complete flow around them. Gated behind the `testing` feature
//! (and `cfg(test)`) so integration tests can share the same doubles as unit
//! tests.

pub mod mock;

pub use mock::{MockApi, MockBroker, MockBrokerState, RecordingPresenter, RecordingView};

use crate::auth::AuthFlow;
use crate::realtime::{ChannelAuthorizer, ChannelManager};
use crate::settings::LoginfeedSettings;
use std::sync::Arc;

/// A fully wired flow over mocks, with handles to every double.
pub struct TestHarness {
    pub api: Arc<MockApi>,
    pub view: Arc<RecordingView>,
    pub presenter: Arc<RecordingPresenter>,
    pub broker: Arc<MockBroker>,
    pub channels: Arc<ChannelManager>,
    pub flow: AuthFlow,
}

/// Wire an [`AuthFlow`] around the given API double, a default mock broker,
/// and recording view/presenter doubles, using default settings.
#[must_use]
pub fn test_flow(api: MockApi) -> TestHarness {
    test_flow_with_broker(api, MockBroker::default())
}

/// Like [`test_flow`] but with a caller-configured broker double.
#[must_use]
pub fn test_flow_with_broker(api: MockApi, broker: MockBroker) -> TestHarness {
    let settings = LoginfeedSettings::default();
    let api = Arc::new(api);
    let view = Arc::new(RecordingView::new());
    let presenter = Arc::new(RecordingPresenter::new());
    let broker = Arc::new(broker);

    let api_dyn: Arc<dyn crate::api::SessionApi> = api.clone();
    let broker_dyn: Arc<dyn crate::realtime::Broker> = broker.clone();
    let view_dyn: Arc<dyn crate::auth::LoginView> = view.clone();
    let presenter_dyn: Arc<dyn crate::presenter::NotificationPresenter> = presenter.clone();

    let authorizer = Arc::new(ChannelAuthorizer::new(Arc::clone(&api_dyn), &settings.broker));
    let channels = Arc::new(ChannelManager::new(
        broker_dyn,
        authorizer,
        Arc::clone(&presenter_dyn),
        &settings.broker,
    ));
    let flow = AuthFlow::new(
        api_dyn,
        view_dyn,
        presenter_dyn,
        Arc::clone(&channels),
        &settings.application,
    );

    TestHarness {
        api,
        view,
        presenter,
        broker,
        channels,
        flow,
    }
}

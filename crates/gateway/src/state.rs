use std::sync::Arc;

use envoy_domain::config::Config;
use envoy_providers::LlmProvider;
use envoy_sandbox::Executor;
use envoy_store::Store;

use crate::bus::EventBus;
use crate::runtime::scheduler::Scheduler;

/// Shared application state passed to all API handlers and the runtime.
///
/// Tests substitute the store and provider here — the components below
/// only ever see the trait object / handle, never a concrete global.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub llm: Arc<dyn LlmProvider>,
    pub bus: Arc<EventBus>,
    pub sandbox: Arc<Executor>,
    pub scheduler: Arc<Scheduler>,
}

use std::sync::Arc;

use crate::broker::Broker;
use crate::relay::registry::SessionRegistry;
use crate::relay::RelayOptions;

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<dyn Broker>,
    pub options: Arc<RelayOptions>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(broker: Arc<dyn Broker>, options: RelayOptions) -> Self {
        Self {
            broker,
            options: Arc::new(options),
            sessions: Arc::new(SessionRegistry::new()),
        }
    }
}

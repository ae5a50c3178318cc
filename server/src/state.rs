use std::sync::Arc;

use crate::{auth::authenticator::Authenticator, config::Config, db::broker::ConnectionBroker};

#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<Authenticator>,
    pub broker: Arc<ConnectionBroker>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        authenticator: Arc<Authenticator>,
        broker: Arc<ConnectionBroker>,
        config: Config,
    ) -> Self {
        Self {
            authenticator,
            broker,
            config,
        }
    }
}

use crate::config::settings::AppConfig;
use crate::modules::resize::dispatcher::JobDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub dispatcher: JobDispatcher,
}

impl AppState {
    pub fn new(config: AppConfig, dispatcher: JobDispatcher) -> Self {
        Self { config, dispatcher }
    }
}

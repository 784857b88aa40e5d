use config::Config;
use log::info;
use sse::{Options, ServerSentEvents};
use std::sync::Arc;

pub mod config;
pub mod logging;

/// Builds the stream adapter described by `config`, backed by the in-memory broker.
pub fn init_events(config: &Config) -> ServerSentEvents {
    info!(
        "SSE config: keep_alive={}",
        config
            .keep_alive()
            .map(|period| format!("{}s", period.as_secs()))
            .unwrap_or_else(|| "disabled".to_string()),
    );

    ServerSentEvents::with_options(Options {
        broker: None,
        keep_alive: config.keep_alive(),
    })
}

// Service-level state shared by every request handler
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub events: Arc<ServerSentEvents>,
    pub config: Config,
}

impl AppState {
    pub fn new(app_config: Config, events: &Arc<ServerSentEvents>) -> Self {
        Self {
            events: Arc::clone(events),
            config: app_config,
        }
    }

    pub fn events(&self) -> &ServerSentEvents {
        self.events.as_ref()
    }
}

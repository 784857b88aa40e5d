use log::*;
use service::{config::Config, logging::Logger, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
        std::process::exit(1);
    }

    info!(
        "Starting SSE broadcaster [{}] v{}",
        config.runtime_env(),
        env!("CARGO_PKG_VERSION")
    );

    let events = Arc::new(service::init_events(&config));
    let app_state = AppState::new(config, &events);

    if let Err(e) = web::init_server(app_state).await {
        error!("Server exited with error: {e}");
        std::process::exit(1);
    }
}

use log::*;
use tokio::net::TcpListener;

pub use error::{Error, Result};
pub use service::AppState;

mod controller;
pub mod error;
mod params;
pub mod router;
mod sse;

/// Binds the configured interface and port and serves until the process exits.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let interface = app_state.config.interface().to_string();
    let port = app_state.config.port;

    let listener = TcpListener::bind((interface.as_str(), port)).await?;

    info!(
        "Server starting... listening for connections on http://{}",
        listener.local_addr()?
    );

    axum::serve(listener, router::define_routes(app_state)).await
}

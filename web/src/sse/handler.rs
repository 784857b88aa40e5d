use axum::extract::{Path, State};
use log::*;
use service::AppState;
use sse::EventStream;

/// SSE handler that establishes a long-lived connection for one channel.
/// The subscription is released when the client disconnects and the body is dropped.
pub(crate) async fn sse_handler(
    State(app_state): State<AppState>,
    Path(channel): Path<String>,
) -> EventStream {
    debug!("Establishing SSE connection on channel {:?}", channel);

    app_state.events().open_stream(channel)
}

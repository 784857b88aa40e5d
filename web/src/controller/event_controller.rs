use crate::controller::ApiResponse;
use crate::params::event::PublishParams;
use crate::{AppState, Error};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::*;
use sse::frame::validate_event_name;

/// POST publish an event to every stream open on a channel
///
/// Responds once every subscriber has been handed the event, reporting how many
/// accepted it.
pub async fn publish(
    State(app_state): State<AppState>,
    Path(channel): Path<String>,
    Json(params): Json<PublishParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST publish {:?} to channel {:?}", params.event, channel);

    validate_event_name(&params.event)?;

    let delivery = app_state
        .events()
        .publish(&channel, &params.event, &params.data);

    debug!(
        "Published {:?} on channel {:?}: {} delivered, {} failed",
        params.event, channel, delivery.delivered, delivery.failed
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(StatusCode::ACCEPTED.into(), delivery)),
    ))
}

//! Notification stream endpoint.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::auth::Actor;
use crate::AppState;

/// GET /api/notifications/stream - Server-sent events addressed to the caller.
pub async fn notification_stream(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.notifications.subscribe(&actor.user_id);
    let user_id = actor.user_id;

    tracing::debug!(user_id = %user_id, "notification stream opened");

    let stream = async_stream::stream! {
        let mut updates = BroadcastStream::new(receiver);

        while let Some(result) = updates.next().await {
            match result {
                Ok(notification) => match serde_json::to_string(&notification) {
                    Ok(json) => {
                        yield Ok::<_, Infallible>(Event::default().event("notification").data(json));
                    }
                    Err(e) => {
                        tracing::warn!("Failed to serialize notification: {}", e);
                    }
                },
                Err(e) => {
                    tracing::debug!(user_id = %user_id, "notification receiver lagged: {}", e);
                }
            }
        }

        tracing::debug!(user_id = %user_id, "notification stream closed");
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

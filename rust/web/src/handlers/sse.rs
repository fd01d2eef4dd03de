use crate::errors::IntoErrorResponse;
use crate::events::{EventBus, EventSubscription};
use crate::tables::{TableError, TableId, TableManager};
use continental_engine::engine::TableView;
use continental_engine::errors::GameError;
use continental_engine::events::Event;
use continental_engine::player::PlayerId;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use warp::http;
use warp::reply::{self, Response};
use warp::sse;
use warp::Reply;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// `GET /api/tables/{id}/players/{pid}/events`: the player's notification
/// stream. The first event is an `updateGameState` snapshot; everything after
/// it is what the table publishes to this player. Closing the stream does not
/// disconnect the player.
pub async fn stream_events(
    table_id: TableId,
    player_id: PlayerId,
    tables: Arc<TableManager>,
    event_bus: Arc<EventBus>,
) -> Response {
    let (snapshot, subscription) = match open_feed(&tables, &event_bus, table_id, player_id) {
        Ok(feed) => feed,
        Err(err) => return err.into_http_response(),
    };
    let initial = Event::UpdateGameState {
        state: Box::new(snapshot),
    };
    let stream = tokio_stream::once(Ok(render_event(&initial))).chain(subscription_stream(subscription));

    let keep_alive = sse::keep_alive()
        .interval(KEEP_ALIVE_INTERVAL)
        .text(":keep-alive\n");
    let reply = sse::reply(keep_alive.stream(stream));
    reply::with_header(reply, http::header::CACHE_CONTROL, "no-cache").into_response()
}

/// Subscribes before taking the snapshot so nothing published in between is
/// missed. Events already reflected in the snapshot may arrive once more.
fn open_feed(
    tables: &TableManager,
    event_bus: &EventBus,
    table_id: TableId,
    player_id: PlayerId,
) -> Result<(TableView, EventSubscription), TableError> {
    tables.get_table(&table_id)?;
    let subscription = event_bus.subscribe(table_id.clone(), player_id.clone());
    let view = tables.view(&table_id, Some(player_id.as_str()))?;
    if !view.players.contains(&player_id) {
        return Err(TableError::Rejected(GameError::UnknownPlayer(player_id)));
    }
    Ok((view, subscription))
}

fn subscription_stream(
    mut subscription: EventSubscription,
) -> impl Stream<Item = Result<sse::Event, Infallible>> {
    // The subscription stays alive inside the stream; dropping the stream unsubscribes.
    let (_, idle) = mpsc::channel(1);
    let receiver = std::mem::replace(subscription.receiver(), idle);

    ReceiverStream::new(receiver).map(move |event| {
        let _held = &subscription;
        Ok(render_event(&event))
    })
}

/// One SSE frame: the event name as `event:` and the JSON body as `data:`.
fn render_event(event: &Event) -> sse::Event {
    match serde_json::to_string(event) {
        Ok(json) => sse::Event::default().event(event.name()).data(json),
        Err(err) => {
            tracing::error!(event = event.name(), error = %err, "failed to serialize table event");
            let fallback = serde_json::json!({
                "type": "error",
                "message": format!("failed to serialize {}: {err}", event.name())
            })
            .to_string();
            sse::Event::default().event("error").data(fallback)
        }
    }
}

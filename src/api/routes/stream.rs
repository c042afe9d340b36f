//! Server-sent event streams: periodic feed snapshots and origin cache events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, Stream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::periodic::PeriodicTask;
use crate::api::server::AppState;
use crate::events::NewsEvent;
use crate::news::Domain;
use crate::origin::assembler::FeedSnapshot;

use super::news::NewsQuery;

/// Receiving half of a feed stream. Dropping it (client gone) drops the
/// push task with it.
struct FeedSubscription {
    rx: mpsc::Receiver<FeedSnapshot>,
    _push: PeriodicTask,
}

fn snapshot_event(snapshot: &FeedSnapshot) -> Event {
    Event::default()
        .json_data(snapshot)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

/// Stream of feed snapshots: one immediately, then one per push interval.
pub(crate) async fn feed_stream(
    state: Arc<AppState>,
    domain: Domain,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let (tx, rx) = mpsc::channel(4);
    let assembler = state.assembler.clone();

    let initial = assembler.snapshot(domain).await;
    // Capacity is at least one and nothing else has sent yet.
    let _ = tx.try_send(initial);

    let period = state.cache().config().push_interval();
    let push = PeriodicTask::spawn(&state.shutdown, period, move || {
        let assembler = assembler.clone();
        let tx = tx.clone();
        async move {
            let snapshot = assembler.snapshot(domain).await;
            tx.send(snapshot).await.is_ok()
        }
    });
    debug!(%domain, period_secs = period.as_secs(), "Feed stream opened");

    let subscription = FeedSubscription { rx, _push: push };
    stream::unfold(subscription, |mut sub| async move {
        let snapshot = sub.rx.recv().await?;
        Some((Ok(snapshot_event(&snapshot)), sub))
    })
}

/// GET /news/stream?domain=
pub async fn news_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NewsQuery>,
) -> Response {
    let domain = match query.domain() {
        Ok(d) => d,
        Err(e) => return e.into_response(),
    };
    let keep_alive = state.cache().config().keep_alive();
    let stream = feed_stream(state, domain).await;
    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(keep_alive))
        .into_response()
}

struct EventSubscription {
    rx: broadcast::Receiver<NewsEvent>,
    domain: Option<Domain>,
    shutdown: CancellationToken,
}

/// Next event for the subscription, or `None` once the bus closes or the
/// server shuts down.
async fn next_event(sub: &mut EventSubscription) -> Option<NewsEvent> {
    loop {
        let received = tokio::select! {
            _ = sub.shutdown.cancelled() => return None,
            received = sub.rx.recv() => received,
        };
        match received {
            Ok(event) if sub.domain.map_or(true, |d| d == event.domain()) => return Some(event),
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Event stream lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// GET /news/events?domain=: origin cache events as they happen.
pub async fn event_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NewsQuery>,
) -> Response {
    let domain = match query.domain.as_deref() {
        None | Some("") => None,
        Some(d) => match d.parse::<Domain>() {
            Ok(d) => Some(d),
            Err(e) => return e.into_response(),
        },
    };
    let sub = EventSubscription {
        rx: state.cache().events().subscribe(),
        domain,
        shutdown: state.shutdown.clone(),
    };
    let stream = stream::unfold(sub, |mut sub| async move {
        let event = next_event(&mut sub).await?;
        let name = match &event {
            NewsEvent::Refreshed { .. } => "refreshed",
            NewsEvent::RateLimited { .. } => "rate_limited",
            NewsEvent::Degraded { .. } => "degraded",
            NewsEvent::Ingested { .. } => "ingested",
        };
        let sse = Event::default()
            .event(name)
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()));
        Some((Ok::<_, Infallible>(sse), sub))
    });
    let keep_alive = state.cache().config().keep_alive();
    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(keep_alive))
        .into_response()
}

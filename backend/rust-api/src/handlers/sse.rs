use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Extension,
};
use chrono::Utc;
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

use super::duels::{ensure_can_view, error_response};
use crate::{
    metrics::SSE_CONNECTIONS_ACTIVE,
    middlewares::auth::JwtClaims,
    models::{
        timer::{DuelClosed, DuelStreamEvent, TurnTick},
        Duel, DuelStatus,
    },
    services::AppState,
    store::Subscription,
    utils::time::remaining_since,
};

/// Live duel feed
/// GET /api/v1/duels/{id}/stream
pub async fn duel_stream(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(duel_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // Subscribe before reading so nothing committed in between is missed.
    let subscription = state.engine.subscribe(&duel_id);
    let duel = state
        .engine
        .get_duel(&duel_id)
        .await
        .map_err(error_response)?;
    ensure_can_view(&duel, &claims.sub).map_err(error_response)?;

    tracing::info!(
        "Client connected to duel stream: duel={}, player={}",
        duel_id,
        claims.sub
    );

    let stream = create_duel_stream(
        subscription,
        duel,
        claims.sub,
        state.config.duel.turn_duration(),
        state.config.duel.sse_tick_interval(),
    );
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Keeps the connection gauge honest however the stream ends.
struct ConnectionGuard;

impl ConnectionGuard {
    fn new() -> Self {
        SSE_CONNECTIONS_ACTIVE.inc();
        ConnectionGuard
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        SSE_CONNECTIONS_ACTIVE.dec();
    }
}

struct StreamState {
    subscription: Subscription,
    latest: Duel,
    viewer: String,
    turn_duration: Duration,
    ticker: Interval,
    pending: VecDeque<DuelStreamEvent>,
    closed: bool,
    _guard: ConnectionGuard,
}

/// Events that announce `duel` to `viewer`: always an update, plus the
/// closing event once the duel is over.
fn change_events(duel: &Duel, viewer: &str) -> Vec<DuelStreamEvent> {
    let mut events = vec![DuelStreamEvent::DuelUpdated(duel.to_view_for(viewer))];
    if duel.status.is_terminal() {
        events.push(DuelStreamEvent::DuelClosed(DuelClosed {
            duel_id: duel.id.clone(),
            status: duel.status,
            winner_id: duel.winner_id.clone(),
            timestamp: Utc::now(),
        }));
    }
    events
}

fn turn_tick(duel: &Duel, turn_duration: Duration) -> Option<DuelStreamEvent> {
    if duel.status != DuelStatus::Active {
        return None;
    }
    let current_turn = duel.current_turn.clone()?;
    let started_at = duel.turn_started_at?;
    let now = Utc::now();
    let remaining = remaining_since(started_at, turn_duration, now);

    Some(DuelStreamEvent::TurnTick(TurnTick {
        duel_id: duel.id.clone(),
        current_turn,
        remaining_seconds: remaining.as_secs_f64().ceil() as u32,
        total_seconds: turn_duration.as_secs() as u32,
        timestamp: now,
    }))
}

fn create_duel_stream(
    subscription: Subscription,
    duel: Duel,
    viewer: String,
    turn_duration: Duration,
    tick_interval: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let mut ticker = interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let initial = StreamState {
        subscription,
        pending: change_events(&duel, &viewer).into(),
        closed: duel.status.is_terminal(),
        latest: duel,
        viewer,
        turn_duration,
        ticker,
        _guard: ConnectionGuard::new(),
    };

    stream::unfold(initial, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                let sse = Event::default()
                    .event(event.event_name())
                    .data(event.to_sse_data());
                return Some((Ok(sse), st));
            }
            if st.closed {
                tracing::info!("Duel stream closed: duel={}", st.latest.id);
                return None;
            }

            tokio::select! {
                changed = st.subscription.recv() => match changed {
                    Some(duel) if duel.version > st.latest.version => {
                        st.closed = duel.status.is_terminal();
                        st.pending.extend(change_events(&duel, &st.viewer));
                        st.latest = duel;
                    }
                    Some(_) => {}
                    None => return None,
                },
                _ = st.ticker.tick() => {
                    if let Some(tick) = turn_tick(&st.latest, st.turn_duration) {
                        st.pending.push_back(tick);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::state_machine::{
        apply_answer,
        tests::{active_duel, waiting_duel},
    };

    #[test]
    fn ticks_only_for_active_duels() {
        let duel = active_duel(1);
        match turn_tick(&duel, Duration::from_secs(30)) {
            Some(DuelStreamEvent::TurnTick(tick)) => {
                assert_eq!(tick.current_turn, "alice");
                assert_eq!(tick.total_seconds, 30);
                assert!(tick.remaining_seconds <= 30 && tick.remaining_seconds >= 29);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(turn_tick(&waiting_duel(1), Duration::from_secs(30)).is_none());
    }

    #[test]
    fn terminal_changes_close_the_stream() {
        let mut duel = active_duel(1);
        assert_eq!(change_events(&duel, "alice").len(), 1);

        duel.status = DuelStatus::Cancelled;
        let events = change_events(&duel, "alice");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_name(), "duel-closed");
    }

    #[test]
    fn updates_are_rendered_for_each_viewer() {
        let duel = apply_answer(&active_duel(2), "alice", Some("a"), Utc::now())
            .unwrap()
            .duel;

        let for_bob = change_events(&duel, "bob")[0].to_sse_data();
        assert!(for_bob.contains("\"sealed\":true"));
        assert!(!for_bob.contains("\"answer_id\":\"a\""));

        let for_alice = change_events(&duel, "alice")[0].to_sse_data();
        assert!(for_alice.contains("\"answer_id\":\"a\""));
    }
}

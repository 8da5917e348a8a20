mod common;

use axum::http::{Method, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use std::time::Duration;
use tower::ServiceExt;

use common::*;

/// Reads SSE frames until `needle` shows up; returns everything read.
async fn read_until(body: &mut axum::body::Body, needle: &str) -> String {
    let mut seen = String::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !seen.contains(needle) {
            match body.frame().await {
                Some(Ok(frame)) => {
                    if let Some(data) = frame.data_ref() {
                        seen.push_str(&String::from_utf8_lossy(data));
                    }
                }
                _ => break,
            }
        }
    })
    .await
    .expect("stream stalled");
    seen
}

#[tokio::test]
async fn test_stream_pushes_updates_ticks_and_close() {
    let app = create_test_app();
    let duel = create_duel(
        &app,
        "alice",
        json!({ "opponent_id": "bob", "topic": "basics", "question_count": 2 }),
    )
    .await;
    let id = duel["id"].as_str().unwrap().to_string();

    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, &format!("/api/v1/duels/{}/stream", id), Some("bob"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();

    let opening = read_until(&mut body, "event: duel-updated").await;
    assert!(opening.contains(&id));

    let ticks = read_until(&mut body, "event: turn-tick").await;
    assert!(ticks.contains("\"current_turn\":\"alice\""));

    answer(&app, "alice", &id, Some("a")).await;
    // bob's copy of the update carries alice's entry without her pick
    let update = read_until(&mut body, "\"sealed\":true").await;
    assert!(update.contains("duel-updated"));
    assert!(update.contains("\"current_turn\":\"bob\""));
    assert!(!update.contains("\"answer_id\":\"a\""));

    let (status, _) = send(&app, Method::POST, &format!("/api/v1/duels/{}/cancel", id), Some("bob"), None).await;
    assert_eq!(status, StatusCode::OK);

    let closing = read_until(&mut body, "event: duel-closed").await;
    assert!(closing.contains("\"status\":\"cancelled\""));

    // the stream ends after closing
    let rest = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match body.frame().await {
                None => return true,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return false,
            }
        }
    })
    .await
    .unwrap();
    assert!(rest);
}

#[tokio::test]
async fn test_outsiders_cannot_stream() {
    let app = create_test_app();
    let duel = create_duel(
        &app,
        "alice",
        json!({ "opponent_id": "bob", "topic": "basics", "question_count": 1 }),
    )
    .await;
    let id = duel["id"].as_str().unwrap();

    let (status, _) = send(&app, Method::GET, &format!("/api/v1/duels/{}/stream", id), Some("mallory"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::*;

#[tokio::test]
async fn test_bot_duel_plays_itself_out() {
    let app = create_test_app();
    let (status, json) = send(
        &app,
        Method::POST,
        "/api/v1/duels/bot",
        Some("alice"),
        Some(json!({ "topic": "basics", "difficulty": "easy", "question_count": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    let duel = &json["duel"];
    assert_eq!(duel["player2_id"], "bot:easy");
    assert_eq!(duel["current_turn"], "alice");
    let id = duel["id"].as_str().unwrap().to_string();

    for _ in 0..3 {
        wait_until(&app, "alice", &id, |d| d["current_turn"] == "alice").await;
        let (status, _) = answer(&app, "alice", &id, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let done = wait_until(&app, "alice", &id, |d| d["status"] == "finished").await;
    assert_eq!(done["player1_score"], 0);
    assert_eq!(done["player2_score"], 3);
    assert_eq!(done["winner_id"], "bot:easy");
    // bots answer the same questions, in order
    let bot_log = done["player2_answers"].as_array().unwrap();
    assert_eq!(bot_log.len(), 3);
    for (i, entry) in bot_log.iter().enumerate() {
        assert_eq!(entry["question_id"], format!("basics-{}", i + 1));
        assert_eq!(entry["is_correct"], true);
    }
}

#[tokio::test]
async fn test_humans_cannot_answer_for_the_bot() {
    let mut config = test_config();
    config.bots[0].min_think_ms = 10_000;
    config.bots[0].max_think_ms = 10_000;
    let app = create_test_app_with(config);
    let (_, json) = send(
        &app,
        Method::POST,
        "/api/v1/duels/bot",
        Some("alice"),
        Some(json!({ "topic": "basics", "question_count": 2 })),
    )
    .await;
    let id = json["duel"]["id"].as_str().unwrap().to_string();

    answer(&app, "alice", &id, Some("a")).await;
    let (status, _) = answer(&app, "alice", &id, Some("a")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let current = get_duel(&app, "alice", &id).await;
    assert_eq!(current["current_turn"], "bot:easy");
    assert_eq!(current["player1_answers"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_silent_turns_expire_through_the_clock() {
    let mut config = test_config();
    config.duel.turn_duration_seconds = 1;
    let app = create_test_app_with(config);

    let duel = create_duel(
        &app,
        "alice",
        json!({ "opponent_id": "bob", "topic": "basics", "question_count": 1 }),
    )
    .await;
    let id = duel["id"].as_str().unwrap().to_string();

    // alice answers, bob stays silent and is timed out
    answer(&app, "alice", &id, Some("a")).await;
    let done = wait_until(&app, "alice", &id, |d| d["status"] == "finished").await;

    assert!(done["player2_answers"][0]["answer_id"].is_null());
    assert_eq!(done["player2_answers"][0]["is_correct"], false);
    assert_eq!(done["winner_id"], "alice");

    let (status, _) = answer(&app, "bob", &id, Some("a")).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_concurrent_http_answers_commit_once() {
    let app = create_test_app();
    let duel = create_duel(
        &app,
        "alice",
        json!({ "opponent_id": "bob", "topic": "basics", "question_count": 2 }),
    )
    .await;
    let id = duel["id"].as_str().unwrap().to_string();

    let (first, second) = tokio::join!(
        answer(&app, "alice", &id, Some("a")),
        answer(&app, "alice", &id, Some("b")),
    );
    let statuses = [first.0, second.0];
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count(), 1);

    let current = get_duel(&app, "alice", &id).await;
    assert_eq!(current["player1_answers"].as_array().unwrap().len(), 1);
    assert_eq!(current["current_turn"], "bob");
}

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use duel_arena_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    services::{bot_service::BotProfile, question_bank::StaticQuestionBank, AppState},
    store::InMemoryDuelStore,
};

pub const TEST_SECRET: &str = "test-secret";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

/// In-memory store, built-in questions, a fast perfect bot.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.jwt_secret = TEST_SECRET.to_string();
    config.duel.sse_tick_interval_ms = 50;
    config.bots = vec![BotProfile {
        id: "bot:easy".to_string(),
        accuracy_probability: 1.0,
        min_think_ms: 0,
        max_think_ms: 5,
        difficulty: Some("easy".to_string()),
    }];
    config
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(test_config())
}

pub fn create_test_app_with(config: Config) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let state = Arc::new(AppState::with_parts(
        config,
        Arc::new(InMemoryDuelStore::new()),
        Arc::new(StaticQuestionBank::with_defaults()),
    ));
    TestApp {
        router: create_router(state.clone()),
        state,
    }
}

pub fn token_for(player_id: &str) -> String {
    JwtService::new(TEST_SECRET)
        .generate_token(&JwtClaims::for_player(player_id, 3600))
        .unwrap()
}

pub fn request(method: Method, uri: &str, player: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(player) = player {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token_for(player)));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Sends a request and parses the body as JSON (`Value::Null` if it is not).
pub async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    player: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = app
        .router
        .clone()
        .oneshot(request(method, uri, player, body))
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

pub async fn create_duel(app: &TestApp, player: &str, body: Value) -> Value {
    let (status, json) = send(app, Method::POST, "/api/v1/duels", Some(player), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {json}");
    json["duel"].clone()
}

pub async fn get_duel(app: &TestApp, player: &str, duel_id: &str) -> Value {
    let (status, json) = send(
        app,
        Method::GET,
        &format!("/api/v1/duels/{}", duel_id),
        Some(player),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "get failed: {json}");
    json["duel"].clone()
}

pub async fn answer(
    app: &TestApp,
    player: &str,
    duel_id: &str,
    answer_id: Option<&str>,
) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        &format!("/api/v1/duels/{}/answers", duel_id),
        Some(player),
        Some(serde_json::json!({ "answer_id": answer_id })),
    )
    .await
}

/// Polls the duel until `check` holds or five seconds pass.
pub async fn wait_until<F>(app: &TestApp, player: &str, duel_id: &str, check: F) -> Value
where
    F: Fn(&Value) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let duel = get_duel(app, player, duel_id).await;
            if check(&duel) {
                return duel;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("duel never reached the expected state")
}

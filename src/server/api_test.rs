use super::*;

use axum::body::Body;
use axum::http::{ header, Method, Request, StatusCode };
use axum::response::Response;
use serde_json::{ json, Value };
use std::time::Duration;
use tower::ServiceExt;

use crate::history::MemoryStore;
use crate::llm::{ MockChatClient, UpstreamError };

fn test_state(chat: Option<Arc<dyn ChatClient>>) -> AppState {
    AppState {
        store: Arc::new(MemoryStore::new()),
        chat,
        limiter: Arc::new(IpRateLimiter::new(100, Duration::from_secs(60))),
        system_prompt: "be helpful".to_string(),
    }
}

fn replying_chat(reply: &str) -> Arc<dyn ChatClient> {
    let reply = reply.to_string();
    let mut chat = MockChatClient::new();
    chat.expect_complete().returning(move |_, _, _| Ok(reply.clone()));
    Arc::new(chat)
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "203.0.113.1")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn chat_replies_and_appends_both_turns() {
    let state = test_state(Some(replying_chat("hi there")));
    let app = build_router(state.clone(), &[]);

    let response = app
        .clone()
        .oneshot(chat_request(json!({ "userId": "u1", "message": "hello" }))).await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "reply": "hi there" }));

    let history = state.store.get_history("u1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, "user");
    assert_eq!(history[0].content, "hello");
    assert_eq!(history[1].role, "assistant");
    assert_eq!(history[1].content, "hi there");

    // And the history endpoint reports the same two turns in order.
    let response = app
        .oneshot(
            Request::builder().uri("/api/chat/history?userId=u1").body(Body::empty()).unwrap()
        ).await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["userId"], "u1");
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"], "hello");
    assert_eq!(body["messages"][1]["role"], "assistant");
    assert_eq!(body["messages"][1]["content"], "hi there");
}

#[tokio::test]
async fn missing_fields_are_rejected_without_store_mutation() {
    let state = test_state(Some(replying_chat("unused")));
    let app = build_router(state.clone(), &[]);

    for body in [json!({}), json!({ "userId": "u1" }), json!({ "message": "hello" }),
                 json!({ "userId": "  ", "message": "hello" })] {
        let response = app.clone().oneshot(chat_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    assert!(state.store.get_history("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let app = build_router(test_state(Some(replying_chat("unused"))), &[]);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_credential_is_a_configuration_error() {
    let state = test_state(None);
    let app = build_router(state.clone(), &[]);

    let response = app
        .oneshot(chat_request(json!({ "userId": "u1", "message": "hello" }))).await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Rejected before any history is written.
    assert!(state.store.get_history("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn upstream_error_maps_to_502_and_keeps_the_user_turn() {
    let mut chat = MockChatClient::new();
    chat.expect_complete().returning(|_, _, _| {
        Err(UpstreamError::Status {
            status: 500,
            message: "boom".to_string(),
        })
    });
    let state = test_state(Some(Arc::new(chat)));
    let app = build_router(state.clone(), &[]);

    let response = app
        .oneshot(chat_request(json!({ "userId": "u1", "message": "hello" }))).await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Upstream error");
    assert!(body["detail"].as_str().unwrap().contains("try again"));
    assert!(body["detail"].as_str().unwrap().find("boom").is_none());

    let history = state.store.get_history("u1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, "user");
}

#[tokio::test]
async fn upstream_timeout_maps_to_504() {
    let mut chat = MockChatClient::new();
    chat.expect_complete().returning(|_, _, _| Err(UpstreamError::Timeout(Duration::from_secs(20))));
    let app = build_router(test_state(Some(Arc::new(chat))), &[]);

    let response = app
        .oneshot(chat_request(json!({ "userId": "u1", "message": "hello" }))).await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn exceeding_the_budget_rejects_without_calling_upstream() {
    let mut chat = MockChatClient::new();
    chat.expect_complete().times(2).returning(|_, _, _| Ok("ok".to_string()));

    let mut state = test_state(Some(Arc::new(chat)));
    state.limiter = Arc::new(IpRateLimiter::new(2, Duration::from_secs(300)));
    let app = build_router(state, &[]);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(chat_request(json!({ "userId": "u1", "message": "hello" }))).await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(chat_request(json!({ "userId": "u1", "message": "hello" }))).await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    let body = body_json(response).await;
    assert!(body["retryAfterSeconds"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn health_never_consumes_rate_limit_budget() {
    let mut state = test_state(None);
    state.limiter = Arc::new(IpRateLimiter::new(1, Duration::from_secs(300)));
    let app = build_router(state, &[]);

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
        assert!(body["timestamp"].is_i64());
    }
}

#[tokio::test]
async fn unknown_user_history_is_empty_not_an_error() {
    let app = build_router(test_state(None), &[]);

    let response = app
        .oneshot(
            Request::builder().uri("/api/chat/history?userId=ghost").body(Body::empty()).unwrap()
        ).await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["messages"], json!([]));
}

#[tokio::test]
async fn history_requires_user_id() {
    let app = build_router(test_state(None), &[]);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/chat/history").body(Body::empty()).unwrap()).await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/api/chat/history")
                .body(Body::empty())
                .unwrap()
        ).await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn clear_history_empties_the_conversation() {
    let state = test_state(Some(replying_chat("hi there")));
    let app = build_router(state.clone(), &[]);

    app.clone()
        .oneshot(chat_request(json!({ "userId": "u1", "message": "hello" }))).await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/api/chat/history?userId=u1")
                .body(Body::empty())
                .unwrap()
        ).await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "ok": true }));

    assert!(state.store.get_history("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn allow_listed_origin_is_echoed_back() {
    let allowed = vec!["https://allowed.example".to_string()];
    let app = build_router(test_state(None), &allowed);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "https://allowed.example")
                .body(Body::empty())
                .unwrap()
        ).await
        .unwrap();

    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://allowed.example"
    );
    let vary = response.headers().get(header::VARY).unwrap().to_str().unwrap().to_lowercase();
    assert!(vary.contains("origin"));
}

#[tokio::test]
async fn unlisted_origin_gets_no_allow_origin_header() {
    let allowed = vec!["https://allowed.example".to_string()];
    let app = build_router(test_state(None), &allowed);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "https://evil.example")
                .body(Body::empty())
                .unwrap()
        ).await
        .unwrap();

    assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn preflight_short_circuits_with_204_and_no_body() {
    let allowed = vec!["https://allowed.example".to_string()];
    let app = build_router(test_state(None), &allowed);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/chat")
                .header(header::ORIGIN, "https://allowed.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap()
        ).await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://allowed.example"
    );
    let allow_methods = response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(allow_methods.contains("POST"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn empty_allow_list_is_permissive() {
    let app = build_router(test_state(None), &[]);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "https://anywhere.example")
                .body(Body::empty())
                .unwrap()
        ).await
        .unwrap();

    assert_eq!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
}

//! Integration tests for the REST API.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use ideasift_server::{create_server, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    create_server(AppState::in_memory().unwrap())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn test_items_behaviors_and_recommendations() {
    let app = app();
    for (id, category) in [("a", "tools"), ("b", "tools"), ("c", "art")] {
        let (status, _) = send(
            &app,
            "POST",
            "/items",
            Some(json!({ "id": id, "title": format!("Idea {id}"), "category": category })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, event) = send(
        &app,
        "POST",
        "/behaviors",
        Some(json!({ "user_id": "fan", "item_id": "a", "action_type": "like" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(event["metadata"]["category"], "tools");

    let (status, body) = send(
        &app,
        "GET",
        "/recommendations?user_id=newcomer&limit=5&strategy=trending",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["served_strategy"], "trending");
    assert_eq!(body["recommendations"][0]["item"]["id"], "a");

    let (status, body) = send(&app, "GET", "/recommendations?user_id=fan&limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["item"]["id"].as_str().unwrap())
        .collect();
    assert!(!ids.contains(&"a"));

    let (status, summary) = send(&app, "POST", "/items/a/features", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["item_id"], "a");
}

#[tokio::test]
async fn test_rejects_bad_input() {
    let app = app();
    let (status, body) = send(
        &app,
        "GET",
        "/recommendations?user_id=u1&strategy=astrology",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        &app,
        "POST",
        "/behaviors",
        Some(json!({ "user_id": " ", "item_id": "a", "action_type": "view" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VAL_002");

    let (status, _) = send(&app, "GET", "/experiments/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_experiment_lifecycle() {
    let app = app();
    let (status, exp) = send(
        &app,
        "POST",
        "/experiments",
        Some(json!({
            "name": "diversity vs hybrid",
            "strategy_control": "hybrid",
            "strategy_treatment": "diversity",
            "traffic_split": 0.5
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(exp["status"], "draft");
    let id = exp["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "POST",
        &format!("/experiments/{id}/status"),
        Some(json!({ "status": "completed" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, active) = send(
        &app,
        "POST",
        &format!("/experiments/{id}/status"),
        Some(json!({ "status": "active" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(active["start_date"].is_string());

    let (_, first) = send(
        &app,
        "GET",
        &format!("/experiments/{id}/assignment?user_id=u1"),
        None,
    )
    .await;
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/experiments/{id}/traffic-split"),
        Some(json!({ "traffic_split": 0.05 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, again) = send(
        &app,
        "GET",
        &format!("/experiments/{id}/assignment?user_id=u1"),
        None,
    )
    .await;
    assert_eq!(first["variant"], again["variant"]);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/experiments/{id}/events"),
        Some(json!({
            "user_id": "u1",
            "variant": "A",
            "action": "impression",
            "item_id": "a",
            "position_in_list": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, analysis) = send(&app, "GET", &format!("/experiments/{id}/analysis"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analysis["performance"]["control"]["impressions"], 1);
    assert_eq!(analysis["sample_size_reached"], false);

    let (status, dashboard) = send(&app, "GET", "/dashboard", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["totals"]["active_experiments"], 1);
    assert_eq!(dashboard["daily"].as_array().unwrap().len(), 7);
}

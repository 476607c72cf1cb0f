use std::sync::Arc;

use authoring_store::config::AppConfig;
use authoring_store::remote::MemoryRemote;
use authoring_store::routes::build_router;
use authoring_store::AppContext;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn app() -> (Arc<MemoryRemote>, Arc<AppContext>, Router) {
    let remote = Arc::new(MemoryRemote::new());
    let ctx = Arc::new(
        AppContext::with_remote(AppConfig::default(), remote.clone())
            .await
            .expect("context should initialize"),
    );
    let router = build_router(ctx.clone());
    (remote, ctx, router)
}

async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };
    let response = router.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).expect("json body") };
    (status, value)
}

#[tokio::test]
async fn health_reports_ok() {
    let (_remote, _ctx, router) = app().await;
    let (status, body) = call(&router, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
}

#[tokio::test]
async fn create_module_then_problem() {
    let (remote, ctx, router) = app().await;

    let (status, module) = call(
        &router,
        Method::POST,
        "/api/v1/modules",
        Some(json!({ "id": "m1", "name": "Subtraction", "description": "with borrowing", "problems": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(module["name"], "Subtraction");

    let (status, problem) = call(
        &router,
        Method::POST,
        "/api/v1/modules/m1/problems",
        Some(json!({ "kind": "N_DIGIT_OPERATION", "userId": "teacher-7" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(problem["kind"], "N_DIGIT_OPERATION");
    assert_eq!(problem["operand1"], "200");
    assert_eq!(problem["createdBy"], "teacher-7");

    let (status, view) = call(&router, Method::GET, "/api/v1/modules/m1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["problems"][0]["id"], problem["id"]);

    let id = problem["id"].as_str().expect("problem id");
    assert!(ctx.store.problem(id).await.is_some());
    let stored = remote.snapshot("mathModules").await.expect("modules written");
    assert_eq!(stored["modules"]["m1"]["problems"], json!([id]));
}

#[tokio::test]
async fn missing_module_is_404() {
    let (_remote, _ctx, router) = app().await;

    let (status, body) = call(&router, Method::GET, "/api/v1/modules/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().expect("error text").contains("nope"));

    let (status, _) = call(
        &router,
        Method::POST,
        "/api/v1/modules/nope/problems",
        Some(json!({ "kind": "WORD_PROBLEM", "userId": "u" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_problem_rejects_mismatched_ids() {
    let (_remote, _ctx, router) = app().await;
    call(&router, Method::POST, "/api/v1/modules", Some(json!({ "id": "m1", "name": "M" }))).await;
    let (_, problem) = call(
        &router,
        Method::POST,
        "/api/v1/modules/m1/problems",
        Some(json!({ "kind": "WORD_PROBLEM", "userId": "u" })),
    )
    .await;

    let (status, _) = call(&router, Method::PUT, "/api/v1/modules/m1/problems/other-id", Some(problem.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut edited = problem.clone();
    edited["title"] = json!("Apples and oranges");
    let uri = format!("/api/v1/modules/m1/problems/{}", problem["id"].as_str().expect("id"));
    let (status, _) = call(&router, Method::PUT, &uri, Some(edited)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, view) = call(&router, Method::GET, "/api/v1/modules/m1", None).await;
    assert_eq!(view["problems"][0]["title"], "Apples and oranges");
}

#[tokio::test]
async fn delete_module_removes_it() {
    let (_remote, ctx, router) = app().await;
    call(&router, Method::POST, "/api/v1/modules", Some(json!({ "id": "m1", "name": "M" }))).await;
    let (_, problem) = call(
        &router,
        Method::POST,
        "/api/v1/modules/m1/problems",
        Some(json!({ "kind": "MULTIPLE_CHOICE", "userId": "u" })),
    )
    .await;

    let (status, _) = call(&router, Method::DELETE, "/api/v1/modules/m1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&router, Method::GET, "/api/v1/modules/m1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(ctx.store.problem(problem["id"].as_str().expect("id")).await.is_none());

    let (_, modules) = call(&router, Method::GET, "/api/v1/modules", None).await;
    assert_eq!(modules, json!({}));
}

#[tokio::test]
async fn concepts_round_trip_through_the_api() {
    let (_remote, _ctx, router) = app().await;
    let (status, created) = call(
        &router,
        Method::POST,
        "/api/v1/concepts",
        Some(json!({ "id": "c1", "name": "Place value", "relatedConcepts": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "Place value");

    let (status, _) = call(&router, Method::PUT, "/api/v1/concepts/c1", Some(json!({ "id": "c1", "name": "Tens" }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, fetched) = call(&router, Method::GET, "/api/v1/concepts/c1", None).await;
    assert_eq!(fetched["name"], "Tens");

    let (status, _) = call(&router, Method::PUT, "/api/v1/concepts/zz", Some(json!({ "id": "zz" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn image_upload_returns_an_id_with_a_url() {
    let (remote, _ctx, router) = app().await;

    let (status, _) = call(
        &router,
        Method::POST,
        "/api/v1/images",
        Some(json!({ "name": "a.png", "type": "image/png", "data": "not base64!" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &router,
        Method::POST,
        "/api/v1/images",
        Some(json!({ "name": "a.png", "type": "image/png", "data": "AQID" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(remote.upload_count().await, 1);

    let id = body["id"].as_str().expect("image id");
    let (status, url) = call(&router, Method::GET, &format!("/api/v1/images/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(url["url"], format!("memory://uploads/{id}"));

    let (status, _) = call(&router, Method::GET, "/api/v1/images/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use leasesync_core::test_utils::{seed_inventory, RecordBuilder};
use tower::ServiceExt;
use uuid::Uuid;

fn test_config() -> ServerConfig {
    ServerConfig {
        allowed_origins: vec![],
        ..Default::default()
    }
}

fn setup_test_app() -> Router {
    let db = Database::in_memory().unwrap();
    create_router(db, None, test_config())
}

/// Toyota seller with Aygo X and Yaris Cross listings
fn seeded_db() -> (Database, Uuid, Vec<Uuid>) {
    let db = Database::in_memory().unwrap();
    let records = vec![
        RecordBuilder::new("Toyota", "Aygo X", "Active")
            .horsepower(72)
            .offer(2899, 36, 15000)
            .build(),
        RecordBuilder::new("Toyota", "Yaris Cross", "Style")
            .offer(3999, 36, 15000)
            .build(),
    ];
    let (seller, ids) = seed_inventory(&db, "Toyota Roskilde", &records).unwrap();
    (db, seller, ids)
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Batch that updates the Aygo price, keeps the Yaris and adds a C-HR
fn sample_batch(seller: Uuid) -> serde_json::Value {
    serde_json::json!({
        "sellerId": seller,
        "records": [
            {
                "make": "Toyota", "model": "Aygo X", "variant": "Active",
                "offers": [{"monthlyPrice": 2999, "firstPayment": 0, "periodMonths": 36, "mileagePerYear": 15000}]
            },
            {
                "make": "Toyota", "model": "Yaris Cross", "variant": "Style",
                "offers": [[3999, 0, 36, 15000]]
            },
            {
                "make": "Toyota", "model": "C-HR", "variant": "Executive",
                "offers": []
            }
        ]
    })
}

async fn create_session(app: &Router, seller: Uuid) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(post_json("/api/sessions", sample_batch(seller)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    get_body_json(response).await
}

async fn change_ids(app: &Router, session_id: &str) -> Vec<String> {
    let response = app
        .clone()
        .oneshot(get(&format!("/api/sessions/{}/changes", session_id)))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    json["changes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap().to_string())
        .collect()
}

// ========== Health & Inventory ==========

#[tokio::test]
async fn test_health() {
    let app = setup_test_app();

    let response = app.oneshot(get("/api/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    let json = get_body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_seller_and_make() {
    let app = setup_test_app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/sellers",
            serde_json::json!({"name": "Kia Odense"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let seller = get_body_json(response).await;
    assert_eq!(seller["name"], "Kia Odense");

    let response = app
        .clone()
        .oneshot(post_json("/api/makes", serde_json::json!({"name": "Kia"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/api/audit")).await.unwrap();
    let entries = get_body_json(response).await;
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["entity_type"], "make");
    assert_eq!(entries[0]["actor"], "api");
}

#[tokio::test]
async fn test_create_seller_requires_name() {
    let app = setup_test_app();

    let response = app
        .oneshot(post_json("/api/sellers", serde_json::json!({"name": "  "})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_seller_listings() {
    let (db, seller, _) = seeded_db();
    let app = create_router(db, None, test_config());

    let response = app
        .oneshot(get(&format!("/api/sellers/{}/listings", seller)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    let listings = json.as_array().unwrap();
    assert_eq!(listings.len(), 2);
    assert_eq!(listings[0]["model"], "Aygo X");
}

#[tokio::test]
async fn test_listings_for_unknown_seller() {
    let app = setup_test_app();

    let response = app
        .oneshot(get(&format!("/api/sellers/{}/listings", Uuid::new_v4())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ========== Sessions ==========

#[tokio::test]
async fn test_create_session_returns_summary() {
    let (db, seller, _) = seeded_db();
    let app = create_router(db, None, test_config());

    let summary = create_session(&app, seller).await;

    assert_eq!(summary["total_extracted"], 3);
    assert_eq!(summary["total_existing"], 2);
    assert_eq!(summary["counts"]["creates"], 1);
    assert_eq!(summary["counts"]["updates"], 1);
    assert_eq!(summary["counts"]["unchanged"], 1);
    assert_eq!(summary["exact_matches"], 2);
}

#[tokio::test]
async fn test_create_session_unknown_seller() {
    let app = setup_test_app();

    let response = app
        .oneshot(post_json("/api/sessions", sample_batch(Uuid::new_v4())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_and_get_sessions() {
    let (db, seller, _) = seeded_db();
    let app = create_router(db, None, test_config());
    let summary = create_session(&app, seller).await;
    let session_id = summary["session_id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/sessions?seller_id={}", seller)))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["sessions"][0]["id"], session_id);
    assert_eq!(json["sessions"][0]["status"], "changes_computed");

    let response = app
        .clone()
        .oneshot(get(&format!("/api/sessions/{}", session_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get(&format!("/api/sessions/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_changes_filtered_and_paginated() {
    let (db, seller, _) = seeded_db();
    let app = create_router(db, None, test_config());
    let summary = create_session(&app, seller).await;
    let session_id = summary["session_id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!(
            "/api/sessions/{}/changes?change_type=update",
            session_id
        )))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["total"], 1);
    let change = &json["changes"][0];
    assert_eq!(change["change_type"], "update");
    assert_eq!(change["change_status"], "pending");
    assert_eq!(change["match_method"], "exact");
    assert!(change["field_changes"]["offers"].is_object());

    let response = app
        .clone()
        .oneshot(get(&format!(
            "/api/sessions/{}/changes?limit=1&offset=1",
            session_id
        )))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["total"], 3);
    assert_eq!(json["changes"].as_array().unwrap().len(), 1);

    let response = app
        .oneshot(get(&format!(
            "/api/sessions/{}/changes?change_type=rename",
            session_id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ========== Apply ==========

#[tokio::test]
async fn test_apply_changes() {
    let (db, seller, ids) = seeded_db();
    let app = create_router(db.clone(), None, test_config());
    let summary = create_session(&app, seller).await;
    let session_id = summary["session_id"].as_str().unwrap();
    let selected = change_ids(&app, session_id).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/apply-changes",
            serde_json::json!({
                "sessionId": session_id,
                "selectedChangeIds": selected,
                "appliedBy": "ops@dealer.dk"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["success"], true);
    let result = &json["result"];
    assert_eq!(result["applied_creates"], 1);
    assert_eq!(result["applied_updates"], 1);
    assert_eq!(result["applied_deletes"], 0);
    assert_eq!(result["total_processed"], 3);
    assert_eq!(result["error_count"], 0);
    assert_eq!(result["applied_by"], "ops@dealer.dk");

    let aygo = db.get_listing(ids[0]).unwrap().unwrap();
    assert_eq!(aygo.lowest_monthly_price(), Some(2999));
    assert_eq!(db.count_listings(seller).unwrap(), 3);
}

#[tokio::test]
async fn test_apply_partial_selection_discards_rest() {
    let (db, seller, _) = seeded_db();
    let app = create_router(db, None, test_config());
    let summary = create_session(&app, seller).await;
    let session_id = summary["session_id"].as_str().unwrap();
    let selected = change_ids(&app, session_id).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/apply-changes",
            serde_json::json!({
                "sessionId": session_id,
                "selectedChangeIds": [selected[0]],
            }),
        ))
        .await
        .unwrap();

    let json = get_body_json(response).await;
    assert_eq!(json["result"]["total_processed"], 1);
    assert_eq!(json["result"]["discarded_count"], 2);
    assert_eq!(json["result"]["applied_by"], "unknown");

    // A second apply reports the already-applied change as an error
    let response = app
        .oneshot(post_json(
            "/api/apply-changes",
            serde_json::json!({
                "sessionId": session_id,
                "selectedChangeIds": [selected[0]],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["result"]["error_count"], 1);
    assert_eq!(json["result"]["errors"][0]["change_id"], selected[0].as_str());
    assert_eq!(json["result"]["errors"][0]["error"], "Change is already applied");
}

#[tokio::test]
async fn test_apply_changes_unprefixed_route() {
    let (db, seller, _) = seeded_db();
    let app = create_router(db, None, test_config());
    let summary = create_session(&app, seller).await;
    let session_id = summary["session_id"].as_str().unwrap();
    let selected = change_ids(&app, session_id).await;

    let response = app
        .oneshot(post_json(
            "/apply-changes",
            serde_json::json!({
                "sessionId": session_id,
                "selectedChangeIds": selected,
                "appliedBy": "ops"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["result"]["total_processed"], 3);
}

#[tokio::test]
async fn test_apply_validation_errors() {
    let app = setup_test_app();
    let cases = vec![
        serde_json::json!({"selectedChangeIds": [Uuid::new_v4()]}),
        serde_json::json!({"sessionId": "not-a-uuid", "selectedChangeIds": [Uuid::new_v4()]}),
        serde_json::json!({"sessionId": Uuid::new_v4(), "selectedChangeIds": []}),
        serde_json::json!({"sessionId": Uuid::new_v4(), "selectedChangeIds": ["nope"]}),
        serde_json::json!({"sessionId": Uuid::new_v4(), "selectedChangeIds": "all"}),
    ];

    for body in cases {
        let response = app
            .clone()
            .oneshot(post_json("/api/apply-changes", body.clone()))
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "body: {}",
            body
        );
        let json = get_body_json(response).await;
        assert_eq!(json["success"], false);
    }
}

#[tokio::test]
async fn test_apply_malformed_json() {
    let app = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/apply-changes")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_apply_unknown_session() {
    let app = setup_test_app();

    let response = app
        .oneshot(post_json(
            "/api/apply-changes",
            serde_json::json!({
                "sessionId": Uuid::new_v4(),
                "selectedChangeIds": [Uuid::new_v4()],
                "appliedBy": "ops"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_core_error_status_mapping() {
    use leasesync_core::Error;

    let id = Uuid::new_v4();
    assert_eq!(
        AppError::from_core(Error::ApplyInProgress(id)).status,
        StatusCode::CONFLICT
    );
    assert_eq!(
        AppError::from_core(Error::SessionNotFound(id)).status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        AppError::from_core(Error::InvalidChangeIds(vec![])).status,
        StatusCode::BAD_REQUEST
    );

    let internal = AppError::from_core(Error::Apply("disk full".into()));
    assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(internal.message, "An internal error occurred");
}

#[test]
fn test_clamp_limit() {
    let config = ServerConfig {
        max_page_limit: 10,
        ..Default::default()
    };
    assert_eq!(config.clamp_limit(0), 1);
    assert_eq!(config.clamp_limit(5), 5);
    assert_eq!(config.clamp_limit(500), 10);
}

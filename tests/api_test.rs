use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use proof_api::config::Config;
use proof_api::db::{schema, InMemoryDatabase};
use proof_api::server::{create_server, AppState};

fn app(db: &InMemoryDatabase) -> Router {
    create_server(AppState::new(Arc::new(db.clone()), Config::for_memory()))
}

async fn call(app: Router, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_environment() {
    let db = InMemoryDatabase::new();
    let (status, body) = call(app(&db), Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "test");
}

#[tokio::test]
async fn register_login_refresh() {
    let db = InMemoryDatabase::new();
    let registration = json!({ "email": "kim@proof.kr", "password": "s3cret!", "name": "Kim" });

    let (status, body) = call(app(&db), Method::POST, "/api/auth/register", None, Some(registration.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["email"], "kim@proof.kr");
    assert!(body["error"].is_null());
    let stored = db.rows(schema::USERS);
    assert_eq!(stored.len(), 1);
    assert_ne!(stored[0]["password_hash"], "s3cret!");

    let (status, body) = call(app(&db), Method::POST, "/api/auth/register", None, Some(registration)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "EMAIL_ALREADY_EXISTS");

    let (status, body) = call(
        app(&db),
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "kim@proof.kr", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");

    let (status, body) = call(
        app(&db),
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "kim@proof.kr", "password": "s3cret!" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let refresh_token = body["data"]["refreshToken"].as_str().unwrap().to_string();
    let access_token = body["data"]["accessToken"].as_str().unwrap().to_string();

    let (status, body) = call(
        app(&db),
        Method::POST,
        "/api/auth/refresh",
        None,
        Some(json!({ "refreshToken": access_token })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");

    let (status, body) = call(
        app(&db),
        Method::POST,
        "/api/auth/refresh",
        None,
        Some(json!({ "refreshToken": refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["accessToken"].is_string());
}

#[tokio::test]
async fn bearer_token_identifies_user() {
    let db = InMemoryDatabase::new();
    let (_, body) = call(
        app(&db),
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "email": "lee@proof.kr", "password": "pw", "name": "Lee" })),
    )
    .await;
    let token = body["data"]["accessToken"].as_str().unwrap().to_string();

    let request = Request::builder()
        .uri("/api/users/me")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app(&db).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let me: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(me["name"], "Lee");
    assert!(me.get("password_hash").is_none());
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let db = InMemoryDatabase::new();
    let (status, body) = call(app(&db), Method::GET, "/api/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn spaces_validate_dates_and_schedule() {
    let db = InMemoryDatabase::new();
    let (status, body) = call(
        app(&db),
        Method::POST,
        "/api/spaces",
        Some("u1"),
        Some(json!({
            "name": "해커톤",
            "type": "공모전",
            "start_date": "2024-05-10",
            "end_date": "2024-05-01",
            "reflection_cycle": "weekly",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let (status, space) = call(
        app(&db),
        Method::POST,
        "/api/spaces",
        Some("u1"),
        Some(json!({
            "name": "해커톤",
            "type": "공모전",
            "start_date": "2024-05-01",
            "end_date": "2024-05-14",
            "reflection_cycle": "weekly",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(space["status"], "active");
    assert_eq!(space["expected_reflections"], 2);
    assert_eq!(space["total_reflections"], 0);
    assert!(space["next_reflection_date"].is_string());

    let (_, listed) = call(app(&db), Method::GET, "/api/spaces", Some("u1"), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    let (_, others) = call(app(&db), Method::GET, "/api/spaces", Some("u2"), None).await;
    assert!(others.as_array().unwrap().is_empty());

    let id = space["id"].as_str().unwrap();
    let (status, _) = call(app(&db), Method::GET, &format!("/api/spaces/{id}"), Some("u2"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn micro_log_validation_order() {
    let db = InMemoryDatabase::new();
    let post = |body: Value| {
        let db = db.clone();
        async move { call(app(&db), Method::POST, "/api/reflections/micro", Some("u1"), Some(body)).await }
    };

    let (status, body) = post(json!({
        "activity_type": "party",
        "mood_compare": "nope",
        "date": "2024-05-01",
    }))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_ACTIVITY_TYPE");

    let (_, body) = post(json!({ "activity_type": "club", "mood_compare": "better", "date": "2024-05-01" })).await;
    assert_eq!(body["error"]["code"], "REASON_REQUIRED");

    let (_, body) = post(json!({
        "activity_type": "club",
        "mood_compare": "same",
        "memo": "가".repeat(501),
        "date": "2024-05-01",
    }))
    .await;
    assert_eq!(body["error"]["code"], "MEMO_TOO_LONG");

    let (status, body) = post(json!({
        "activity_type": "club",
        "mood_compare": "better",
        "reason": "positive_001",
        "memo": "가".repeat(500),
        "date": "2024-05-01",
    }))
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = call(app(&db), Method::GET, "/api/reflections/micro?limit=10", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);

    let (status, body) = call(app(&db), Method::GET, "/api/reflections/micro?limit=101", Some("u1"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_LIMIT");
}

#[tokio::test]
async fn micro_log_delete_checks_owner() {
    let db = InMemoryDatabase::new();
    let seeded = db
        .seed(
            schema::MICRO_LOGS,
            vec![json!({ "user_id": "u1", "activity_type": "study", "mood_compare": "same", "date": "2024-05-01" })],
        )
        .unwrap();
    let id = seeded[0]["id"].as_str().unwrap();

    let (status, body) = call(app(&db), Method::DELETE, &format!("/api/reflections/micro/{id}"), Some("u2"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let (status, _) = call(app(&db), Method::DELETE, "/api/reflections/micro/missing", Some("u1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(app(&db), Method::DELETE, &format!("/api/reflections/micro/{id}"), Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(db.rows(schema::MICRO_LOGS).is_empty());
}

#[tokio::test]
async fn bookmarks_are_unique() {
    let db = InMemoryDatabase::new();
    let seeded = db
        .seed(
            schema::ACTIVITIES,
            vec![json!({ "title": "AI 해커톤", "url": "https://example.org/a", "status": "active", "bookmark_count": 0 })],
        )
        .unwrap();
    let id = seeded[0]["id"].as_str().unwrap();
    let uri = format!("/api/recommendations/activities/{id}/bookmark");

    let (status, _) = call(app(&db), Method::POST, &uri, Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(app(&db), Method::POST, &uri, Some("u1"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["detail"].is_string());
    assert_eq!(db.rows(schema::ACTIVITIES)[0]["bookmark_count"], 1);

    let (status, _) = call(
        app(&db),
        Method::POST,
        "/api/recommendations/activities/missing/bookmark",
        Some("u1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn notifications_unread_flow() {
    let db = InMemoryDatabase::new();
    let (status, created) = call(
        app(&db),
        Method::POST,
        "/api/notifications",
        Some("u1"),
        Some(json!({ "type": "system", "title": "환영합니다" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["data"]["notification"]["id"].as_str().unwrap().to_string();

    let (_, body) = call(app(&db), Method::GET, "/api/notifications/unread-count", Some("u1"), None).await;
    assert_eq!(body["data"]["count"], 1);

    let (status, _) = call(app(&db), Method::PATCH, &format!("/api/notifications/{id}/read"), Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(app(&db), Method::GET, "/api/notifications/unread-count", Some("u1"), None).await;
    assert_eq!(body["data"]["count"], 0);
    let (_, body) = call(app(&db), Method::GET, "/api/notifications?unread_only=true", Some("u1"), None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn health_check_is_one_per_day() {
    let db = InMemoryDatabase::new();
    for score in [40, 80] {
        let (status, body) = call(
            app(&db),
            Method::POST,
            "/api/health-check",
            Some("u1"),
            Some(json!({ "health_score": score, "date": "2024-05-01" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["health_score"], score);
    }
    assert_eq!(db.rows(schema::HEALTH_CHECKS).len(), 1);

    let (status, _) = call(
        app(&db),
        Method::POST,
        "/api/health-check",
        Some("u1"),
        Some(json!({ "health_score": 101 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = call(app(&db), Method::GET, "/api/health-check/latest", Some("u1"), None).await;
    assert_eq!(body["data"]["health_score"], 80);
}

#[tokio::test]
async fn only_recipient_answers_endorsement() {
    let db = InMemoryDatabase::new();
    let (_, created) = call(
        app(&db),
        Method::POST,
        "/api/endorsements",
        Some("alice"),
        Some(json!({ "to_user_id": "bob", "role": "PM", "keyword_ids": ["k1", "k2"] })),
    )
    .await;
    let id = created["data"]["endorsement"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["data"]["endorsement"]["status"], "pending");
    assert_eq!(db.rows(schema::ENDORSEMENT_KEYWORDS).len(), 2);

    let uri = format!("/api/endorsements/{id}/approve");
    let (status, _) = call(app(&db), Method::PATCH, &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(app(&db), Method::PATCH, &uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["endorsement"]["status"], "approved");
}

#[tokio::test]
async fn answered_endorsement_cannot_be_answered_again() {
    let db = InMemoryDatabase::new();
    let (_, created) = call(
        app(&db),
        Method::POST,
        "/api/endorsements",
        Some("alice"),
        Some(json!({ "to_user_id": "bob", "role": "PM", "keyword_ids": [] })),
    )
    .await;
    let id = created["data"]["endorsement"]["id"].as_str().unwrap().to_string();

    let approve = format!("/api/endorsements/{id}/approve");
    let (status, _) = call(app(&db), Method::PATCH, &approve, Some("bob"), None).await;
    assert_eq!(status, StatusCode::OK);

    let reject = format!("/api/endorsements/{id}/reject");
    let (status, body) = call(app(&db), Method::PATCH, &reject, Some("bob"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(db.rows(schema::PEER_ENDORSEMENTS)[0]["status"], "approved");
}

#[tokio::test]
async fn search_requires_query() {
    let db = InMemoryDatabase::new();
    db.seed(schema::PROJECTS, vec![json!({ "user_id": "u1", "name": "PROOF 백엔드" })])
        .unwrap();

    let (status, _) = call(app(&db), Method::GET, "/api/search?q=", Some("u1"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(app(&db), Method::GET, "/api/search?q=proof&type=projects", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["projects"][0]["name"], "PROOF 백엔드");
    assert!(body["data"]["logs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn project_members_need_owner() {
    let db = InMemoryDatabase::new();
    let (_, created) = call(
        app(&db),
        Method::POST,
        "/api/projects",
        Some("u1"),
        Some(json!({ "name": "PROOF" })),
    )
    .await;
    let id = created["data"]["project"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/projects/{id}/members");
    let member = json!({ "name": "Park", "role": "디자인" });

    let (status, _) = call(app(&db), Method::POST, &uri, Some("u2"), Some(member.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(app(&db), Method::POST, &uri, Some("u1"), Some(member)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(app(&db), Method::GET, &uri, Some("u1"), None).await;
    assert_eq!(body["data"]["members"][0]["is_leader"], false);
}

#[tokio::test]
async fn email_change_cannot_take_another_account() {
    let db = InMemoryDatabase::new();
    db.seed(
        schema::USERS,
        vec![
            json!({ "id": "a", "email": "a@proof.kr", "name": "A" }),
            json!({ "id": "b", "email": "b@proof.kr", "name": "B" }),
        ],
    )
    .unwrap();

    let (status, body) = call(
        app(&db),
        Method::PATCH,
        "/api/users/me",
        Some("b"),
        Some(json!({ "email": "a@proof.kr" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["detail"].is_string());
    let owners: Vec<_> = db
        .rows(schema::USERS)
        .into_iter()
        .filter(|u| u["email"] == "a@proof.kr")
        .collect();
    assert_eq!(owners.len(), 1);

    let (status, body) = call(
        app(&db),
        Method::PATCH,
        "/api/users/me",
        Some("b"),
        Some(json!({ "email": "b@proof.kr", "major": "경영학" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["major"], "경영학");
}

#[tokio::test]
async fn activity_list_limit_is_bounded() {
    let db = InMemoryDatabase::new();
    let activities: Vec<Value> = (0..105)
        .map(|i| json!({ "id": format!("act-{i}"), "title": format!("Activity {i}"), "category": "contest" }))
        .collect();
    db.seed(schema::ACTIVITIES, activities).unwrap();

    let (status, body) = call(app(&db), Method::GET, "/api/activities?limit=500", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 100);

    let (status, body) = call(app(&db), Method::GET, "/api/activities?limit=0", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

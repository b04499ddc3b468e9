//! Integration tests for qcrm-api endpoints
//!
//! Each test builds the router over a fresh in-memory database with one
//! admin and one rep profile, then drives it with `oneshot`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use qcrm_api::{build_router, AppState};
use qcrm_common::config::BookingConfig;
use qcrm_common::db::{init_memory_database, profiles, RetryPolicy};
use qcrm_common::integrations::{DisabledTranscriber, InvitationNotice, Notifier};
use qcrm_common::Role;
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot` method

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<InvitationNotice>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_invitation(&self, notice: &InvitationNotice) -> qcrm_common::Result<()> {
        self.sent.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

struct TestApp {
    router: Router,
    admin_token: String,
    rep_token: String,
    notifier: Arc<RecordingNotifier>,
}

async fn setup_app() -> TestApp {
    let pool = init_memory_database().await.unwrap();
    let admin = profiles::create_profile(&pool, "admin@example.com", Some("Ada"), Role::Admin)
        .await
        .unwrap();
    let rep = profiles::create_profile(&pool, "rep@example.com", Some("Rex"), Role::Rep)
        .await
        .unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState::new(
        pool,
        RetryPolicy::none(),
        Arc::new(DisabledTranscriber),
        notifier.clone(),
        BookingConfig {
            base_url: Some("https://cal.example.com/book".to_string()),
        },
    );

    TestApp {
        router: build_router(state),
        admin_token: admin.api_token,
        rep_token: rep.api_token,
        notifier,
    }
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Should parse JSON")
    };
    (status, body)
}

fn violation_fields(body: &Value) -> Vec<String> {
    body["error"]["violations"]
        .as_array()
        .expect("violations array")
        .iter()
        .map(|v| v["field"].as_str().unwrap_or_default().to_string())
        .collect()
}

// =============================================================================
// Health and authentication
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let app = setup_app().await;
    let (status, body) = send(&app, request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "qcrm-api");
    assert!(body["version"].is_string());
    assert!(body["schema_version"].is_number());
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let app = setup_app().await;

    let (status, body) = send(&app, request("GET", "/api/me", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = send(&app, request("GET", "/api/me", Some("bogus"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_hides_token() {
    let app = setup_app().await;
    let (status, body) = send(&app, request("GET", "/api/me", Some(&app.rep_token), None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "rep@example.com");
    assert_eq!(body["role"], "rep");
    assert!(body.get("api_token").is_none());
}

// =============================================================================
// Entities
// =============================================================================

#[tokio::test]
async fn test_create_list_and_get_company() {
    let app = setup_app().await;
    let token = Some(app.rep_token.as_str());

    let (status, created) = send(
        &app,
        request(
            "POST",
            "/api/entities/companies",
            token,
            Some(json!({"name": "Acme", "industry": "Manufacturing"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["guid"].as_str().unwrap().to_string();

    let (status, page) = send(
        &app,
        request("GET", "/api/entities/companies?search=acm", token, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["page"], 1);
    assert_eq!(page["items"][0]["name"], "Acme");

    let (status, fetched) = send(
        &app,
        request("GET", &format!("/api/entities/companies/{}", id), token, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["industry"], "Manufacturing");

    let (status, updated) = send(
        &app,
        request(
            "POST",
            "/api/entities/companies",
            token,
            Some(json!({"guid": id, "employee_count": 40})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Acme");
    assert_eq!(updated["employee_count"], 40);
}

#[tokio::test]
async fn test_invalid_payload_lists_every_field() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/entities/deals",
            Some(&app.rep_token),
            Some(json!({"value": -5, "stage": "won-ish", "probability": 140})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    let fields = violation_fields(&body);
    for field in ["name", "value", "stage", "probability"] {
        assert!(fields.iter().any(|f| f == field), "missing {}", field);
    }
}

#[tokio::test]
async fn test_wrong_json_type_does_not_hide_other_fields() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/entities/deals",
            Some(&app.rep_token),
            Some(json!({"value": "lots", "stage": "bogus", "probability": 400})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields = violation_fields(&body);
    for field in ["value", "name", "stage", "probability"] {
        assert!(fields.iter().any(|f| f == field), "missing {}", field);
    }
    assert!(!fields.iter().any(|f| f == "payload"));
}

#[tokio::test]
async fn test_unknown_kind_and_missing_entity() {
    let app = setup_app().await;
    let token = Some(app.rep_token.as_str());

    let (status, _) = send(&app, request("GET", "/api/entities/widgets", token, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        request(
            "GET",
            "/api/entities/deals/00000000-0000-4000-8000-000000000000",
            token,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_inapplicable_filter_is_rejected() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        request(
            "GET",
            "/api/entities/companies?stage=proposal",
            Some(&app.rep_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(violation_fields(&body), vec!["stage"]);
}

#[tokio::test]
async fn test_list_pagination() {
    let app = setup_app().await;
    let token = Some(app.rep_token.as_str());
    for name in ["A", "B", "C"] {
        send(
            &app,
            request(
                "POST",
                "/api/entities/products",
                token,
                Some(json!({"name": name, "price": 10})),
            ),
        )
        .await;
    }

    let (status, page) = send(
        &app,
        request(
            "GET",
            "/api/entities/products?page=2&page_size=2&sort=name&order=desc",
            token,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 3);
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["items"][0]["name"], "A");
}

// =============================================================================
// Qualification
// =============================================================================

#[tokio::test]
async fn test_stateless_score() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/qualifications/score",
            Some(&app.rep_token),
            Some(json!({"budget": "none", "authority": "none", "need": 0, "timeline": "no-timeline"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["score"], 0);
    assert_eq!(body["classification"], "cold");
    assert_eq!(body["booking_eligible"], false);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/qualifications/score",
            Some(&app.rep_token),
            Some(json!({"need": 11})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(violation_fields(&body), vec!["need"]);
}

#[tokio::test]
async fn test_session_flow_to_completion() {
    let app = setup_app().await;
    let token = Some(app.rep_token.as_str());

    let (status, session) = send(
        &app,
        request(
            "POST",
            "/api/qualifications/sessions",
            token,
            Some(json!({"client_name": "Globex"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["preview"]["score"], 0);
    let id = session["id"].as_str().unwrap().to_string();
    let base = format!("/api/qualifications/sessions/{}", id);

    let (status, updated) = send(
        &app,
        request(
            "PUT",
            &format!("{}/answers", base),
            token,
            Some(json!({"budget": "high", "authority": "sole", "need": 9, "timeline": "immediate"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["preview"]["score"], 98);
    assert_eq!(updated["preview"]["classification"], "hot");

    // Transcription is disabled, so the upload degrades to an empty transcript
    let upload = Request::builder()
        .method("POST")
        .uri(format!("{}/transcript", base))
        .header(header::AUTHORIZATION, format!("Bearer {}", app.rep_token))
        .header(header::CONTENT_TYPE, "audio/webm")
        .body(Body::from(vec![1u8, 2, 3, 4]))
        .unwrap();
    let (status, transcript) = send(&app, upload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transcript["text"], "");

    let (status, done) = send(&app, request("POST", &format!("{}/complete", base), token, None)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(done["record"]["score"], 98);
    assert_eq!(done["deal"]["stage"], "qualification");
    assert_eq!(done["activity"]["priority"], "high");
    assert_eq!(done["booking_eligible"], true);
    let url = done["booking_url"].as_str().unwrap();
    assert!(url.starts_with("https://cal.example.com/book?"));
    assert!(url.contains("score=98"));

    // The session is gone once completed
    let (status, _) = send(&app, request("GET", &base, token, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, records) = send(
        &app,
        request("GET", "/api/qualifications?classification=hot", token, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(records.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_completes_persist_once() {
    let app = setup_app().await;
    let token = Some(app.rep_token.as_str());
    let (_, session) = send(
        &app,
        request(
            "POST",
            "/api/qualifications/sessions",
            token,
            Some(json!({"client_name": "Hooli"})),
        ),
    )
    .await;
    let uri = format!(
        "/api/qualifications/sessions/{}/complete",
        session["id"].as_str().unwrap()
    );

    let ((first, _), (second, _)) = tokio::join!(
        send(&app, request("POST", &uri, token, None)),
        send(&app, request("POST", &uri, token, None)),
    );
    let mut statuses = vec![first, second];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::NOT_FOUND]);

    let (_, records) = send(&app, request("GET", "/api/qualifications", token, None)).await;
    assert_eq!(records.as_array().unwrap().len(), 1);
    let (_, deals) = send(&app, request("GET", "/api/entities/deals", token, None)).await;
    assert_eq!(deals["total"], 1);
}

#[tokio::test]
async fn test_sessions_hidden_from_other_users() {
    let app = setup_app().await;
    let (_, session) = send(
        &app,
        request(
            "POST",
            "/api/qualifications/sessions",
            Some(&app.rep_token),
            Some(json!({"client_name": "Initech"})),
        ),
    )
    .await;
    let uri = format!(
        "/api/qualifications/sessions/{}",
        session["id"].as_str().unwrap()
    );

    let (status, _) = send(&app, request("GET", &uri, Some(&app.admin_token), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, request("DELETE", &uri, Some(&app.admin_token), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, request("DELETE", &uri, Some(&app.rep_token), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_cold_lead_gets_no_booking_link() {
    let app = setup_app().await;
    let token = Some(app.rep_token.as_str());
    let (_, session) = send(
        &app,
        request(
            "POST",
            "/api/qualifications/sessions",
            token,
            Some(json!({"client_name": "Tiny Co"})),
        ),
    )
    .await;
    let id = session["id"].as_str().unwrap();

    let (status, done) = send(
        &app,
        request(
            "POST",
            &format!("/api/qualifications/sessions/{}/complete", id),
            token,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(done["record"]["classification"], "cold");
    assert_eq!(done["booking_eligible"], false);
    assert!(done["booking_url"].is_null());
}

// =============================================================================
// Export
// =============================================================================

#[tokio::test]
async fn test_export_entities_as_csv() {
    let app = setup_app().await;
    let token = Some(app.rep_token.as_str());
    send(
        &app,
        request(
            "POST",
            "/api/entities/companies",
            token,
            Some(json!({"name": "Acme, Ltd"})),
        ),
    )
    .await;

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/export/companies", token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"companies.csv\""
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    let header_line = csv.lines().next().unwrap();
    assert!(header_line.starts_with("name,"));
    assert!(!header_line.contains("guid"));
    assert!(csv.contains("\"Acme, Ltd\""));
}

#[tokio::test]
async fn test_export_qualifications_as_json() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        request(
            "GET",
            "/api/export/qualifications?format=json&include_transcripts=true",
            Some(&app.rep_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

// =============================================================================
// Invitations and settings
// =============================================================================

#[tokio::test]
async fn test_invitation_round_trip() {
    let app = setup_app().await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/invitations",
            Some(&app.rep_token),
            Some(json!({"email": "new@example.com"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, invitation) = send(
        &app,
        request(
            "POST",
            "/api/invitations",
            Some(&app.admin_token),
            Some(json!({"email": "New@Example.com", "role": "rep"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(invitation["email"], "new@example.com");
    assert_eq!(invitation["status"], "pending");
    assert!(invitation.get("token").is_none());

    let token = app.notifier.sent.lock().unwrap()[0].token.clone();
    let (status, accepted) = send(
        &app,
        request(
            "POST",
            "/api/invitations/accept",
            None,
            Some(json!({"token": token, "full_name": "Newbie"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(accepted["profile"]["role"], "rep");

    let new_token = accepted["api_token"].as_str().unwrap();
    let (status, me) = send(&app, request("GET", "/api/me", Some(new_token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["full_name"], "Newbie");
}

#[tokio::test]
async fn test_scoring_settings_admin_only() {
    let app = setup_app().await;

    let (status, current) = send(
        &app,
        request("GET", "/api/settings/scoring", Some(&app.rep_token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["thresholds"]["hot"], 75);

    let changed = json!({
        "weights": {"budget": 0.7, "authority": 0.1, "need": 0.1, "timeline": 0.1},
        "thresholds": {"hot": 80, "warm": 40},
        "booking_warm_min_score": 50
    });

    let (status, _) = send(
        &app,
        request(
            "PUT",
            "/api/settings/scoring",
            Some(&app.rep_token),
            Some(changed.clone()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, saved) = send(
        &app,
        request(
            "PUT",
            "/api/settings/scoring",
            Some(&app.admin_token),
            Some(changed),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["thresholds"]["hot"], 80);

    // Budget-heavy weights: only budget answered high scores 70
    let (_, scored) = send(
        &app,
        request(
            "POST",
            "/api/qualifications/score",
            Some(&app.rep_token),
            Some(json!({"budget": "high"})),
        ),
    )
    .await;
    assert_eq!(scored["score"], 70);
    assert_eq!(scored["classification"], "warm");
}

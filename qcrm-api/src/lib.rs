//! qcrm-api library - HTTP surface of Qualify CRM
//!
//! Thin axum handlers over `qcrm-common`: every request resolves its bearer
//! token to an [`Identity`](qcrm_common::Identity) and passes it explicitly
//! into the service layer.

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use qcrm_common::config::BookingConfig;
use qcrm_common::crm::CrmService;
use qcrm_common::db::RetryPolicy;
use qcrm_common::integrations::{Notifier, Transcriber};
use qcrm_common::qualification::SessionStore;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod pagination;

pub use error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub service: CrmService,
    /// Qualification sessions in progress
    pub sessions: SessionStore,
    pub transcriber: Arc<dyn Transcriber>,
    pub notifier: Arc<dyn Notifier>,
    pub booking: BookingConfig,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        retry: RetryPolicy,
        transcriber: Arc<dyn Transcriber>,
        notifier: Arc<dyn Notifier>,
        booking: BookingConfig,
    ) -> Self {
        Self {
            service: CrmService::with_retry(db.clone(), retry),
            db,
            sessions: SessionStore::new(),
            transcriber,
            notifier,
            booking,
            startup_time: Utc::now(),
        }
    }

    /// Replace the session store, e.g. to apply a configured idle timeout
    pub fn with_sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = sessions;
        self
    }
}

/// Build application router
///
/// Health, build info and invitation acceptance are public; everything
/// else requires a bearer token.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{delete, get, post, put};

    let protected = Router::new()
        .route("/api/me", get(api::get_me))
        .route(
            "/api/entities/:kind",
            get(api::list_entities).post(api::upsert_entity),
        )
        .route("/api/entities/:kind/:id", get(api::get_entity))
        .route("/api/dashboard/stats", get(api::dashboard_stats))
        .route("/api/dashboard/performance", get(api::sales_performance))
        .route("/api/qualifications", get(api::list_qualifications))
        .route("/api/qualifications/score", post(api::score_answers))
        .route(
            "/api/qualifications/sessions",
            get(api::list_sessions).post(api::start_session),
        )
        .route(
            "/api/qualifications/sessions/:id",
            get(api::get_session).delete(api::discard_session),
        )
        .route(
            "/api/qualifications/sessions/:id/answers",
            put(api::update_answers),
        )
        .route(
            "/api/qualifications/sessions/:id/transcript",
            post(api::upload_audio),
        )
        .route(
            "/api/qualifications/sessions/:id/complete",
            post(api::complete_session),
        )
        .route("/api/qualifications/:id", get(api::get_qualification))
        .route("/api/export/qualifications", get(api::export_qualifications))
        .route("/api/export/:kind", get(api::export_entities))
        .route(
            "/api/invitations",
            get(api::list_invitations).post(api::create_invitation),
        )
        .route("/api/invitations/:id", delete(api::revoke_invitation))
        .route(
            "/api/settings/scoring",
            get(api::get_scoring_config).put(api::put_scoring_config),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new()
        .route("/api/buildinfo", get(api::get_build_info))
        .route("/api/invitations/accept", post(api::accept_invitation))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

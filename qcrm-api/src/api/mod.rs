//! HTTP API handlers for qcrm-api

pub mod auth;
pub mod buildinfo;
pub mod dashboard;
pub mod entities;
pub mod export;
pub mod health;
pub mod invitations;
pub mod qualification;
pub mod settings;

pub use auth::{auth_middleware, get_me};
pub use buildinfo::get_build_info;
pub use dashboard::{dashboard_stats, sales_performance};
pub use entities::{get_entity, list_entities, upsert_entity};
pub use export::{export_entities, export_qualifications};
pub use health::health_routes;
pub use invitations::{accept_invitation, create_invitation, list_invitations, revoke_invitation};
pub use qualification::{
    complete_session, discard_session, get_qualification, get_session, list_qualifications,
    list_sessions, score_answers, start_session, update_answers, upload_audio,
};
pub use settings::{get_scoring_config, put_scoring_config};

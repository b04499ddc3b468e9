//! In-flight qualification sessions
//!
//! A session belongs to the identity that started it. The store hides other
//! users' sessions entirely: looking one up by id as a non-owner behaves
//! exactly like looking up an id that does not exist.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::answers::QualificationAnswers;
use super::scoring::{self, Classification, ScoreResult, ScoringConfig};
use crate::crm::{
    ActivityInput, ActivityPriority, ActivityStatus, ActivityType, DealInput, DealStage,
};
use crate::identity::Identity;
use crate::integrations::Transcript;
use crate::{Error, Result, Violations};

/// Request to open a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStart {
    pub client_name: Option<String>,
    pub company_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualificationSession {
    pub id: Uuid,
    pub owner: Uuid,
    pub client_name: String,
    pub company_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub answers: QualificationAnswers,
    pub transcript: Option<Transcript>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Drafts produced when a session completes
///
/// The deal is created first; the activity is linked to it by the service
/// once the deal id is known.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub result: ScoreResult,
    pub booking_eligible: bool,
    pub deal: DealInput,
    pub activity: ActivityInput,
}

impl QualificationSession {
    pub fn start(identity: &Identity, request: SessionStart) -> Result<Self> {
        let mut v = Violations::new();
        let client_name = request
            .client_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if client_name.is_none() {
            v.push("client_name", "is required");
        }

        let now = crate::time::now();
        v.finish(Self {
            id: Uuid::new_v4(),
            owner: identity.user_id,
            client_name: client_name.unwrap_or_default(),
            company_id: request.company_id,
            contact_id: request.contact_id,
            answers: QualificationAnswers::default(),
            transcript: None,
            started_at: now,
            updated_at: now,
        })
    }

    pub fn is_owned_by(&self, identity: &Identity) -> bool {
        self.owner == identity.user_id
    }

    /// Replace the full answer set
    pub fn set_answers(&mut self, answers: QualificationAnswers) {
        self.answers = answers;
        self.touch();
    }

    pub fn attach_transcript(&mut self, transcript: Transcript) {
        self.transcript = Some(transcript);
        self.touch();
    }

    /// Score of the current answers
    pub fn preview(&self, config: &ScoringConfig) -> ScoreResult {
        scoring::score(&self.answers, config)
    }

    pub fn outcome(&self, config: &ScoringConfig) -> CompletionOutcome {
        let result = self.preview(config);
        let transcript = self
            .transcript
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|t| t.text.clone());

        let deal = DealInput {
            company_id: self.company_id,
            contact_id: self.contact_id,
            name: Some(format!("{} qualification", self.client_name)),
            stage: Some(DealStage::Qualification.as_str().to_string()),
            probability: Some(result.score as i64),
            description: Some(format!(
                "Qualified as {} with a score of {}",
                result.classification, result.score
            )),
            ..Default::default()
        };

        let activity = ActivityInput {
            company_id: self.company_id,
            contact_id: self.contact_id,
            activity_type: Some(ActivityType::Call.as_str().to_string()),
            subject: Some(format!("Qualification call with {}", self.client_name)),
            description: transcript,
            status: Some(ActivityStatus::Completed.as_str().to_string()),
            priority: Some(priority_for(result.classification).as_str().to_string()),
            ..Default::default()
        };

        CompletionOutcome {
            booking_eligible: config.booking_eligible(&result),
            result,
            deal,
            activity,
        }
    }

    fn touch(&mut self) {
        self.updated_at = crate::time::now();
    }
}

/// Follow-up priority for a classified lead
pub fn priority_for(classification: Classification) -> ActivityPriority {
    match classification {
        Classification::Hot => ActivityPriority::High,
        Classification::Warm => ActivityPriority::Medium,
        Classification::Cold => ActivityPriority::Low,
    }
}

/// Idle time after which an untouched session is dropped
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Sessions in progress, keyed by id
///
/// Sessions idle for longer than the store's timeout are treated as gone
/// and evicted on the next insert or sweep.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, QualificationSession>>>,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn is_live(&self, session: &QualificationSession, now: DateTime<Utc>) -> bool {
        // A clock step backwards yields a negative age, which counts as fresh
        (now - session.updated_at)
            .to_std()
            .map_or(true, |age| age <= self.idle_timeout)
    }

    pub async fn insert(&self, session: QualificationSession) -> Uuid {
        let id = session.id;
        let mut sessions = self.sessions.write().await;
        self.evict_expired(&mut sessions);
        sessions.insert(id, session);
        id
    }

    /// Drop idle sessions; returns how many were removed
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        self.evict_expired(&mut sessions)
    }

    fn evict_expired(&self, sessions: &mut HashMap<Uuid, QualificationSession>) -> usize {
        let now = crate::time::now();
        let before = sessions.len();
        sessions.retain(|_, s| self.is_live(s, now));
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!("Evicted {} idle qualification session(s)", evicted);
        }
        evicted
    }

    /// Copy of the caller's session
    pub async fn get(&self, identity: &Identity, id: Uuid) -> Result<QualificationSession> {
        let now = crate::time::now();
        let sessions = self.sessions.read().await;
        sessions
            .get(&id)
            .filter(|s| s.is_owned_by(identity) && self.is_live(s, now))
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// The caller's sessions, oldest first
    pub async fn list(&self, identity: &Identity) -> Vec<QualificationSession> {
        let mut sessions = self.sessions.write().await;
        self.evict_expired(&mut sessions);
        let mut owned: Vec<_> = sessions
            .values()
            .filter(|s| s.is_owned_by(identity))
            .cloned()
            .collect();
        owned.sort_by_key(|s| s.started_at);
        owned
    }

    /// Apply `change` to the caller's session and return its result
    pub async fn update<T>(
        &self,
        identity: &Identity,
        id: Uuid,
        change: impl FnOnce(&mut QualificationSession) -> T,
    ) -> Result<T> {
        let now = crate::time::now();
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&id) {
            Some(session) if session.is_owned_by(identity) && self.is_live(session, now) => {
                Ok(change(session))
            }
            _ => Err(not_found(id)),
        }
    }

    /// Take the caller's session out of the store
    ///
    /// Only one caller can take a given session; every later call gets
    /// NotFound until the session is put back with [`insert`](Self::insert).
    pub async fn remove(&self, identity: &Identity, id: Uuid) -> Result<QualificationSession> {
        let now = crate::time::now();
        let mut sessions = self.sessions.write().await;
        let live = sessions
            .get(&id)
            .is_some_and(|s| s.is_owned_by(identity) && self.is_live(s, now));
        if !live {
            return Err(not_found(id));
        }
        sessions.remove(&id).ok_or_else(|| not_found(id))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

fn not_found(id: Uuid) -> Error {
    Error::NotFound(format!("qualification session {}", id))
}

//! Persisted qualification results
//!
//! Records are append-only. The score stored with a record is the one
//! computed from its answers at completion; there is no update path.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::info;
use uuid::Uuid;

use super::answers::{NeedUrgency, QualificationAnswers};
use super::scoring::{Classification, ScoringConfig};
use super::session::QualificationSession;
use crate::crm::service::upsert_in;
use crate::crm::{Activity, CrmService, Deal, Entity, EntityPayload};
use crate::db::{retry_on_unavailable, rows};
use crate::identity::Identity;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualificationRecord {
    pub guid: Uuid,
    pub client_name: String,
    pub company_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub activity_id: Option<Uuid>,
    pub answers: QualificationAnswers,
    pub transcript: String,
    pub transcript_source: Option<String>,
    pub score: u8,
    pub classification: Classification,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl QualificationRecord {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let need: Option<i64> = row.try_get("need")?;
        let need: Option<NeedUrgency> = need
            .map(|n| {
                NeedUrgency::new(n)
                    .map_err(|e| Error::Internal(format!("Corrupt value in column need: {}", e)))
            })
            .transpose()?;
        let score: i64 = row.try_get("score")?;

        Ok(Self {
            guid: rows::guid(row, "guid")?,
            client_name: row.try_get("client_name")?,
            company_id: rows::opt_guid(row, "company_id")?,
            contact_id: rows::opt_guid(row, "contact_id")?,
            deal_id: rows::opt_guid(row, "deal_id")?,
            activity_id: rows::opt_guid(row, "activity_id")?,
            answers: QualificationAnswers {
                budget: rows::opt_choice(row, "budget")?,
                authority: rows::opt_choice(row, "authority")?,
                need,
                timeline: rows::opt_choice(row, "timeline")?,
            },
            transcript: row.try_get("transcript")?,
            transcript_source: row.try_get("transcript_source")?,
            score: score.clamp(0, 100) as u8,
            classification: rows::choice(row, "classification")?,
            created_by: rows::opt_guid(row, "created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO qualifications (
                guid, client_name, company_id, contact_id, deal_id, activity_id,
                budget, authority, need, timeline, transcript, transcript_source,
                score, classification, created_by, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(self.guid.to_string())
        .bind(&self.client_name)
        .bind(rows::guid_text(self.company_id))
        .bind(rows::guid_text(self.contact_id))
        .bind(rows::guid_text(self.deal_id))
        .bind(rows::guid_text(self.activity_id))
        .bind(self.answers.budget.map(|b| b.as_str()))
        .bind(self.answers.authority.map(|a| a.as_str()))
        .bind(self.answers.need.map(i64::from))
        .bind(self.answers.timeline.map(|t| t.as_str()))
        .bind(&self.transcript)
        .bind(&self.transcript_source)
        .bind(self.score as i64)
        .bind(self.classification.as_str())
        .bind(rows::guid_text(self.created_by))
        .bind(self.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

/// Everything written when a session completes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedQualification {
    pub record: QualificationRecord,
    pub deal: Deal,
    pub activity: Activity,
    pub booking_eligible: bool,
}

impl CrmService {
    /// Persist the deal, call activity and record for a finished session
    ///
    /// All three rows are written in one transaction. The session itself is
    /// left untouched; the caller discards it once this succeeds.
    pub async fn complete_qualification(
        &self,
        identity: &Identity,
        session: &QualificationSession,
        config: &ScoringConfig,
    ) -> Result<CompletedQualification> {
        if !session.is_owned_by(identity) {
            return Err(Error::NotFound(format!(
                "qualification session {}",
                session.id
            )));
        }

        let outcome = session.outcome(config);

        let completed = retry_on_unavailable(self.retry_policy(), "complete_qualification", || {
            let outcome = outcome.clone();
            async move {
                let mut tx = self.pool().begin().await?;

                let deal = match upsert_in(&mut *tx, identity, EntityPayload::Deal(outcome.deal))
                    .await?
                {
                    Entity::Deal(deal) => deal,
                    other => return Err(unexpected(other)),
                };

                let mut activity_input = outcome.activity;
                activity_input.deal_id = Some(deal.guid);
                let activity =
                    match upsert_in(&mut *tx, identity, EntityPayload::Activity(activity_input))
                        .await?
                    {
                        Entity::Activity(activity) => activity,
                        other => return Err(unexpected(other)),
                    };

                let transcript = session.transcript.clone().unwrap_or_default();
                let record = QualificationRecord {
                    guid: Uuid::new_v4(),
                    client_name: session.client_name.clone(),
                    company_id: session.company_id,
                    contact_id: session.contact_id,
                    deal_id: Some(deal.guid),
                    activity_id: Some(activity.guid),
                    answers: session.answers,
                    transcript: transcript.text,
                    transcript_source: transcript.source,
                    score: outcome.result.score,
                    classification: outcome.result.classification,
                    created_by: Some(identity.user_id),
                    created_at: crate::time::now(),
                };
                record.insert(&mut *tx).await?;

                tx.commit().await?;
                Ok(CompletedQualification {
                    record,
                    deal,
                    activity,
                    booking_eligible: outcome.booking_eligible,
                })
            }
        })
        .await?;

        info!(
            session = %session.id,
            record = %completed.record.guid,
            deal = %completed.deal.guid,
            score = completed.record.score,
            classification = %completed.record.classification,
            "Qualification completed"
        );
        Ok(completed)
    }

    /// Stored qualifications, newest first
    pub async fn list_qualifications(
        &self,
        classification: Option<Classification>,
    ) -> Result<Vec<QualificationRecord>> {
        retry_on_unavailable(self.retry_policy(), "list_qualifications", || async move {
            let rows = match classification {
                Some(c) => {
                    sqlx::query(
                        "SELECT * FROM qualifications WHERE classification = ? \
                         ORDER BY created_at DESC, rowid DESC",
                    )
                    .bind(c.as_str())
                    .fetch_all(self.pool())
                    .await?
                }
                None => {
                    sqlx::query("SELECT * FROM qualifications ORDER BY created_at DESC, rowid DESC")
                        .fetch_all(self.pool())
                        .await?
                }
            };
            rows.iter().map(QualificationRecord::from_row).collect()
        })
        .await
    }

    pub async fn get_qualification(&self, id: Uuid) -> Result<QualificationRecord> {
        let row = retry_on_unavailable(self.retry_policy(), "get_qualification", || async move {
            Ok(sqlx::query("SELECT * FROM qualifications WHERE guid = ?")
                .bind(id.to_string())
                .fetch_optional(self.pool())
                .await?)
        })
        .await?;

        match row {
            Some(row) => QualificationRecord::from_row(&row),
            None => Err(Error::NotFound(format!("qualification {}", id))),
        }
    }
}

fn unexpected(entity: Entity) -> Error {
    Error::Internal(format!("upsert returned a {}", entity.kind().label()))
}

//! Activity entity
//!
//! `completed_at` is present exactly when the status is completed: it is
//! stamped on completion and cleared when an activity is reopened or
//! cancelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::model::{ActivityPriority, ActivityStatus, ActivityType};
use super::validate::{self, Stamp};
use crate::db::rows;
use crate::identity::Identity;
use crate::{Error, Result, Violations};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub guid: Uuid,
    pub company_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub subject: String,
    pub description: Option<String>,
    pub status: ActivityStatus,
    pub priority: ActivityPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Activity {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            guid: rows::guid(row, "guid")?,
            company_id: rows::opt_guid(row, "company_id")?,
            contact_id: rows::opt_guid(row, "contact_id")?,
            deal_id: rows::opt_guid(row, "deal_id")?,
            activity_type: rows::choice(row, "activity_type")?,
            subject: row.try_get("subject")?,
            description: row.try_get("description")?,
            status: rows::choice(row, "status")?,
            priority: rows::choice(row, "priority")?,
            due_date: row.try_get("due_date")?,
            completed_at: row.try_get("completed_at")?,
            assigned_to: rows::opt_guid(row, "assigned_to")?,
            created_by: rows::opt_guid(row, "created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Submitted activity fields; absent fields keep their stored value on update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityInput {
    pub guid: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub activity_type: Option<String>,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
    /// Fields dropped while decoding because their JSON type was wrong
    #[serde(skip)]
    pub rejected: Violations,
}

impl ActivityInput {
    fn overlay(self, base: &Activity) -> Self {
        let completed_at = match (&self.status, self.completed_at) {
            (_, Some(explicit)) => Some(explicit),
            // A status change keeps the old stamp only if it stays completed
            (Some(status), None) => {
                if status.trim() == ActivityStatus::Completed.as_str() {
                    base.completed_at
                } else {
                    None
                }
            }
            (None, None) => base.completed_at,
        };

        Self {
            guid: Some(base.guid),
            company_id: self.company_id.or(base.company_id),
            contact_id: self.contact_id.or(base.contact_id),
            deal_id: self.deal_id.or(base.deal_id),
            activity_type: self
                .activity_type
                .or_else(|| Some(base.activity_type.as_str().to_string())),
            subject: self.subject.or_else(|| Some(base.subject.clone())),
            description: self.description.or_else(|| base.description.clone()),
            status: self.status.or_else(|| Some(base.status.as_str().to_string())),
            priority: self.priority.or_else(|| Some(base.priority.as_str().to_string())),
            due_date: self.due_date.or(base.due_date),
            completed_at,
            assigned_to: self.assigned_to.or(base.assigned_to),
            rejected: self.rejected,
        }
    }

    fn validate(self, stamp: Stamp, identity: &Identity) -> Result<Activity> {
        let mut v = Violations::new();

        let activity_type =
            validate::required_choice(&mut v, "type", self.activity_type, ActivityType::Task);
        let subject = validate::required_text(&mut v, "subject", self.subject);
        let status = validate::choice(&mut v, "status", self.status, ActivityStatus::Pending);
        let priority =
            validate::choice(&mut v, "priority", self.priority, ActivityPriority::Medium);

        let completed_at = if status == ActivityStatus::Completed {
            Some(self.completed_at.unwrap_or(stamp.updated_at))
        } else {
            if self.completed_at.is_some() {
                v.push("completed_at", "may only be set when status is 'completed'");
            }
            None
        };

        let assigned_to = match (self.assigned_to, stamp.creating) {
            (None, true) => Some(identity.user_id),
            (assigned, _) => assigned,
        };

        self.rejected.merge(v).finish(Activity {
            guid: stamp.guid,
            company_id: self.company_id,
            contact_id: self.contact_id,
            deal_id: self.deal_id,
            activity_type,
            subject,
            description: validate::optional_text(self.description),
            status,
            priority,
            due_date: self.due_date,
            completed_at,
            assigned_to,
            created_by: stamp.created_by,
            created_at: stamp.created_at,
            updated_at: stamp.updated_at,
        })
    }
}

pub(crate) async fn fetch<'e, E>(executor: E, id: Uuid) -> Result<Option<Activity>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM activities WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(Activity::from_row).transpose()
}

pub(crate) async fn upsert(
    conn: &mut SqliteConnection,
    identity: &Identity,
    input: ActivityInput,
) -> Result<Activity> {
    let now = crate::time::now();
    let activity = match input.guid {
        None => input.validate(Stamp::create(identity, now), identity)?,
        Some(id) => {
            let base = fetch(&mut *conn, id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("activity {}", id)))?;
            let stamp = Stamp::update(base.guid, base.created_by, base.created_at, now);
            input.overlay(&base).validate(stamp, identity)?
        }
    };

    sqlx::query(
        r#"
        INSERT INTO activities (
            guid, company_id, contact_id, deal_id, activity_type, subject, description,
            status, priority, due_date, completed_at, assigned_to, created_by,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(guid) DO UPDATE SET
            company_id = excluded.company_id,
            contact_id = excluded.contact_id,
            deal_id = excluded.deal_id,
            activity_type = excluded.activity_type,
            subject = excluded.subject,
            description = excluded.description,
            status = excluded.status,
            priority = excluded.priority,
            due_date = excluded.due_date,
            completed_at = excluded.completed_at,
            assigned_to = excluded.assigned_to,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(activity.guid.to_string())
    .bind(rows::guid_text(activity.company_id))
    .bind(rows::guid_text(activity.contact_id))
    .bind(rows::guid_text(activity.deal_id))
    .bind(activity.activity_type.as_str())
    .bind(&activity.subject)
    .bind(&activity.description)
    .bind(activity.status.as_str())
    .bind(activity.priority.as_str())
    .bind(activity.due_date)
    .bind(activity.completed_at)
    .bind(rows::guid_text(activity.assigned_to))
    .bind(rows::guid_text(activity.created_by))
    .bind(activity.created_at)
    .bind(activity.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(activity)
}

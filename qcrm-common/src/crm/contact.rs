//! Contact entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::model::ContactStatus;
use super::validate::{self, Stamp};
use crate::db::rows;
use crate::identity::Identity;
use crate::{Error, Result, Violations};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub guid: Uuid,
    pub company_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub status: ContactStatus,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            guid: rows::guid(row, "guid")?,
            company_id: rows::opt_guid(row, "company_id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            job_title: row.try_get("job_title")?,
            status: rows::choice(row, "status")?,
            notes: row.try_get("notes")?,
            assigned_to: rows::opt_guid(row, "assigned_to")?,
            created_by: rows::opt_guid(row, "created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Submitted contact fields; absent fields keep their stored value on update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactInput {
    pub guid: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
    /// Fields dropped while decoding because their JSON type was wrong
    #[serde(skip)]
    pub rejected: Violations,
}

impl ContactInput {
    fn overlay(self, base: &Contact) -> Self {
        Self {
            guid: Some(base.guid),
            company_id: self.company_id.or(base.company_id),
            first_name: self.first_name.or_else(|| Some(base.first_name.clone())),
            last_name: self.last_name.or_else(|| Some(base.last_name.clone())),
            email: self.email.or_else(|| base.email.clone()),
            phone: self.phone.or_else(|| base.phone.clone()),
            job_title: self.job_title.or_else(|| base.job_title.clone()),
            status: self.status.or_else(|| Some(base.status.as_str().to_string())),
            notes: self.notes.or_else(|| base.notes.clone()),
            assigned_to: self.assigned_to.or(base.assigned_to),
            rejected: self.rejected,
        }
    }

    fn validate(self, stamp: Stamp, identity: &Identity) -> Result<Contact> {
        let mut v = Violations::new();

        let first_name = validate::required_text(&mut v, "first_name", self.first_name);
        let last_name = validate::required_text(&mut v, "last_name", self.last_name);
        let email = validate::email(&mut v, "email", self.email);
        let status = validate::choice(&mut v, "status", self.status, ContactStatus::Active);

        let assigned_to = match (self.assigned_to, stamp.creating) {
            (None, true) => Some(identity.user_id),
            (assigned, _) => assigned,
        };

        self.rejected.merge(v).finish(Contact {
            guid: stamp.guid,
            company_id: self.company_id,
            first_name,
            last_name,
            email,
            phone: validate::optional_text(self.phone),
            job_title: validate::optional_text(self.job_title),
            status,
            notes: validate::optional_text(self.notes),
            assigned_to,
            created_by: stamp.created_by,
            created_at: stamp.created_at,
            updated_at: stamp.updated_at,
        })
    }
}

pub(crate) async fn fetch<'e, E>(executor: E, id: Uuid) -> Result<Option<Contact>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM contacts WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(Contact::from_row).transpose()
}

pub(crate) async fn upsert(
    conn: &mut SqliteConnection,
    identity: &Identity,
    input: ContactInput,
) -> Result<Contact> {
    let now = crate::time::now();
    let contact = match input.guid {
        None => input.validate(Stamp::create(identity, now), identity)?,
        Some(id) => {
            let base = fetch(&mut *conn, id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("contact {}", id)))?;
            let stamp = Stamp::update(base.guid, base.created_by, base.created_at, now);
            input.overlay(&base).validate(stamp, identity)?
        }
    };

    sqlx::query(
        r#"
        INSERT INTO contacts (
            guid, company_id, first_name, last_name, email, phone, job_title, status,
            notes, assigned_to, created_by, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(guid) DO UPDATE SET
            company_id = excluded.company_id,
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            email = excluded.email,
            phone = excluded.phone,
            job_title = excluded.job_title,
            status = excluded.status,
            notes = excluded.notes,
            assigned_to = excluded.assigned_to,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(contact.guid.to_string())
    .bind(rows::guid_text(contact.company_id))
    .bind(&contact.first_name)
    .bind(&contact.last_name)
    .bind(&contact.email)
    .bind(&contact.phone)
    .bind(&contact.job_title)
    .bind(contact.status.as_str())
    .bind(&contact.notes)
    .bind(rows::guid_text(contact.assigned_to))
    .bind(rows::guid_text(contact.created_by))
    .bind(contact.created_at)
    .bind(contact.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(contact)
}

//! Deal entity
//!
//! Stage and status are kept consistent on every write: a closed-won deal is
//! always won, a closed-lost deal always lost.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::model::{DealStage, DealStatus};
use super::validate::{self, Stamp};
use crate::db::rows;
use crate::identity::Identity;
use crate::{Error, Result, Violations};

pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub guid: Uuid,
    pub company_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub name: String,
    pub value: f64,
    pub currency: String,
    pub stage: DealStage,
    pub probability: i64,
    pub status: DealStatus,
    pub expected_close_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            guid: rows::guid(row, "guid")?,
            company_id: rows::opt_guid(row, "company_id")?,
            contact_id: rows::opt_guid(row, "contact_id")?,
            name: row.try_get("name")?,
            value: row.try_get("value")?,
            currency: row.try_get("currency")?,
            stage: rows::choice(row, "stage")?,
            probability: row.try_get("probability")?,
            status: rows::choice(row, "status")?,
            expected_close_date: row.try_get("expected_close_date")?,
            description: row.try_get("description")?,
            assigned_to: rows::opt_guid(row, "assigned_to")?,
            created_by: rows::opt_guid(row, "created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Submitted deal fields; absent fields keep their stored value on update
///
/// Changing `stage` without giving `status` or `probability` re-derives
/// them from the new stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DealInput {
    pub guid: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub name: Option<String>,
    pub value: Option<f64>,
    pub currency: Option<String>,
    pub stage: Option<String>,
    pub probability: Option<i64>,
    pub status: Option<String>,
    pub expected_close_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    /// Fields dropped while decoding because their JSON type was wrong
    #[serde(skip)]
    pub rejected: Violations,
}

impl DealInput {
    fn overlay(self, base: &Deal) -> Self {
        let stage_changed = self.stage.is_some();
        Self {
            guid: Some(base.guid),
            company_id: self.company_id.or(base.company_id),
            contact_id: self.contact_id.or(base.contact_id),
            name: self.name.or_else(|| Some(base.name.clone())),
            value: self.value.or(Some(base.value)),
            currency: self.currency.or_else(|| Some(base.currency.clone())),
            stage: self.stage.or_else(|| Some(base.stage.as_str().to_string())),
            probability: if stage_changed {
                self.probability
            } else {
                self.probability.or(Some(base.probability))
            },
            status: if stage_changed {
                self.status
            } else {
                self.status.or_else(|| Some(base.status.as_str().to_string()))
            },
            expected_close_date: self.expected_close_date.or(base.expected_close_date),
            description: self.description.or_else(|| base.description.clone()),
            assigned_to: self.assigned_to.or(base.assigned_to),
            rejected: self.rejected,
        }
    }

    fn validate(self, stamp: Stamp, identity: &Identity) -> Result<Deal> {
        let mut v = Violations::new();

        let name = validate::required_text(&mut v, "name", self.name);
        let value = validate::non_negative(&mut v, "value", self.value.unwrap_or(0.0));
        let currency = validate_currency(&mut v, self.currency);
        let stage = validate::choice(&mut v, "stage", self.stage, DealStage::Prospecting);
        let probability = validate::int_range(
            &mut v,
            "probability",
            self.probability.unwrap_or_else(|| stage.default_probability()),
            0,
            100,
        );

        let derived = stage.implied_status().unwrap_or(DealStatus::Open);
        let status = validate::choice(&mut v, "status", self.status, derived);
        if let Some(required) = stage.implied_status() {
            if status != required {
                v.push(
                    "status",
                    format!("must be '{}' when stage is '{}'", required, stage),
                );
            }
        }

        let assigned_to = match (self.assigned_to, stamp.creating) {
            (None, true) => Some(identity.user_id),
            (assigned, _) => assigned,
        };

        self.rejected.merge(v).finish(Deal {
            guid: stamp.guid,
            company_id: self.company_id,
            contact_id: self.contact_id,
            name,
            value,
            currency,
            stage,
            probability,
            status,
            expected_close_date: self.expected_close_date,
            description: validate::optional_text(self.description),
            assigned_to,
            created_by: stamp.created_by,
            created_at: stamp.created_at,
            updated_at: stamp.updated_at,
        })
    }
}

/// Three-letter code, upper-cased; defaults to USD
fn validate_currency(v: &mut Violations, currency: Option<String>) -> String {
    let code = validate::optional_text(currency)
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
        .to_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        v.push("currency", "must be a three-letter currency code");
    }
    code
}

pub(crate) async fn fetch<'e, E>(executor: E, id: Uuid) -> Result<Option<Deal>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM deals WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(Deal::from_row).transpose()
}

pub(crate) async fn upsert(
    conn: &mut SqliteConnection,
    identity: &Identity,
    input: DealInput,
) -> Result<Deal> {
    let now = crate::time::now();
    let deal = match input.guid {
        None => input.validate(Stamp::create(identity, now), identity)?,
        Some(id) => {
            let base = fetch(&mut *conn, id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("deal {}", id)))?;
            let stamp = Stamp::update(base.guid, base.created_by, base.created_at, now);
            input.overlay(&base).validate(stamp, identity)?
        }
    };

    sqlx::query(
        r#"
        INSERT INTO deals (
            guid, company_id, contact_id, name, value, currency, stage, probability,
            status, expected_close_date, description, assigned_to, created_by,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(guid) DO UPDATE SET
            company_id = excluded.company_id,
            contact_id = excluded.contact_id,
            name = excluded.name,
            value = excluded.value,
            currency = excluded.currency,
            stage = excluded.stage,
            probability = excluded.probability,
            status = excluded.status,
            expected_close_date = excluded.expected_close_date,
            description = excluded.description,
            assigned_to = excluded.assigned_to,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(deal.guid.to_string())
    .bind(rows::guid_text(deal.company_id))
    .bind(rows::guid_text(deal.contact_id))
    .bind(&deal.name)
    .bind(deal.value)
    .bind(&deal.currency)
    .bind(deal.stage.as_str())
    .bind(deal.probability)
    .bind(deal.status.as_str())
    .bind(deal.expected_close_date)
    .bind(&deal.description)
    .bind(rows::guid_text(deal.assigned_to))
    .bind(rows::guid_text(deal.created_by))
    .bind(deal.created_at)
    .bind(deal.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(deal)
}

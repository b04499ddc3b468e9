//! Company entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::validate::{self, Stamp};
use crate::db::rows;
use crate::identity::Identity;
use crate::{Error, Result, Violations};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub guid: Uuid,
    pub name: String,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub annual_revenue: Option<f64>,
    pub employee_count: Option<i64>,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Submitted company fields; absent fields keep their stored value on update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyInput {
    pub guid: Option<Uuid>,
    pub name: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub annual_revenue: Option<f64>,
    pub employee_count: Option<i64>,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
    /// Fields dropped while decoding because their JSON type was wrong
    #[serde(skip)]
    pub rejected: Violations,
}

impl CompanyInput {
    fn overlay(self, base: &Company) -> Self {
        Self {
            guid: Some(base.guid),
            name: self.name.or_else(|| Some(base.name.clone())),
            industry: self.industry.or_else(|| base.industry.clone()),
            website: self.website.or_else(|| base.website.clone()),
            email: self.email.or_else(|| base.email.clone()),
            phone: self.phone.or_else(|| base.phone.clone()),
            address: self.address.or_else(|| base.address.clone()),
            annual_revenue: self.annual_revenue.or(base.annual_revenue),
            employee_count: self.employee_count.or(base.employee_count),
            notes: self.notes.or_else(|| base.notes.clone()),
            assigned_to: self.assigned_to.or(base.assigned_to),
            rejected: self.rejected,
        }
    }

    fn validate(self, stamp: Stamp, identity: &Identity) -> Result<Company> {
        let mut v = Violations::new();

        let name = validate::required_text(&mut v, "name", self.name);
        let email = validate::email(&mut v, "email", self.email);
        let annual_revenue = self
            .annual_revenue
            .map(|r| validate::non_negative(&mut v, "annual_revenue", r));
        let employee_count = self
            .employee_count
            .map(|c| validate::at_least(&mut v, "employee_count", c, 0));

        let assigned_to = match (self.assigned_to, stamp.creating) {
            (None, true) => Some(identity.user_id),
            (assigned, _) => assigned,
        };

        self.rejected.merge(v).finish(Company {
            guid: stamp.guid,
            name,
            industry: validate::optional_text(self.industry),
            website: validate::optional_text(self.website),
            email,
            phone: validate::optional_text(self.phone),
            address: validate::optional_text(self.address),
            annual_revenue,
            employee_count,
            notes: validate::optional_text(self.notes),
            assigned_to,
            created_by: stamp.created_by,
            created_at: stamp.created_at,
            updated_at: stamp.updated_at,
        })
    }
}

impl Company {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            guid: rows::guid(row, "guid")?,
            name: row.try_get("name")?,
            industry: row.try_get("industry")?,
            website: row.try_get("website")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            address: row.try_get("address")?,
            annual_revenue: row.try_get("annual_revenue")?,
            employee_count: row.try_get("employee_count")?,
            notes: row.try_get("notes")?,
            assigned_to: rows::opt_guid(row, "assigned_to")?,
            created_by: rows::opt_guid(row, "created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

pub(crate) async fn fetch<'e, E>(executor: E, id: Uuid) -> Result<Option<Company>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM companies WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(Company::from_row).transpose()
}

pub(crate) async fn upsert(
    conn: &mut SqliteConnection,
    identity: &Identity,
    input: CompanyInput,
) -> Result<Company> {
    let now = crate::time::now();
    let company = match input.guid {
        None => input.validate(Stamp::create(identity, now), identity)?,
        Some(id) => {
            let base = fetch(&mut *conn, id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("company {}", id)))?;
            let stamp = Stamp::update(base.guid, base.created_by, base.created_at, now);
            input.overlay(&base).validate(stamp, identity)?
        }
    };

    sqlx::query(
        r#"
        INSERT INTO companies (
            guid, name, industry, website, email, phone, address, annual_revenue,
            employee_count, notes, assigned_to, created_by, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(guid) DO UPDATE SET
            name = excluded.name,
            industry = excluded.industry,
            website = excluded.website,
            email = excluded.email,
            phone = excluded.phone,
            address = excluded.address,
            annual_revenue = excluded.annual_revenue,
            employee_count = excluded.employee_count,
            notes = excluded.notes,
            assigned_to = excluded.assigned_to,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(company.guid.to_string())
    .bind(&company.name)
    .bind(&company.industry)
    .bind(&company.website)
    .bind(&company.email)
    .bind(&company.phone)
    .bind(&company.address)
    .bind(company.annual_revenue)
    .bind(company.employee_count)
    .bind(&company.notes)
    .bind(rows::guid_text(company.assigned_to))
    .bind(rows::guid_text(company.created_by))
    .bind(company.created_at)
    .bind(company.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(company)
}

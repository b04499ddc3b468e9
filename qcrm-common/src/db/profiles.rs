//! Team member profiles and bearer-token identity resolution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::db::rows;
use crate::identity::{Identity, Role};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub guid: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    /// Bearer token; never serialized into API responses
    #[serde(skip_serializing)]
    pub api_token: String,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn identity(&self) -> Identity {
        Identity::new(self.guid, self.role)
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            guid: rows::guid(row, "guid")?,
            email: row.try_get("email")?,
            full_name: row.try_get("full_name")?,
            role: rows::choice(row, "role")?,
            api_token: row.try_get("api_token")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Fresh opaque API token
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Insert a profile with a newly generated token
pub async fn create_profile(
    pool: &SqlitePool,
    email: &str,
    full_name: Option<&str>,
    role: Role,
) -> Result<Profile> {
    let mut conn = pool.acquire().await?;
    insert_profile(&mut *conn, email, full_name, role).await
}

/// [`create_profile`] on a caller-supplied connection or transaction
pub async fn insert_profile(
    conn: &mut SqliteConnection,
    email: &str,
    full_name: Option<&str>,
    role: Role,
) -> Result<Profile> {
    let email = email.trim().to_lowercase();
    if find_by_email(&mut *conn, &email).await?.is_some() {
        return Err(Error::invalid("email", format!("{} already has a profile", email)));
    }

    let profile = Profile {
        guid: Uuid::new_v4(),
        email,
        full_name: full_name.map(str::to_string),
        role,
        api_token: generate_token(),
        created_at: crate::time::now(),
    };

    sqlx::query(
        "INSERT INTO profiles (guid, email, full_name, role, api_token, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(profile.guid.to_string())
    .bind(&profile.email)
    .bind(&profile.full_name)
    .bind(profile.role.as_str())
    .bind(&profile.api_token)
    .bind(profile.created_at)
    .execute(&mut *conn)
    .await?;

    info!(email = %profile.email, role = %profile.role, "Created profile");
    Ok(profile)
}

pub async fn find_by_token(pool: &SqlitePool, token: &str) -> Result<Option<Profile>> {
    let row = sqlx::query("SELECT * FROM profiles WHERE api_token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(Profile::from_row).transpose()
}

pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Profile>> {
    let row = sqlx::query("SELECT * FROM profiles WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(Profile::from_row).transpose()
}

pub async fn find_by_email<'e, E>(executor: E, email: &str) -> Result<Option<Profile>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM profiles WHERE email = ?")
        .bind(email.trim().to_lowercase())
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(Profile::from_row).transpose()
}

/// Create the first admin when the profiles table is empty
///
/// Returns the new profile (so the caller can report its token) or `None`
/// when profiles already exist.
pub async fn ensure_bootstrap_admin(pool: &SqlitePool, email: &str) -> Result<Option<Profile>> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(None);
    }
    create_profile(pool, email, Some("Administrator"), Role::Admin)
        .await
        .map(Some)
}

//! Team invitations
//!
//! Admins invite a teammate by email with a role. The invitation carries a
//! random token that is handed to the [`Notifier`]; presenting the token
//! while the invitation is still pending creates the profile.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::crm::validate;
use crate::db::profiles::{self, generate_token, Profile};
use crate::db::rows;
use crate::identity::{Identity, Role};
use crate::integrations::{InvitationNotice, Notifier};
use crate::{Error, Result, Violations};

text_enum! {
    pub enum InvitationStatus {
        Pending => "pending",
        Accepted => "accepted",
        Revoked => "revoked",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invitation {
    pub guid: Uuid,
    pub email: String,
    pub role: Role,
    /// Only ever delivered through the notifier
    #[serde(skip_serializing)]
    pub token: String,
    pub status: InvitationStatus,
    pub invited_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Invitation {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            guid: rows::guid(row, "guid")?,
            email: row.try_get("email")?,
            role: rows::choice(row, "role")?,
            token: row.try_get("token")?,
            status: rows::choice(row, "status")?,
            invited_by: rows::opt_guid(row, "invited_by")?,
            created_at: row.try_get("created_at")?,
            accepted_at: row.try_get("accepted_at")?,
        })
    }
}

/// Store a pending invitation and hand it to `notifier`
///
/// An invitation the notifier fails to deliver is deleted again.
pub async fn create_invitation(
    pool: &SqlitePool,
    notifier: &dyn Notifier,
    identity: &Identity,
    email: &str,
    role: Role,
) -> Result<Invitation> {
    identity.require_admin("inviting team members")?;

    let mut v = Violations::new();
    let email = validate::email(&mut v, "email", Some(email.to_string()))
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if email.is_empty() && v.is_empty() {
        v.push("email", "is required");
    }
    if v.is_empty() {
        if profiles::find_by_email(pool, &email).await?.is_some() {
            v.push("email", "already belongs to a team member");
        } else if find_pending_for(pool, &email).await?.is_some() {
            v.push("email", "already has a pending invitation");
        }
    }

    let invitation = v.finish(Invitation {
        guid: Uuid::new_v4(),
        email,
        role,
        token: generate_token(),
        status: InvitationStatus::Pending,
        invited_by: Some(identity.user_id),
        created_at: crate::time::now(),
        accepted_at: None,
    })?;

    // Committed before dispatch so a slow notifier never holds the write lock
    sqlx::query(
        "INSERT INTO invitations (guid, email, role, token, status, invited_by, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(invitation.guid.to_string())
    .bind(&invitation.email)
    .bind(invitation.role.as_str())
    .bind(&invitation.token)
    .bind(invitation.status.as_str())
    .bind(rows::guid_text(invitation.invited_by))
    .bind(invitation.created_at)
    .execute(pool)
    .await?;

    let sent = notifier
        .send_invitation(&InvitationNotice {
            email: invitation.email.clone(),
            role: invitation.role,
            token: invitation.token.clone(),
            invited_by: Some(identity.user_id.to_string()),
        })
        .await;
    if let Err(e) = sent {
        // Undelivered invitations are withdrawn so the email can be invited again
        if let Err(cleanup) = sqlx::query("DELETE FROM invitations WHERE guid = ?")
            .bind(invitation.guid.to_string())
            .execute(pool)
            .await
        {
            warn!(
                email = %invitation.email,
                "Could not withdraw undelivered invitation: {}",
                cleanup
            );
        }
        return Err(e);
    }

    info!(email = %invitation.email, role = %invitation.role, "Invitation created");
    Ok(invitation)
}

/// Every invitation, newest first (admin only)
pub async fn list_invitations(pool: &SqlitePool, identity: &Identity) -> Result<Vec<Invitation>> {
    identity.require_admin("listing invitations")?;

    let rows = sqlx::query("SELECT * FROM invitations ORDER BY created_at DESC, rowid DESC")
        .fetch_all(pool)
        .await?;
    rows.iter().map(Invitation::from_row).collect()
}

/// Withdraw a pending invitation (admin only)
pub async fn revoke_invitation(
    pool: &SqlitePool,
    identity: &Identity,
    id: Uuid,
) -> Result<Invitation> {
    identity.require_admin("revoking invitations")?;

    let row = sqlx::query("SELECT * FROM invitations WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    let mut invitation = match row {
        Some(row) => Invitation::from_row(&row)?,
        None => return Err(Error::NotFound(format!("invitation {}", id))),
    };
    if invitation.status != InvitationStatus::Pending {
        return Err(Error::invalid(
            "status",
            format!("invitation is already {}", invitation.status),
        ));
    }

    sqlx::query("UPDATE invitations SET status = ? WHERE guid = ?")
        .bind(InvitationStatus::Revoked.as_str())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    invitation.status = InvitationStatus::Revoked;

    info!(email = %invitation.email, "Invitation revoked");
    Ok(invitation)
}

/// Redeem a pending invitation, creating the invitee's profile
///
/// Unknown, accepted and revoked tokens all report NotFound.
pub async fn accept_invitation(
    pool: &SqlitePool,
    token: &str,
    full_name: Option<&str>,
) -> Result<Profile> {
    let row = sqlx::query("SELECT * FROM invitations WHERE token = ? AND status = ?")
        .bind(token.trim())
        .bind(InvitationStatus::Pending.as_str())
        .fetch_optional(pool)
        .await?;
    let invitation = match row {
        Some(row) => Invitation::from_row(&row)?,
        None => return Err(Error::NotFound("invitation".to_string())),
    };

    let full_name = full_name.map(str::trim).filter(|n| !n.is_empty());

    // Claiming the invitation and creating the profile commit together; a
    // concurrent accept of the same token finds nothing left to claim
    let mut tx = pool.begin().await?;
    let claimed = sqlx::query(
        "UPDATE invitations SET status = ?, accepted_at = ? WHERE guid = ? AND status = ?",
    )
    .bind(InvitationStatus::Accepted.as_str())
    .bind(crate::time::now())
    .bind(invitation.guid.to_string())
    .bind(InvitationStatus::Pending.as_str())
    .execute(&mut *tx)
    .await?;
    if claimed.rows_affected() != 1 {
        return Err(Error::NotFound("invitation".to_string()));
    }

    let profile =
        profiles::insert_profile(&mut *tx, &invitation.email, full_name, invitation.role).await?;
    tx.commit().await?;

    info!(email = %profile.email, role = %profile.role, "Invitation accepted");
    Ok(profile)
}

async fn find_pending_for(pool: &SqlitePool, email: &str) -> Result<Option<Invitation>> {
    let row = sqlx::query("SELECT * FROM invitations WHERE email = ? AND status = ?")
        .bind(email)
        .bind(InvitationStatus::Pending.as_str())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(Invitation::from_row).transpose()
}

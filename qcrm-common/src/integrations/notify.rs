//! Invitation delivery
//!
//! Delivery itself (email or otherwise) happens outside this service. The
//! default [`LogNotifier`] records the invitation in the log so an operator
//! can forward the accept token.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::identity::Role;
use crate::Result;

/// What a notifier is asked to deliver
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvitationNotice {
    pub email: String,
    pub role: Role,
    pub token: String,
    pub invited_by: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_invitation(&self, notice: &InvitationNotice) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_invitation(&self, notice: &InvitationNotice) -> Result<()> {
        info!(
            email = %notice.email,
            role = %notice.role,
            token = %notice.token,
            invited_by = notice.invited_by.as_deref().unwrap_or("-"),
            "Invitation issued"
        );
        Ok(())
    }
}

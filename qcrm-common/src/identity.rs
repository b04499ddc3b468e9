//! Acting identity threaded through service calls
//!
//! The authentication provider is opaque; the core only needs who is acting
//! and with which role. Handlers resolve an [`Identity`] once per request and
//! pass it explicitly, there is no process-wide "current user".

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

text_enum! {
    /// Authorization role of a team member
    pub enum Role {
        Admin => "admin",
        Rep => "rep",
    }
}

/// Authenticated user on whose behalf an operation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Gate for invitation and settings features
    pub fn require_admin(&self, action: &str) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::Forbidden(format!("{} requires the admin role", action)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rep_cannot_pass_admin_gate() {
        let rep = Identity::new(Uuid::new_v4(), Role::Rep);
        match rep.require_admin("inviting members") {
            Err(Error::Forbidden(msg)) => assert!(msg.contains("inviting members")),
            other => panic!("expected forbidden, got {:?}", other),
        }
    }

    #[test]
    fn test_admin_passes_admin_gate() {
        let admin = Identity::new(Uuid::new_v4(), Role::Admin);
        assert!(admin.require_admin("changing settings").is_ok());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("owner".parse::<Role>().is_err());
    }
}

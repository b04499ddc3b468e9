//! Database initialization, schema migrations and row helpers

pub mod init;
pub mod migrations;
pub mod profiles;
pub mod retry;
pub(crate) mod rows;

pub use init::*;
pub use migrations::{run_migrations, schema_version, CURRENT_SCHEMA_VERSION};
pub use profiles::Profile;
pub use retry::{retry_on_unavailable, RetryPolicy};

//! Database schema migrations
//!
//! The schema is an explicit, versioned contract: every migration below is a
//! fixed batch of DDL applied exactly once, in order, and recorded in
//! `schema_version`. Nothing inspects the live schema to decide what to do.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases created by older builds replay only newer ones
//! 2. **Always add new migrations** - append an entry and bump `CURRENT_SCHEMA_VERSION`
//! 3. **Use ALTER TABLE** - prefer ALTER TABLE over DROP/CREATE to preserve data
//!
//! References between CRM tables are soft: no FOREIGN KEY clauses, readers
//! tolerate missing targets.

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

struct Migration {
    version: i32,
    description: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "CRM core tables, profiles and settings",
        statements: &[
            r#"
            CREATE TABLE settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE profiles (
                guid TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                full_name TEXT,
                role TEXT NOT NULL,
                api_token TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE companies (
                guid TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                industry TEXT,
                website TEXT,
                email TEXT,
                phone TEXT,
                address TEXT,
                annual_revenue REAL,
                employee_count INTEGER,
                notes TEXT,
                assigned_to TEXT,
                created_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE contacts (
                guid TEXT PRIMARY KEY,
                company_id TEXT,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                email TEXT,
                phone TEXT,
                job_title TEXT,
                status TEXT NOT NULL,
                notes TEXT,
                assigned_to TEXT,
                created_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE deals (
                guid TEXT PRIMARY KEY,
                company_id TEXT,
                contact_id TEXT,
                name TEXT NOT NULL,
                value REAL NOT NULL DEFAULT 0,
                currency TEXT NOT NULL,
                stage TEXT NOT NULL,
                probability INTEGER NOT NULL,
                status TEXT NOT NULL,
                expected_close_date TEXT,
                description TEXT,
                assigned_to TEXT,
                created_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE activities (
                guid TEXT PRIMARY KEY,
                company_id TEXT,
                contact_id TEXT,
                deal_id TEXT,
                activity_type TEXT NOT NULL,
                subject TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                due_date TEXT,
                completed_at TEXT,
                assigned_to TEXT,
                created_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE products (
                guid TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                sku TEXT,
                price REAL NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE deal_products (
                guid TEXT PRIMARY KEY,
                deal_id TEXT NOT NULL,
                product_id TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                unit_price REAL NOT NULL,
                discount_percent REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX idx_contacts_company ON contacts(company_id)",
            "CREATE INDEX idx_deals_assigned_status ON deals(assigned_to, status)",
            "CREATE INDEX idx_activities_assigned_due ON activities(assigned_to, due_date)",
            "CREATE INDEX idx_deal_products_deal ON deal_products(deal_id)",
        ],
    },
    Migration {
        version: 2,
        description: "Qualification records and team invitations",
        statements: &[
            r#"
            CREATE TABLE qualifications (
                guid TEXT PRIMARY KEY,
                client_name TEXT NOT NULL,
                company_id TEXT,
                contact_id TEXT,
                deal_id TEXT,
                activity_id TEXT,
                budget TEXT,
                authority TEXT,
                need INTEGER,
                timeline TEXT,
                transcript TEXT NOT NULL DEFAULT '',
                transcript_source TEXT,
                score INTEGER NOT NULL,
                classification TEXT NOT NULL,
                created_by TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE invitations (
                guid TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                role TEXT NOT NULL,
                token TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                invited_by TEXT,
                created_at TEXT NOT NULL,
                accepted_at TEXT
            )
            "#,
            "CREATE INDEX idx_qualifications_created_by ON qualifications(created_by)",
        ],
    },
];

/// Highest applied schema version (0 for an empty database)
pub async fn schema_version(pool: &SqlitePool) -> Result<i32> {
    ensure_version_table(pool).await?;
    let version: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

async fn ensure_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Run all pending migrations
///
/// Each migration and its version row commit in one transaction, so a crash
/// mid-upgrade leaves the database at the previous version.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_version (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.description)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!("✓ Migration v{} completed: {}", migration.version, migration.description);
    }

    info!("All migrations completed successfully");
    Ok(())
}

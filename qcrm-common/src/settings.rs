//! Key/value settings stored in the database
//!
//! Scoring configuration lives here so it can be changed at runtime by an
//! admin. Every key is seeded with its default on initialization; a row
//! with an unparseable value falls back to the default with a warning.

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::identity::Identity;
use crate::qualification::{ScoringConfig, ScoringWeights, Thresholds};
use crate::Result;

pub const WEIGHT_BUDGET: &str = "scoring_weight_budget";
pub const WEIGHT_AUTHORITY: &str = "scoring_weight_authority";
pub const WEIGHT_NEED: &str = "scoring_weight_need";
pub const WEIGHT_TIMELINE: &str = "scoring_weight_timeline";
pub const HOT_THRESHOLD: &str = "scoring_hot_threshold";
pub const WARM_THRESHOLD: &str = "scoring_warm_threshold";
pub const BOOKING_WARM_MIN_SCORE: &str = "booking_warm_min_score";

/// Seed every known setting that is missing
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    for (key, value) in scoring_entries(&ScoringConfig::default()) {
        ensure_setting(pool, key, &value).await?;
    }
    Ok(())
}

/// Insert `key` with `default_value` unless it is already present
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    // OR IGNORE tolerates concurrent initialization
    let result = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?;

    if result.rows_affected() > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
    }
    Ok(())
}

pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Current scoring configuration; readable by any identity
pub async fn load_scoring_config(pool: &SqlitePool) -> Result<ScoringConfig> {
    let defaults = ScoringConfig::default();

    let config = ScoringConfig {
        weights: ScoringWeights {
            budget: load_or(pool, WEIGHT_BUDGET, defaults.weights.budget).await?,
            authority: load_or(pool, WEIGHT_AUTHORITY, defaults.weights.authority).await?,
            need: load_or(pool, WEIGHT_NEED, defaults.weights.need).await?,
            timeline: load_or(pool, WEIGHT_TIMELINE, defaults.weights.timeline).await?,
        },
        thresholds: Thresholds {
            hot: load_or(pool, HOT_THRESHOLD, defaults.thresholds.hot).await?,
            warm: load_or(pool, WARM_THRESHOLD, defaults.thresholds.warm).await?,
        },
        booking_warm_min_score: load_or(
            pool,
            BOOKING_WARM_MIN_SCORE,
            defaults.booking_warm_min_score,
        )
        .await?,
    };

    // Individually parseable values can still combine into an invalid config
    if let Err(e) = config.validate() {
        warn!(error = %e, "Stored scoring configuration is invalid, using defaults");
        return Ok(defaults);
    }
    Ok(config)
}

/// Replace the scoring configuration (admin only)
pub async fn save_scoring_config(
    pool: &SqlitePool,
    identity: &Identity,
    config: &ScoringConfig,
) -> Result<()> {
    identity.require_admin("change scoring settings")?;
    config.validate()?;

    let mut tx = pool.begin().await?;
    for (key, value) in scoring_entries(config) {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    info!(user = %identity.user_id, "Scoring configuration updated");
    Ok(())
}

fn scoring_entries(config: &ScoringConfig) -> [(&'static str, String); 7] {
    [
        (WEIGHT_BUDGET, config.weights.budget.to_string()),
        (WEIGHT_AUTHORITY, config.weights.authority.to_string()),
        (WEIGHT_NEED, config.weights.need.to_string()),
        (WEIGHT_TIMELINE, config.weights.timeline.to_string()),
        (HOT_THRESHOLD, config.thresholds.hot.to_string()),
        (WARM_THRESHOLD, config.thresholds.warm.to_string()),
        (
            BOOKING_WARM_MIN_SCORE,
            config.booking_warm_min_score.to_string(),
        ),
    ]
}

async fn load_or<T>(pool: &SqlitePool, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + std::fmt::Display,
{
    match get_setting(pool, key).await? {
        None => Ok(default),
        Some(text) => match text.trim().parse() {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!(
                    "Setting '{}' has invalid value '{}', using default {}",
                    key, text, default
                );
                Ok(default)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;
    use crate::identity::Role;
    use crate::Error;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_defaults_seeded() {
        let pool = init_memory_database().await.unwrap();
        assert_eq!(
            get_setting(&pool, HOT_THRESHOLD).await.unwrap().as_deref(),
            Some("75")
        );
        let config = load_scoring_config(&pool).await.unwrap();
        assert_eq!(config, ScoringConfig::default());
    }

    #[tokio::test]
    async fn test_seeding_keeps_existing_values() {
        let pool = init_memory_database().await.unwrap();
        set_setting(&pool, WARM_THRESHOLD, "40").await.unwrap();
        init_default_settings(&pool).await.unwrap();
        assert_eq!(
            get_setting(&pool, WARM_THRESHOLD).await.unwrap().as_deref(),
            Some("40")
        );
    }

    #[tokio::test]
    async fn test_rep_cannot_save() {
        let pool = init_memory_database().await.unwrap();
        let rep = Identity::new(Uuid::new_v4(), Role::Rep);
        let err = save_scoring_config(&pool, &rep, &ScoringConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_admin_save_round_trips() {
        let pool = init_memory_database().await.unwrap();
        let admin = Identity::new(Uuid::new_v4(), Role::Admin);
        let config = ScoringConfig {
            weights: ScoringWeights {
                budget: 0.4,
                authority: 0.2,
                need: 0.2,
                timeline: 0.2,
            },
            thresholds: Thresholds { hot: 80, warm: 55 },
            booking_warm_min_score: 65,
        };
        save_scoring_config(&pool, &admin, &config).await.unwrap();
        assert_eq!(load_scoring_config(&pool).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_invalid_save_rejected() {
        let pool = init_memory_database().await.unwrap();
        let admin = Identity::new(Uuid::new_v4(), Role::Admin);
        let config = ScoringConfig {
            thresholds: Thresholds { hot: 50, warm: 50 },
            ..Default::default()
        };
        let err = save_scoring_config(&pool, &admin, &config).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_garbage_value_falls_back() {
        let pool = init_memory_database().await.unwrap();
        set_setting(&pool, WEIGHT_NEED, "lots").await.unwrap();
        let config = load_scoring_config(&pool).await.unwrap();
        assert_eq!(config.weights.need, 0.25);
    }
}

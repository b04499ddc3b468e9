//! CRM service layer
//!
//! Every operation runs against the shared SQLite pool and is retried on
//! transient storage failures according to the configured [`RetryPolicy`].
//! Identity is passed explicitly; there is no ambient session.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::filter::ListFilter;
use super::model::{Entity, EntityKind, EntityPayload};
use super::{activity, company, contact, deal, product};
use super::{Activity, Company, Contact, Deal, DealProduct, Product};
use crate::db::{retry_on_unavailable, RetryPolicy};
use crate::identity::Identity;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct CrmService {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl CrmService {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_retry(pool, RetryPolicy::default())
    }

    pub fn with_retry(pool: SqlitePool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Create or update one entity
    ///
    /// Without a guid the entity is created with a server-assigned id and
    /// timestamps. With a guid the stored row is read, the submitted fields
    /// are laid over it and the merged entity is validated and written back,
    /// all inside one transaction.
    pub async fn upsert(&self, identity: &Identity, payload: EntityPayload) -> Result<Entity> {
        let kind = payload.kind();
        let entity = retry_on_unavailable(&self.retry, "upsert_entity", || {
            let payload = payload.clone();
            async move {
                let mut tx = self.pool.begin().await?;
                let entity = upsert_in(&mut *tx, identity, payload).await?;
                tx.commit().await?;
                Ok(entity)
            }
        })
        .await?;

        info!(
            kind = %kind,
            guid = %entity.guid(),
            user = %identity.user_id,
            "Saved {}",
            kind.label()
        );
        Ok(entity)
    }

    /// Entities of `kind` matching `filter`, in insertion order unless sorted
    pub async fn list(&self, kind: EntityKind, filter: &ListFilter) -> Result<Vec<Entity>> {
        filter.check(kind)?;

        let entities = retry_on_unavailable(&self.retry, "list_entities", || async move {
            let mut qb = filter.select_query(kind)?;
            let rows = qb.build().fetch_all(&self.pool).await?;
            rows.iter()
                .map(|row| Entity::from_row(kind, row))
                .collect::<Result<Vec<_>>>()
        })
        .await?;

        debug!(kind = %kind, count = entities.len(), "Listed entities");
        Ok(entities)
    }

    /// Number of entities matching `filter`, ignoring its paging
    pub async fn count(&self, kind: EntityKind, filter: &ListFilter) -> Result<i64> {
        filter.check(kind)?;

        retry_on_unavailable(&self.retry, "count_entities", || async move {
            let mut qb = filter.count_query(kind)?;
            let row = qb.build().fetch_one(&self.pool).await?;
            Ok(row.try_get::<i64, _>(0)?)
        })
        .await
    }

    pub async fn get(&self, kind: EntityKind, id: Uuid) -> Result<Entity> {
        let sql = format!("SELECT * FROM {} WHERE guid = ?", kind.table());

        let row = retry_on_unavailable(&self.retry, "get_entity", || {
            let sql = sql.as_str();
            async move {
                Ok(sqlx::query(sql)
                    .bind(id.to_string())
                    .fetch_optional(&self.pool)
                    .await?)
            }
        })
        .await?;

        match row {
            Some(row) => Entity::from_row(kind, &row),
            None => Err(Error::NotFound(format!("{} {}", kind.label(), id))),
        }
    }
}

/// Write one payload on an open connection or transaction
pub(crate) async fn upsert_in(
    conn: &mut SqliteConnection,
    identity: &Identity,
    payload: EntityPayload,
) -> Result<Entity> {
    Ok(match payload {
        EntityPayload::Company(input) => {
            Entity::Company(company::upsert(conn, identity, input).await?)
        }
        EntityPayload::Contact(input) => {
            Entity::Contact(contact::upsert(conn, identity, input).await?)
        }
        EntityPayload::Deal(input) => Entity::Deal(deal::upsert(conn, identity, input).await?),
        EntityPayload::Activity(input) => {
            Entity::Activity(activity::upsert(conn, identity, input).await?)
        }
        EntityPayload::Product(input) => {
            Entity::Product(product::upsert_product(conn, identity, input).await?)
        }
        EntityPayload::DealProduct(input) => {
            Entity::DealProduct(product::upsert_line(conn, identity, input).await?)
        }
    })
}

impl Entity {
    pub(crate) fn from_row(kind: EntityKind, row: &SqliteRow) -> Result<Self> {
        Ok(match kind {
            EntityKind::Company => Entity::Company(Company::from_row(row)?),
            EntityKind::Contact => Entity::Contact(Contact::from_row(row)?),
            EntityKind::Deal => Entity::Deal(Deal::from_row(row)?),
            EntityKind::Activity => Entity::Activity(Activity::from_row(row)?),
            EntityKind::Product => Entity::Product(Product::from_row(row)?),
            EntityKind::DealProduct => Entity::DealProduct(DealProduct::from_row(row)?),
        })
    }
}

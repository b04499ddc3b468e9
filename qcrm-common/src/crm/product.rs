//! Product catalog and deal line items

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
pub struct Product {
    pub guid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub price: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            guid: rows::guid(row, "guid")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            sku: row.try_get("sku")?,
            price: row.try_get("price")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductInput {
    pub guid: Option<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub price: Option<f64>,
    pub active: Option<bool>,
    /// Fields dropped while decoding because their JSON type was wrong
    #[serde(skip)]
    pub rejected: Violations,
}

impl ProductInput {
    fn overlay(self, base: &Product) -> Self {
        Self {
            guid: Some(base.guid),
            name: self.name.or_else(|| Some(base.name.clone())),
            description: self.description.or_else(|| base.description.clone()),
            sku: self.sku.or_else(|| base.sku.clone()),
            price: self.price.or(Some(base.price)),
            active: self.active.or(Some(base.active)),
            rejected: self.rejected,
        }
    }

    fn validate(self, stamp: Stamp) -> Result<Product> {
        let mut v = Violations::new();

        let name = validate::required_text(&mut v, "name", self.name);
        let price = match self.price {
            Some(price) => validate::non_negative(&mut v, "price", price),
            None => {
                v.push("price", "is required");
                0.0
            }
        };

        self.rejected.merge(v).finish(Product {
            guid: stamp.guid,
            name,
            description: validate::optional_text(self.description),
            sku: validate::optional_text(self.sku),
            price,
            active: self.active.unwrap_or(true),
            created_at: stamp.created_at,
            updated_at: stamp.updated_at,
        })
    }
}

/// One product line on a deal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealProduct {
    pub guid: Uuid,
    pub deal_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i64,
    pub unit_price: f64,
    pub discount_percent: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DealProduct {
    /// Quantity times unit price, less the discount
    pub fn line_total(&self) -> f64 {
        self.quantity as f64 * self.unit_price * (1.0 - self.discount_percent / 100.0)
    }

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            guid: rows::guid(row, "guid")?,
            deal_id: rows::guid(row, "deal_id")?,
            product_id: rows::guid(row, "product_id")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
            discount_percent: row.try_get("discount_percent")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Submitted line item; `unit_price` defaults to the product's list price
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DealProductInput {
    pub guid: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub quantity: Option<i64>,
    pub unit_price: Option<f64>,
    pub discount_percent: Option<f64>,
    /// Fields dropped while decoding because their JSON type was wrong
    #[serde(skip)]
    pub rejected: Violations,
}

impl DealProductInput {
    fn overlay(self, base: &DealProduct) -> Self {
        Self {
            guid: Some(base.guid),
            deal_id: self.deal_id.or(Some(base.deal_id)),
            product_id: self.product_id.or(Some(base.product_id)),
            quantity: self.quantity.or(Some(base.quantity)),
            unit_price: self.unit_price.or(Some(base.unit_price)),
            discount_percent: self.discount_percent.or(Some(base.discount_percent)),
            rejected: self.rejected,
        }
    }

    fn validate(self, stamp: Stamp) -> Result<DealProduct> {
        let mut v = Violations::new();

        if self.deal_id.is_none() {
            v.push("deal_id", "is required");
        }
        if self.product_id.is_none() {
            v.push("product_id", "is required");
        }
        let quantity = validate::at_least(&mut v, "quantity", self.quantity.unwrap_or(1), 1);
        let unit_price = match self.unit_price {
            Some(price) => validate::non_negative(&mut v, "unit_price", price),
            None => {
                v.push("unit_price", "is required when the product has no list price");
                0.0
            }
        };
        let discount_percent = validate::percent(
            &mut v,
            "discount_percent",
            self.discount_percent.unwrap_or(0.0),
        );

        self.rejected.merge(v).finish(DealProduct {
            guid: stamp.guid,
            deal_id: self.deal_id.unwrap_or_default(),
            product_id: self.product_id.unwrap_or_default(),
            quantity,
            unit_price,
            discount_percent,
            created_at: stamp.created_at,
            updated_at: stamp.updated_at,
        })
    }
}

pub(crate) async fn fetch_product<'e, E>(executor: E, id: Uuid) -> Result<Option<Product>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM products WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(Product::from_row).transpose()
}

pub(crate) async fn fetch_line<'e, E>(executor: E, id: Uuid) -> Result<Option<DealProduct>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM deal_products WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(DealProduct::from_row).transpose()
}

pub(crate) async fn upsert_product(
    conn: &mut SqliteConnection,
    identity: &Identity,
    input: ProductInput,
) -> Result<Product> {
    let now = crate::time::now();
    let product = match input.guid {
        None => input.validate(Stamp::create(identity, now))?,
        Some(id) => {
            let base = fetch_product(&mut *conn, id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("product {}", id)))?;
            let stamp = Stamp::update(base.guid, None, base.created_at, now);
            input.overlay(&base).validate(stamp)?
        }
    };

    sqlx::query(
        r#"
        INSERT INTO products (guid, name, description, sku, price, active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(guid) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            sku = excluded.sku,
            price = excluded.price,
            active = excluded.active,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(product.guid.to_string())
    .bind(&product.name)
    .bind(&product.description)
    .bind(&product.sku)
    .bind(product.price)
    .bind(product.active)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(product)
}

pub(crate) async fn upsert_line(
    conn: &mut SqliteConnection,
    identity: &Identity,
    mut input: DealProductInput,
) -> Result<DealProduct> {
    let now = crate::time::now();

    // List price fills in a missing unit price; an unknown product is tolerated
    if input.unit_price.is_none() && input.guid.is_none() {
        if let Some(product_id) = input.product_id {
            input.unit_price = fetch_product(&mut *conn, product_id).await?.map(|p| p.price);
        }
    }

    let line = match input.guid {
        None => input.validate(Stamp::create(identity, now))?,
        Some(id) => {
            let base = fetch_line(&mut *conn, id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("deal product {}", id)))?;
            let stamp = Stamp::update(base.guid, None, base.created_at, now);
            input.overlay(&base).validate(stamp)?
        }
    };

    sqlx::query(
        r#"
        INSERT INTO deal_products (
            guid, deal_id, product_id, quantity, unit_price, discount_percent,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(guid) DO UPDATE SET
            deal_id = excluded.deal_id,
            product_id = excluded.product_id,
            quantity = excluded.quantity,
            unit_price = excluded.unit_price,
            discount_percent = excluded.discount_percent,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(line.guid.to_string())
    .bind(line.deal_id.to_string())
    .bind(line.product_id.to_string())
    .bind(line.quantity)
    .bind(line.unit_price)
    .bind(line.discount_percent)
    .bind(line.created_at)
    .bind(line.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(line)
}

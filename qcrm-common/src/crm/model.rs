//! Enumerations, the entity sum type and upsert payloads

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{
    Activity, ActivityInput, Company, CompanyInput, Contact, ContactInput, Deal, DealInput,
    DealProduct, DealProductInput, Product, ProductInput,
};
use crate::{Error, Result, Violations};

text_enum! {
    pub enum ContactStatus {
        Active => "active",
        Inactive => "inactive",
        Unqualified => "unqualified",
    }
}

text_enum! {
    /// Pipeline position, distinct from the terminal [`DealStatus`]
    pub enum DealStage {
        Prospecting => "prospecting",
        Qualification => "qualification",
        Proposal => "proposal",
        Negotiation => "negotiation",
        ClosedWon => "closed-won",
        ClosedLost => "closed-lost",
    }
}

impl DealStage {
    /// Status a deal in this stage must have, if the stage is terminal
    pub fn implied_status(&self) -> Option<DealStatus> {
        match self {
            DealStage::ClosedWon => Some(DealStatus::Won),
            DealStage::ClosedLost => Some(DealStatus::Lost),
            _ => None,
        }
    }

    /// Win probability assumed when none is supplied
    pub fn default_probability(&self) -> i64 {
        match self {
            DealStage::Prospecting => 10,
            DealStage::Qualification => 20,
            DealStage::Proposal => 50,
            DealStage::Negotiation => 75,
            DealStage::ClosedWon => 100,
            DealStage::ClosedLost => 0,
        }
    }
}

text_enum! {
    pub enum DealStatus {
        Open => "open",
        Won => "won",
        Lost => "lost",
        Cancelled => "cancelled",
    }
}

text_enum! {
    pub enum ActivityType {
        Call => "call",
        Email => "email",
        Meeting => "meeting",
        Task => "task",
        Note => "note",
    }
}

text_enum! {
    pub enum ActivityStatus {
        Pending => "pending",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

text_enum! {
    pub enum ActivityPriority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
}

text_enum! {
    /// Entity kinds addressable through the service layer
    pub enum EntityKind {
        Company => "companies",
        Contact => "contacts",
        Deal => "deals",
        Activity => "activities",
        Product => "products",
        DealProduct => "deal_products",
    }
}

impl EntityKind {
    /// Backing table (the plural spelling doubles as the table name)
    pub fn table(&self) -> &'static str {
        self.as_str()
    }

    /// Singular label for messages
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Company => "company",
            EntityKind::Contact => "contact",
            EntityKind::Deal => "deal",
            EntityKind::Activity => "activity",
            EntityKind::Product => "product",
            EntityKind::DealProduct => "deal product",
        }
    }
}

/// Any persisted CRM entity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Entity {
    Company(Company),
    Contact(Contact),
    Deal(Deal),
    Activity(Activity),
    Product(Product),
    DealProduct(DealProduct),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Company(_) => EntityKind::Company,
            Entity::Contact(_) => EntityKind::Contact,
            Entity::Deal(_) => EntityKind::Deal,
            Entity::Activity(_) => EntityKind::Activity,
            Entity::Product(_) => EntityKind::Product,
            Entity::DealProduct(_) => EntityKind::DealProduct,
        }
    }

    pub fn guid(&self) -> Uuid {
        match self {
            Entity::Company(e) => e.guid,
            Entity::Contact(e) => e.guid,
            Entity::Deal(e) => e.guid,
            Entity::Activity(e) => e.guid,
            Entity::Product(e) => e.guid,
            Entity::DealProduct(e) => e.guid,
        }
    }
}

/// Create-or-update request for one entity
///
/// A payload without `guid` creates; with `guid` it updates the stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EntityPayload {
    Company(CompanyInput),
    Contact(ContactInput),
    Deal(DealInput),
    Activity(ActivityInput),
    Product(ProductInput),
    DealProduct(DealProductInput),
}

impl EntityPayload {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityPayload::Company(_) => EntityKind::Company,
            EntityPayload::Contact(_) => EntityKind::Contact,
            EntityPayload::Deal(_) => EntityKind::Deal,
            EntityPayload::Activity(_) => EntityKind::Activity,
            EntityPayload::Product(_) => EntityKind::Product,
            EntityPayload::DealProduct(_) => EntityKind::DealProduct,
        }
    }

    /// Decode the JSON body submitted for `kind`
    ///
    /// A field whose JSON type is wrong is dropped and recorded on the
    /// input's `rejected` list, so validation still reports it alongside
    /// missing fields and bad values. Only a body that is not an object
    /// fails here.
    pub fn from_json(kind: EntityKind, body: Value) -> Result<Self> {
        Ok(match kind {
            EntityKind::Company => {
                let (mut input, rejected) = decode::<CompanyInput>(body)?;
                input.rejected = rejected;
                EntityPayload::Company(input)
            }
            EntityKind::Contact => {
                let (mut input, rejected) = decode::<ContactInput>(body)?;
                input.rejected = rejected;
                EntityPayload::Contact(input)
            }
            EntityKind::Deal => {
                let (mut input, rejected) = decode::<DealInput>(body)?;
                input.rejected = rejected;
                EntityPayload::Deal(input)
            }
            EntityKind::Activity => {
                let (mut input, rejected) = decode::<ActivityInput>(body)?;
                input.rejected = rejected;
                EntityPayload::Activity(input)
            }
            EntityKind::Product => {
                let (mut input, rejected) = decode::<ProductInput>(body)?;
                input.rejected = rejected;
                EntityPayload::Product(input)
            }
            EntityKind::DealProduct => {
                let (mut input, rejected) = decode::<DealProductInput>(body)?;
                input.rejected = rejected;
                EntityPayload::DealProduct(input)
            }
        })
    }
}

/// Decode `body`, falling back to field-by-field decoding on a type error
fn decode<T: DeserializeOwned>(body: Value) -> Result<(T, Violations)> {
    let whole = match serde_json::from_value::<T>(body.clone()) {
        Ok(input) => return Ok((input, Violations::new())),
        Err(e) => e,
    };
    let Value::Object(fields) = body else {
        return Err(Error::invalid("payload", whole.to_string()));
    };

    let mut rejected = Violations::new();
    let mut kept = Map::new();
    for (field, value) in fields {
        let mut single = Map::new();
        single.insert(field.clone(), value.clone());
        match serde_json::from_value::<T>(Value::Object(single)) {
            Ok(_) => {
                kept.insert(field, value);
            }
            Err(e) => rejected.push(field, e.to_string()),
        }
    }

    let input = serde_json::from_value(Value::Object(kept))
        .map_err(|e| Error::invalid("payload", e.to_string()))?;
    Ok((input, rejected))
}

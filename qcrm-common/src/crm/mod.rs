//! CRM data model and service layer
//!
//! Entities: [`Company`], [`Contact`], [`Deal`], [`Activity`], [`Product`],
//! [`DealProduct`]. All cross-entity references are soft: deleting a parent
//! never touches children, and readers tolerate ids that no longer resolve.

mod activity;
mod company;
mod contact;
mod deal;
pub mod filter;
pub mod model;
mod product;
pub mod service;
pub mod stats;
pub(crate) mod validate;

pub use activity::{Activity, ActivityInput};
pub use company::{Company, CompanyInput};
pub use contact::{Contact, ContactInput};
pub use deal::{Deal, DealInput};
pub use filter::{ListFilter, Paging, SortSpec, MAX_PAGE_SIZE};
pub use model::{
    ActivityPriority, ActivityStatus, ActivityType, ContactStatus, DealStage, DealStatus, Entity,
    EntityKind, EntityPayload,
};
pub use product::{DealProduct, DealProductInput, Product, ProductInput};
pub use service::CrmService;
pub use stats::{
    ActivityMetrics, AssigneePerformance, DashboardStats, DealTotals, PipelineMetrics,
};

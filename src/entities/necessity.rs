//! Necessity entity - A fundraising target of N units at a fixed unit price.
//!
//! Money contributions earmarked for a necessity are converted into thing
//! fulfillments by the allocator. `unit_price` is stored as decimal text so no
//! precision is lost in `SQLite`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Necessity database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "necessities")]
pub struct Model {
    /// Unique identifier for the necessity
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-readable name (e.g., "Tents")
    pub name: String,
    /// Price of a single unit, decimal text (e.g., `"100.00"`)
    pub unit_price: String,
    /// Number of units needed
    pub target_count: i32,
    /// Administrator credited as creator of generated fulfillments
    pub owner_id: String,
    /// Optimistic concurrency counter, bumped on every applied allocation
    pub version: i64,
    /// When the necessity was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Necessity and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One necessity has many earmarked contributions
    #[sea_orm(has_many = "super::money_contribution::Entity")]
    MoneyContributions,
    /// One necessity has many fulfilled units
    #[sea_orm(has_many = "super::thing_fulfillment::Entity")]
    ThingFulfillments,
}

impl Related<super::money_contribution::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MoneyContributions.def()
    }
}

impl Related<super::thing_fulfillment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ThingFulfillments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

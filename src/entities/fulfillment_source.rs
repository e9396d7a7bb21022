//! Fulfillment source entity - Ordered link from a fulfillment to a contribution it consumed.
//!
//! A contribution counts as consumed once any row here references it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Fulfillment source database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fulfillment_sources")]
pub struct Model {
    /// Unique identifier for the link
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Fulfillment that consumed the money
    pub fulfillment_id: i64,
    /// Contribution whose money was consumed
    pub contribution_id: i64,
    /// Zero-based position within the fulfillment's source list
    pub position: i32,
}

/// Defines relationships between `FulfillmentSource` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Owning fulfillment
    #[sea_orm(
        belongs_to = "super::thing_fulfillment::Entity",
        from = "Column::FulfillmentId",
        to = "super::thing_fulfillment::Column::Id"
    )]
    ThingFulfillment,
    /// Consumed contribution
    #[sea_orm(
        belongs_to = "super::money_contribution::Entity",
        from = "Column::ContributionId",
        to = "super::money_contribution::Column::Id"
    )]
    MoneyContribution,
}

impl Related<super::thing_fulfillment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ThingFulfillment.def()
    }
}

impl Related<super::money_contribution::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MoneyContribution.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

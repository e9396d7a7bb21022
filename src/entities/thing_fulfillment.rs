//! Thing fulfillment entity - One funded unit of a necessity.
//!
//! Created only by the allocator and never modified afterwards. The money that
//! paid for it is recorded through `fulfillment_source` rows.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Note attached to every fulfillment produced by the allocator
pub const AUTO_GENERATED_NOTE: &str = "auto-generated";

/// Thing fulfillment database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "thing_fulfillments")]
pub struct Model {
    /// Unique identifier for the fulfillment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Necessity this unit counts towards
    pub necessity_id: i64,
    /// Unit price copied from the necessity at creation time, decimal text
    pub unit_price: String,
    /// Necessity owner credited with creating the unit
    pub created_by: String,
    /// Always `"auto-generated"` for allocator output
    pub note: String,
    /// When the unit was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between `ThingFulfillment` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each unit belongs to one necessity
    #[sea_orm(
        belongs_to = "super::necessity::Entity",
        from = "Column::NecessityId",
        to = "super::necessity::Column::Id"
    )]
    Necessity,
    /// Ordered links to the contributions that paid for this unit
    #[sea_orm(has_many = "super::fulfillment_source::Entity")]
    Sources,
}

impl Related<super::necessity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Necessity.def()
    }
}

impl Related<super::fulfillment_source::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sources.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

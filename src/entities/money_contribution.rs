//! Money contribution entity - A pledged donation, optionally earmarked for a necessity.
//!
//! Contributions start out `Pending`. Accepting one that is linked to a necessity
//! triggers the allocator, which may consume it into thing fulfillments.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a money contribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ContributionStatus {
    /// Waiting for an administrator decision
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Accepted; eligible as allocation input while unconsumed
    #[sea_orm(string_value = "accepted")]
    Accepted,
    /// Rejected by an administrator
    #[sea_orm(string_value = "declined")]
    Declined,
    /// Delivered in kind
    #[sea_orm(string_value = "fulfilled_in_kind")]
    FulfilledInKind,
    /// Accepted but never delivered within the delivery window
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl ContributionStatus {
    /// Whether a contribution in this status may move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted | Self::Declined)
                | (Self::Accepted, Self::FulfilledInKind | Self::Expired)
        )
    }

    /// Terminal statuses never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Declined | Self::FulfilledInKind | Self::Expired)
    }
}

/// Money contribution database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "money_contributions")]
pub struct Model {
    /// Unique identifier; ascending id is the allocation order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Necessity this money is earmarked for, None if unlinked
    pub necessity_id: Option<i64>,
    /// Who pledged the money
    pub contributor_id: String,
    /// Pledged amount, decimal text
    pub amount: String,
    /// Current lifecycle status
    pub status: ContributionStatus,
    /// Free-text note
    pub note: String,
    /// When the contribution was accepted
    pub accepted_at: Option<DateTimeUtc>,
    /// When the contribution was delivered in kind
    pub delivered_at: Option<DateTimeUtc>,
    /// When the contribution was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between `MoneyContribution` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each earmarked contribution belongs to one necessity
    #[sea_orm(
        belongs_to = "super::necessity::Entity",
        from = "Column::NecessityId",
        to = "super::necessity::Column::Id"
    )]
    Necessity,
    /// A consumed contribution is referenced by fulfillment source links
    #[sea_orm(has_many = "super::fulfillment_source::Entity")]
    FulfillmentSources,
}

impl Related<super::necessity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Necessity.def()
    }
}

impl Related<super::fulfillment_source::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FulfillmentSources.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Iterable;

    #[test]
    fn test_pending_transitions() {
        assert!(ContributionStatus::Pending.can_transition_to(ContributionStatus::Accepted));
        assert!(ContributionStatus::Pending.can_transition_to(ContributionStatus::Declined));
        assert!(!ContributionStatus::Pending.can_transition_to(ContributionStatus::Expired));
        assert!(
            !ContributionStatus::Pending.can_transition_to(ContributionStatus::FulfilledInKind)
        );
    }

    #[test]
    fn test_accepted_transitions() {
        assert!(
            ContributionStatus::Accepted.can_transition_to(ContributionStatus::FulfilledInKind)
        );
        assert!(ContributionStatus::Accepted.can_transition_to(ContributionStatus::Expired));
        assert!(!ContributionStatus::Accepted.can_transition_to(ContributionStatus::Pending));
        assert!(!ContributionStatus::Accepted.can_transition_to(ContributionStatus::Accepted));
    }

    #[test]
    fn test_terminal_statuses_are_frozen() {
        for status in ContributionStatus::iter().filter(|s| s.is_terminal()) {
            for next in ContributionStatus::iter() {
                assert!(!status.can_transition_to(next), "{status:?} -> {next:?}");
            }
        }
    }
}

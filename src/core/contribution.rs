//! Money contribution business logic - Lifecycle operations and the acceptance workflow.
//!
//! Accepting a contribution that is earmarked for a necessity runs the allocator.
//! The status change, the snapshot, the allocation and all resulting writes
//! happen inside one database transaction, so an acceptance is either applied
//! completely or not at all.

use crate::{
    core::{
        allocation::{self, AcceptedContribution},
        fulfillment::{self, AllocationResult},
        money,
        necessity::{self, get_consumed_contribution_ids},
    },
    entities::{ContributionStatus, MoneyContribution, money_contribution},
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use std::collections::HashSet;
use tracing::{info, instrument, warn};

/// Result of accepting a contribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptOutcome {
    /// The contribution after the status change
    pub contribution: money_contribution::Model,
    /// What the allocator produced for the linked necessity
    pub allocation: AllocationResult,
}

/// Records a new pending contribution.
///
/// # Errors
/// * `Error::InvalidAmount` - amount is zero or negative
/// * `Error::NecessityNotFound` - `necessity_id` points at nothing
#[instrument(skip(db, note))]
pub async fn create_contribution(
    db: &DatabaseConnection,
    contributor_id: String,
    amount: Decimal,
    necessity_id: Option<i64>,
    note: String,
) -> Result<money_contribution::Model> {
    money::ensure_positive(amount)?;

    if let Some(id) = necessity_id {
        necessity::get_necessity_by_id(db, id)
            .await?
            .ok_or(Error::NecessityNotFound { id })?;
    }

    let model = money_contribution::ActiveModel {
        necessity_id: Set(necessity_id),
        contributor_id: Set(contributor_id),
        amount: Set(money::to_storage(amount)),
        status: Set(ContributionStatus::Pending),
        note: Set(note),
        accepted_at: Set(None),
        delivered_at: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    let created = model.insert(db).await?;
    info!(contribution_id = created.id, "Created contribution of {}", created.amount);
    Ok(created)
}

/// Finds a contribution by its unique ID.
pub async fn get_contribution_by_id<C>(
    db: &C,
    contribution_id: i64,
) -> Result<Option<money_contribution::Model>>
where
    C: ConnectionTrait,
{
    MoneyContribution::find_by_id(contribution_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// All contributions earmarked for a necessity, ordered by id.
pub async fn get_contributions_for_necessity(
    db: &DatabaseConnection,
    necessity_id: i64,
) -> Result<Vec<money_contribution::Model>> {
    MoneyContribution::find()
        .filter(money_contribution::Column::NecessityId.eq(necessity_id))
        .order_by_asc(money_contribution::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Pending contributions with no necessity, e.g. remainders waiting for re-triage.
pub async fn get_unassigned_contributions(
    db: &DatabaseConnection,
) -> Result<Vec<money_contribution::Model>> {
    MoneyContribution::find()
        .filter(money_contribution::Column::NecessityId.is_null())
        .filter(money_contribution::Column::Status.eq(ContributionStatus::Pending))
        .order_by_asc(money_contribution::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

async fn find_existing<C>(db: &C, contribution_id: i64) -> Result<money_contribution::Model>
where
    C: ConnectionTrait,
{
    get_contribution_by_id(db, contribution_id)
        .await?
        .ok_or(Error::ContributionNotFound {
            id: contribution_id,
        })
}

fn ensure_transition(
    contribution: &money_contribution::Model,
    next: ContributionStatus,
) -> Result<()> {
    if contribution.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(Error::InvalidStatusTransition {
            id: contribution.id,
            from: contribution.status,
            to: next,
        })
    }
}

/// Links a pending contribution to a necessity.
///
/// Used by administrators to re-triage remainder contributions, which the
/// allocator leaves unlinked.
#[instrument(skip(db))]
pub async fn assign_necessity(
    db: &DatabaseConnection,
    contribution_id: i64,
    necessity_id: i64,
) -> Result<money_contribution::Model> {
    let contribution = find_existing(db, contribution_id).await?;
    if contribution.status != ContributionStatus::Pending {
        return Err(Error::InvalidStatusTransition {
            id: contribution.id,
            from: contribution.status,
            to: ContributionStatus::Pending,
        });
    }
    necessity::get_necessity_by_id(db, necessity_id)
        .await?
        .ok_or(Error::NecessityNotFound { id: necessity_id })?;

    let mut active: money_contribution::ActiveModel = contribution.into();
    active.necessity_id = Set(Some(necessity_id));
    let updated = active.update(db).await?;
    info!(contribution_id, necessity_id, "Assigned contribution to necessity");
    Ok(updated)
}

/// Accepts a pending contribution and allocates its necessity.
///
/// The contribution must already be linked to a necessity; accepting an
/// unlinked contribution is a caller bug and fails with
/// `Error::InvariantViolation` before anything is written.
///
/// # Errors
/// * `Error::ContributionNotFound` / `Error::NecessityNotFound`
/// * `Error::InvalidStatusTransition` - contribution is not pending
/// * `Error::InvariantViolation` - no necessity link
/// * `Error::ConcurrentModification` - retryable, the necessity changed underneath
#[instrument(skip(db))]
pub async fn accept_contribution(
    db: &DatabaseConnection,
    contribution_id: i64,
) -> Result<AcceptOutcome> {
    let txn = db.begin().await?;

    let contribution = find_existing(&txn, contribution_id).await?;
    ensure_transition(&contribution, ContributionStatus::Accepted)?;
    let necessity_id = contribution
        .necessity_id
        .ok_or_else(|| Error::InvariantViolation {
            message: format!(
                "contribution {contribution_id} must be linked to a necessity before acceptance"
            ),
        })?;
    let target = necessity::get_necessity_by_id(&txn, necessity_id)
        .await?
        .ok_or(Error::NecessityNotFound { id: necessity_id })?;

    let mut active: money_contribution::ActiveModel = contribution.into();
    active.status = Set(ContributionStatus::Accepted);
    active.accepted_at = Set(Some(Utc::now()));
    let contribution = active.update(&txn).await?;

    let snapshot = necessity::load_necessity_snapshot(&txn, &target).await?;
    let pool = necessity::get_allocation_pool(&txn, necessity_id).await?;
    let trigger = AcceptedContribution {
        id: contribution.id,
        status: contribution.status,
        necessity_id: contribution.necessity_id,
    };
    let plan = allocation::allocate(&snapshot, &trigger, &pool)?;
    let allocation = fulfillment::apply_allocation_plan(&txn, &snapshot, &plan).await?;

    txn.commit().await?;

    info!(
        contribution_id,
        necessity_id,
        units = allocation.units_created.len(),
        remainder = allocation.remainder_contribution.is_some(),
        fully_funded = allocation.fully_funded,
        "Accepted contribution"
    );
    Ok(AcceptOutcome {
        contribution,
        allocation,
    })
}

/// Declines a pending contribution.
#[instrument(skip(db))]
pub async fn decline_contribution(
    db: &DatabaseConnection,
    contribution_id: i64,
) -> Result<money_contribution::Model> {
    let contribution = find_existing(db, contribution_id).await?;
    ensure_transition(&contribution, ContributionStatus::Declined)?;

    let mut active: money_contribution::ActiveModel = contribution.into();
    active.status = Set(ContributionStatus::Declined);
    let updated = active.update(db).await?;
    info!(contribution_id, "Declined contribution");
    Ok(updated)
}

/// Marks an accepted contribution as delivered in kind.
#[instrument(skip(db))]
pub async fn mark_fulfilled_in_kind(
    db: &DatabaseConnection,
    contribution_id: i64,
) -> Result<money_contribution::Model> {
    let contribution = find_existing(db, contribution_id).await?;
    ensure_transition(&contribution, ContributionStatus::FulfilledInKind)?;

    let mut active: money_contribution::ActiveModel = contribution.into();
    active.status = Set(ContributionStatus::FulfilledInKind);
    active.delivered_at = Set(Some(Utc::now()));
    let updated = active.update(db).await?;
    info!(contribution_id, "Contribution fulfilled in kind");
    Ok(updated)
}

/// When an accepted contribution stops waiting for delivery.
#[must_use]
pub fn delivery_deadline(
    contribution: &money_contribution::Model,
    window_days: i64,
) -> Option<DateTime<Utc>> {
    contribution
        .accepted_at
        .map(|accepted| accepted + Duration::days(window_days))
}

/// Expires accepted contributions whose delivery window has passed.
///
/// Contributions already consumed by a fulfillment are never expired: their
/// money lives on in the fulfilled units. Returns the expired contributions.
#[instrument(skip(db))]
pub async fn expire_stale_contributions(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
    window_days: i64,
) -> Result<Vec<money_contribution::Model>> {
    let txn = db.begin().await?;

    let accepted = MoneyContribution::find()
        .filter(money_contribution::Column::Status.eq(ContributionStatus::Accepted))
        .order_by_asc(money_contribution::Column::Id)
        .all(&txn)
        .await?;

    let mut consumed_by_necessity: HashSet<i64> = HashSet::new();
    let mut checked_necessities: HashSet<i64> = HashSet::new();
    let mut expired = Vec::new();
    for contribution in accepted {
        let Some(deadline) = delivery_deadline(&contribution, window_days) else {
            warn!(
                contribution_id = contribution.id,
                "Accepted contribution has no acceptance time"
            );
            continue;
        };
        if deadline >= now {
            continue;
        }
        if let Some(necessity_id) = contribution.necessity_id {
            if checked_necessities.insert(necessity_id) {
                consumed_by_necessity
                    .extend(get_consumed_contribution_ids(&txn, necessity_id).await?);
            }
            if consumed_by_necessity.contains(&contribution.id) {
                continue;
            }
        }

        let mut active: money_contribution::ActiveModel = contribution.into();
        active.status = Set(ContributionStatus::Expired);
        expired.push(active.update(&txn).await?);
    }

    txn.commit().await?;
    info!("Expired {} stale contributions", expired.len());
    Ok(expired)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::fulfillment::{get_fulfillment_source_ids, get_fulfillments_for_necessity};
    use crate::test_utils::*;
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_create_contribution_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let result =
            create_contribution(&db, "user1".to_string(), dec!(0), None, String::new()).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { .. }));

        let result =
            create_contribution(&db, "user1".to_string(), dec!(-10), None, String::new()).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn test_accept_contribution_not_found() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([Vec::<money_contribution::Model>::new()])
            .into_connection();

        let result = accept_contribution(&db, 999).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::ContributionNotFound { id: 999 }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_contribution_unknown_necessity() -> Result<()> {
        let db = setup_test_db().await?;
        let result =
            create_contribution(&db, "user1".to_string(), dec!(10), Some(42), String::new()).await;
        assert!(matches!(result.unwrap_err(), Error::NecessityNotFound { id: 42 }));
        Ok(())
    }

    #[tokio::test]
    async fn test_simple_acceptance_creates_one_unit() -> Result<()> {
        let (db, necessity) = setup_with_necessity().await?;

        let outcome = create_accepted_contribution(&db, necessity.id, dec!(100)).await?;

        assert_eq!(outcome.contribution.status, ContributionStatus::Accepted);
        assert!(outcome.contribution.accepted_at.is_some());
        assert_eq!(outcome.allocation.units_created.len(), 1);
        assert!(outcome.allocation.remainder_contribution.is_none());
        assert!(!outcome.allocation.fully_funded);

        let unit = &outcome.allocation.units_created[0];
        assert_eq!(
            get_fulfillment_source_ids(&db, unit.id).await?,
            vec![outcome.contribution.id]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_two_halves_make_one_unit() -> Result<()> {
        let (db, necessity) = setup_with_necessity().await?;

        let first = create_accepted_contribution(&db, necessity.id, dec!(50)).await?;
        assert!(first.allocation.units_created.is_empty());

        let second = create_accepted_contribution(&db, necessity.id, dec!(50)).await?;
        assert_eq!(second.allocation.units_created.len(), 1);
        assert!(second.allocation.remainder_contribution.is_none());

        let unit = &second.allocation.units_created[0];
        assert_eq!(
            get_fulfillment_source_ids(&db, unit.id).await?,
            vec![first.contribution.id, second.contribution.id]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_huge_acceptance_fills_necessity_and_spawns_remainder() -> Result<()> {
        let (db, necessity) = setup_with_necessity().await?;

        let outcome = create_accepted_contribution(&db, necessity.id, dec!(400)).await?;

        assert_eq!(outcome.allocation.units_created.len(), 3);
        assert!(outcome.allocation.fully_funded);

        let remainder = outcome.allocation.remainder_contribution.unwrap();
        assert_eq!(money::parse_amount(&remainder.amount)?, dec!(100));
        assert_eq!(remainder.status, ContributionStatus::Pending);
        assert_eq!(remainder.necessity_id, None);
        assert_eq!(remainder.contributor_id, outcome.contribution.contributor_id);
        assert_eq!(
            remainder.note,
            format!("remainder from contribution {}", outcome.contribution.id)
        );

        let unassigned = get_unassigned_contributions(&db).await?;
        assert_eq!(unassigned, vec![remainder]);
        Ok(())
    }

    #[tokio::test]
    async fn test_little_acceptance_stays_pooled() -> Result<()> {
        let (db, necessity) = setup_with_necessity().await?;

        let outcome = create_accepted_contribution(&db, necessity.id, dec!(10)).await?;

        assert!(outcome.allocation.units_created.is_empty());
        assert!(outcome.allocation.remainder_contribution.is_none());
        let pool = necessity::get_allocation_pool(&db, necessity.id).await?;
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].id, outcome.contribution.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_fully_funded_necessity_pools_further_money() -> Result<()> {
        let (db, necessity) = setup_with_necessity().await?;
        create_accepted_contribution(&db, necessity.id, dec!(300)).await?;

        let late = create_accepted_contribution(&db, necessity.id, dec!(500)).await?;

        assert!(late.allocation.fully_funded);
        assert!(late.allocation.units_created.is_empty());
        assert!(late.allocation.remainder_contribution.is_none());
        assert_eq!(get_fulfillments_for_necessity(&db, necessity.id).await?.len(), 3);

        let pool = necessity::get_allocation_pool(&db, necessity.id).await?;
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].id, late.contribution.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_carry_over_is_spent_by_next_acceptance() -> Result<()> {
        let (db, necessity) = setup_with_necessity().await?;

        let big = create_accepted_contribution(&db, necessity.id, dec!(150)).await?;
        assert_eq!(big.allocation.units_created.len(), 1);
        let carry = big.allocation.carried_over_contribution.unwrap();
        assert_eq!(money::parse_amount(&carry.amount)?, dec!(50));

        let small = create_accepted_contribution(&db, necessity.id, dec!(50)).await?;
        assert_eq!(small.allocation.units_created.len(), 1);
        let unit = &small.allocation.units_created[0];
        assert_eq!(
            get_fulfillment_source_ids(&db, unit.id).await?,
            vec![carry.id, small.contribution.id]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_conservation_across_many_acceptances() -> Result<()> {
        let db = setup_test_db().await?;
        let necessity = create_custom_necessity(&db, "Stoves", dec!(37.5), 5).await?;

        let amounts = [dec!(12.25), dec!(80), dec!(0.05), dec!(25.2), dec!(100), dec!(9.99)];
        let mut remainders = Decimal::ZERO;
        for amount in amounts {
            let outcome = create_accepted_contribution(&db, necessity.id, amount).await?;
            if let Some(r) = outcome.allocation.remainder_contribution {
                remainders += money::parse_amount(&r.amount)?;
            }
        }

        let consumed: HashSet<i64> = necessity::get_consumed_contribution_ids(&db, necessity.id)
            .await?
            .into_iter()
            .collect();
        let mut consumed_total = Decimal::ZERO;
        let mut open_carry = Decimal::ZERO;
        for c in get_contributions_for_necessity(&db, necessity.id).await? {
            let amount = money::parse_amount(&c.amount)?;
            if consumed.contains(&c.id) {
                consumed_total += amount;
            } else if c.note.starts_with("carried over") {
                open_carry += amount;
            }
        }
        // Spent carry-overs are internal transfers: their money was already counted
        // in the contribution they were split from.
        let spent_carry: Decimal = get_contributions_for_necessity(&db, necessity.id)
            .await?
            .into_iter()
            .filter(|c| consumed.contains(&c.id) && c.note.starts_with("carried over"))
            .map(|c| money::parse_amount(&c.amount))
            .sum::<Result<Decimal>>()?;

        let units = get_fulfillments_for_necessity(&db, necessity.id).await?.len();
        assert_eq!(
            consumed_total - spent_carry,
            dec!(37.5) * Decimal::from(units) + remainders + open_carry
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_accept_unlinked_is_invariant_violation() -> Result<()> {
        let db = setup_test_db().await?;
        let loose = create_test_contribution(&db, None, dec!(100)).await?;

        let result = accept_contribution(&db, loose.id).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvariantViolation { .. }
        ));

        // Nothing was written
        let unchanged = get_contribution_by_id(&db, loose.id).await?.unwrap();
        assert_eq!(unchanged.status, ContributionStatus::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn test_accept_twice_is_invalid_transition() -> Result<()> {
        let (db, necessity) = setup_with_necessity().await?;
        let outcome = create_accepted_contribution(&db, necessity.id, dec!(10)).await?;

        let result = accept_contribution(&db, outcome.contribution.id).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidStatusTransition {
                from: ContributionStatus::Accepted,
                to: ContributionStatus::Accepted,
                ..
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_remainder_can_be_reassigned_and_accepted() -> Result<()> {
        let (db, necessity) = setup_with_necessity().await?;
        let other = create_test_necessity(&db, "Lanterns").await?;
        let outcome = create_accepted_contribution(&db, necessity.id, dec!(400)).await?;
        let remainder = outcome.allocation.remainder_contribution.unwrap();

        let assigned = assign_necessity(&db, remainder.id, other.id).await?;
        assert_eq!(assigned.necessity_id, Some(other.id));

        let accepted = accept_contribution(&db, remainder.id).await?;
        assert_eq!(accepted.allocation.units_created.len(), 1);
        assert_eq!(accepted.allocation.units_created[0].necessity_id, other.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_assign_necessity_requires_pending() -> Result<()> {
        let (db, necessity) = setup_with_necessity().await?;
        let outcome = create_accepted_contribution(&db, necessity.id, dec!(10)).await?;

        let result = assign_necessity(&db, outcome.contribution.id, necessity.id).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidStatusTransition { .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_decline_and_deliver() -> Result<()> {
        let (db, necessity) = setup_with_necessity().await?;

        let pending = create_test_contribution(&db, Some(necessity.id), dec!(20)).await?;
        let declined = decline_contribution(&db, pending.id).await?;
        assert_eq!(declined.status, ContributionStatus::Declined);
        assert!(accept_contribution(&db, pending.id).await.is_err());

        let accepted = create_accepted_contribution(&db, necessity.id, dec!(20)).await?;
        let delivered = mark_fulfilled_in_kind(&db, accepted.contribution.id).await?;
        assert_eq!(delivered.status, ContributionStatus::FulfilledInKind);
        assert!(delivered.delivered_at.is_some());

        let again = create_test_contribution(&db, Some(necessity.id), dec!(20)).await?;
        assert!(matches!(
            mark_fulfilled_in_kind(&db, again.id).await.unwrap_err(),
            Error::InvalidStatusTransition { .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_expire_stale_contributions() -> Result<()> {
        let (db, necessity) = setup_with_necessity().await?;
        let consumed = create_accepted_contribution(&db, necessity.id, dec!(100)).await?;
        let pooled = create_accepted_contribution(&db, necessity.id, dec!(10)).await?;
        let pending = create_test_contribution(&db, Some(necessity.id), dec!(10)).await?;

        // Nothing is stale yet
        let expired = expire_stale_contributions(&db, Utc::now(), 30).await?;
        assert!(expired.is_empty());

        let later = Utc::now() + Duration::days(31);
        let expired = expire_stale_contributions(&db, later, 30).await?;
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, pooled.contribution.id);
        assert_eq!(expired[0].status, ContributionStatus::Expired);

        let still_accepted = get_contribution_by_id(&db, consumed.contribution.id)
            .await?
            .unwrap();
        assert_eq!(still_accepted.status, ContributionStatus::Accepted);
        let still_pending = get_contribution_by_id(&db, pending.id).await?.unwrap();
        assert_eq!(still_pending.status, ContributionStatus::Pending);
        Ok(())
    }

    #[test]
    fn test_delivery_deadline() {
        let accepted_at = Utc::now();
        let contribution = money_contribution::Model {
            id: 1,
            necessity_id: Some(1),
            contributor_id: "user1".to_string(),
            amount: "10".to_string(),
            status: ContributionStatus::Accepted,
            note: String::new(),
            accepted_at: Some(accepted_at),
            delivered_at: None,
            created_at: accepted_at,
        };
        assert_eq!(
            delivery_deadline(&contribution, 30),
            Some(accepted_at + Duration::days(30))
        );

        let pending = money_contribution::Model {
            accepted_at: None,
            status: ContributionStatus::Pending,
            ..contribution
        };
        assert_eq!(delivery_deadline(&pending, 30), None);
    }
}

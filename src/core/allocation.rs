//! Necessity allocation - Converts pooled money contributions into thing fulfillments.
//!
//! The allocator is a pure function over a snapshot taken once per acceptance.
//! It never touches the database; it returns an [`AllocationPlan`] describing the
//! units, remainder and carry-over to create, and the caller applies that plan
//! atomically (see [`crate::core::fulfillment::apply_allocation_plan`]).
//!
//! Contributions are spent in ascending id order. Small contributions are
//! combined until they cover a unit, a large contribution may fund several
//! consecutive units on its own, and whatever is left once the necessity is
//! fully funded becomes a new pending, unlinked contribution.

use crate::{
    entities::ContributionStatus,
    errors::{Error, Result},
};
use rust_decimal::Decimal;

/// Immutable view of a necessity at the moment an allocation starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NecessitySnapshot {
    /// Necessity id
    pub id: i64,
    /// Price of one unit, strictly positive
    pub unit_price: Decimal,
    /// Number of units needed in total
    pub target_count: u32,
    /// Fulfillments that already exist
    pub fulfilled_count: u32,
    /// Administrator credited as creator of new units
    pub owner_id: String,
    /// Version the snapshot was read at
    pub version: i64,
}

impl NecessitySnapshot {
    /// Units still missing; negative when over-fulfilled.
    #[must_use]
    pub fn still_needed(&self) -> i64 {
        i64::from(self.target_count) - i64::from(self.fulfilled_count)
    }
}

/// The contribution whose acceptance triggered the allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedContribution {
    /// Contribution id
    pub id: i64,
    /// Current status, must be `Accepted`
    pub status: ContributionStatus,
    /// Necessity the contribution is earmarked for
    pub necessity_id: Option<i64>,
}

/// An accepted, not yet consumed contribution available for allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PooledContribution {
    /// Contribution id
    pub id: i64,
    /// Amount pledged
    pub amount: Decimal,
    /// Who pledged it
    pub contributor_id: String,
}

/// One unit the allocator wants created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUnit {
    /// Contributions consumed by this unit, in spending order
    pub source_contribution_ids: Vec<i64>,
}

/// Leftover money to be recycled as a new contribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLeftover {
    /// Leftover amount, strictly positive
    pub amount: Decimal,
    /// Contributor of the contribution the money came from
    pub contributor_id: String,
    /// Contribution the money came from
    pub origin_contribution_id: i64,
}

impl PlannedLeftover {
    /// Note for a remainder spawned once the necessity is fully funded.
    #[must_use]
    pub fn remainder_note(&self) -> String {
        format!("remainder from contribution {}", self.origin_contribution_id)
    }

    /// Note for a carry-over that stays pooled for the same necessity.
    #[must_use]
    pub fn carry_over_note(&self) -> String {
        format!(
            "carried over from contribution {}",
            self.origin_contribution_id
        )
    }
}

/// Intended effects of one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllocationPlan {
    /// Units to create, in creation order
    pub units: Vec<PlannedUnit>,
    /// Pending, unlinked contribution for money left after the necessity filled up
    pub remainder: Option<PlannedLeftover>,
    /// Accepted, linked contribution for the unspent part of a partly consumed contribution
    pub carry_over: Option<PlannedLeftover>,
    /// Whether the necessity has no units left to fund after this plan
    pub fully_funded: bool,
}

impl AllocationPlan {
    /// A plan that writes nothing.
    #[must_use]
    pub fn has_effects(&self) -> bool {
        !self.units.is_empty() || self.remainder.is_some() || self.carry_over.is_some()
    }
}

/// Plans how pooled contributions fund units of `necessity`.
///
/// `pool` holds the accepted, unconsumed contributions linked to the necessity;
/// it is sorted by id here so the outcome never depends on the caller's order.
///
/// # Errors
/// * `Error::InvariantViolation` - the triggering contribution is not accepted,
///   not linked to `necessity`, or the unit price is not positive
/// * `Error::ConcurrentModification` - the triggering contribution is missing
///   from the pool, meaning the snapshot is stale
/// * `Error::InvalidAmount` - a pooled contribution has a non-positive amount
pub fn allocate(
    necessity: &NecessitySnapshot,
    accepted: &AcceptedContribution,
    pool: &[PooledContribution],
) -> Result<AllocationPlan> {
    match accepted.necessity_id {
        None => {
            return Err(Error::InvariantViolation {
                message: format!(
                    "contribution {} has no necessity to allocate against",
                    accepted.id
                ),
            });
        }
        Some(id) if id != necessity.id => {
            return Err(Error::InvariantViolation {
                message: format!(
                    "contribution {} is linked to necessity {id}, not {}",
                    accepted.id, necessity.id
                ),
            });
        }
        Some(_) => {}
    }
    if accepted.status != ContributionStatus::Accepted {
        return Err(Error::InvariantViolation {
            message: format!(
                "contribution {} is {:?}, only accepted contributions are allocated",
                accepted.id, accepted.status
            ),
        });
    }
    if necessity.unit_price <= Decimal::ZERO {
        return Err(Error::InvariantViolation {
            message: format!(
                "necessity {} has non-positive unit price {}",
                necessity.id, necessity.unit_price
            ),
        });
    }

    let mut still_needed = necessity.still_needed();
    if still_needed <= 0 {
        return Ok(AllocationPlan {
            fully_funded: true,
            ..AllocationPlan::default()
        });
    }

    let mut ordered: Vec<&PooledContribution> = pool.iter().collect();
    ordered.sort_by_key(|c| c.id);
    if !ordered.iter().any(|c| c.id == accepted.id) {
        return Err(Error::ConcurrentModification {
            necessity_id: necessity.id,
        });
    }
    if let Some(bad) = ordered.iter().find(|c| c.amount <= Decimal::ZERO) {
        return Err(Error::invalid_amount(bad.amount));
    }

    let unit_price = necessity.unit_price;
    let mut plan = AllocationPlan::default();
    let mut price_remaining = unit_price;
    let mut accumulated: Vec<i64> = Vec::new();
    // Unspent part of a contribution that already paid for an earlier unit.
    let mut partial: Option<PlannedLeftover> = None;

    for contribution in ordered {
        if still_needed == 0 {
            break;
        }
        accumulated.push(contribution.id);

        if contribution.amount < price_remaining {
            price_remaining -= contribution.amount;
            continue;
        }

        let mut surplus = contribution.amount - price_remaining;
        while surplus >= Decimal::ZERO && still_needed > 0 {
            plan.units.push(PlannedUnit {
                source_contribution_ids: std::mem::take(&mut accumulated),
            });
            partial = None;
            price_remaining = unit_price;
            still_needed -= 1;

            if surplus.is_zero() {
                break;
            }

            if still_needed == 0 {
                plan.remainder = Some(PlannedLeftover {
                    amount: surplus,
                    contributor_id: contribution.contributor_id.clone(),
                    origin_contribution_id: contribution.id,
                });
                plan.fully_funded = true;
                return Ok(plan);
            }

            // The same contribution keeps paying for the next unit.
            accumulated.push(contribution.id);
            if surplus < unit_price {
                price_remaining = unit_price - surplus;
                partial = Some(PlannedLeftover {
                    amount: surplus,
                    contributor_id: contribution.contributor_id.clone(),
                    origin_contribution_id: contribution.id,
                });
                break;
            }
            surplus -= unit_price;
        }
    }

    plan.carry_over = partial;
    plan.fully_funded = still_needed == 0;
    Ok(plan)
}

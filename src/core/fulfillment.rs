//! Thing fulfillment persistence - Applies allocation plans and reads their results.
//!
//! [`apply_allocation_plan`] is the write side of the allocator. It must be
//! called on an open transaction: every unit, source link and leftover
//! contribution of a plan is written there, so a failure anywhere rolls the
//! whole allocation back.

use crate::{
    core::{
        allocation::{AllocationPlan, NecessitySnapshot, PlannedLeftover},
        money,
    },
    entities::{
        ContributionStatus, FulfillmentSource, Necessity, ThingFulfillment, fulfillment_source,
        money_contribution, necessity, thing_fulfillment,
        thing_fulfillment::AUTO_GENERATED_NOTE,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};
use tracing::{debug, instrument};

/// Persisted outcome of one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllocationResult {
    /// Units created, in creation order
    pub units_created: Vec<thing_fulfillment::Model>,
    /// Pending, unlinked contribution holding money left after the necessity filled up
    pub remainder_contribution: Option<money_contribution::Model>,
    /// Accepted, linked contribution holding the unspent part of a partly consumed contribution
    pub carried_over_contribution: Option<money_contribution::Model>,
    /// Whether the necessity needs no further units
    pub fully_funded: bool,
}

/// Writes an allocation plan.
///
/// The necessity version is bumped with a compare-and-set against the snapshot
/// version; if another writer got there first nothing is written and
/// `Error::ConcurrentModification` is returned. Plans without effects write nothing.
#[instrument(skip(db, snapshot, plan), fields(necessity_id = snapshot.id, units = plan.units.len()))]
pub async fn apply_allocation_plan<C>(
    db: &C,
    snapshot: &NecessitySnapshot,
    plan: &AllocationPlan,
) -> Result<AllocationResult>
where
    C: ConnectionTrait,
{
    let mut result = AllocationResult {
        fully_funded: plan.fully_funded,
        ..AllocationResult::default()
    };
    if !plan.has_effects() {
        debug!("Allocation plan has no effects");
        return Ok(result);
    }

    let bumped = Necessity::update_many()
        .col_expr(
            necessity::Column::Version,
            Expr::col(necessity::Column::Version).add(1),
        )
        .filter(necessity::Column::Id.eq(snapshot.id))
        .filter(necessity::Column::Version.eq(snapshot.version))
        .exec(db)
        .await?;
    if bumped.rows_affected == 0 {
        return Err(Error::ConcurrentModification {
            necessity_id: snapshot.id,
        });
    }

    let now = Utc::now();
    let unit_price = money::to_storage(snapshot.unit_price);
    for unit in &plan.units {
        let fulfillment = thing_fulfillment::ActiveModel {
            necessity_id: Set(snapshot.id),
            unit_price: Set(unit_price.clone()),
            created_by: Set(snapshot.owner_id.clone()),
            note: Set(AUTO_GENERATED_NOTE.to_string()),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;

        for (position, contribution_id) in unit.source_contribution_ids.iter().enumerate() {
            let position = i32::try_from(position).map_err(|_| Error::InvariantViolation {
                message: format!("fulfillment {} has too many sources", fulfillment.id),
            })?;
            fulfillment_source::ActiveModel {
                fulfillment_id: Set(fulfillment.id),
                contribution_id: Set(*contribution_id),
                position: Set(position),
                ..Default::default()
            }
            .insert(db)
            .await?;
        }
        result.units_created.push(fulfillment);
    }

    if let Some(remainder) = &plan.remainder {
        let note = remainder.remainder_note();
        result.remainder_contribution = Some(
            insert_leftover(db, remainder, None, ContributionStatus::Pending, note, now).await?,
        );
    }
    if let Some(carry) = &plan.carry_over {
        let note = carry.carry_over_note();
        result.carried_over_contribution = Some(
            insert_leftover(
                db,
                carry,
                Some(snapshot.id),
                ContributionStatus::Accepted,
                note,
                now,
            )
            .await?,
        );
    }

    debug!(
        remainder = result.remainder_contribution.is_some(),
        carry_over = result.carried_over_contribution.is_some(),
        "Applied allocation plan"
    );
    Ok(result)
}

async fn insert_leftover<C>(
    db: &C,
    leftover: &PlannedLeftover,
    necessity_id: Option<i64>,
    status: ContributionStatus,
    note: String,
    now: DateTime<Utc>,
) -> Result<money_contribution::Model>
where
    C: ConnectionTrait,
{
    let accepted_at = (status == ContributionStatus::Accepted).then_some(now);
    money_contribution::ActiveModel {
        necessity_id: Set(necessity_id),
        contributor_id: Set(leftover.contributor_id.clone()),
        amount: Set(money::to_storage(leftover.amount)),
        status: Set(status),
        note: Set(note),
        accepted_at: Set(accepted_at),
        delivered_at: Set(None),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// All fulfillments of a necessity, in creation order.
pub async fn get_fulfillments_for_necessity<C>(
    db: &C,
    necessity_id: i64,
) -> Result<Vec<thing_fulfillment::Model>>
where
    C: ConnectionTrait,
{
    ThingFulfillment::find()
        .filter(thing_fulfillment::Column::NecessityId.eq(necessity_id))
        .order_by_asc(thing_fulfillment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Contribution ids that paid for a fulfillment, in spending order.
pub async fn get_fulfillment_source_ids<C>(db: &C, fulfillment_id: i64) -> Result<Vec<i64>>
where
    C: ConnectionTrait,
{
    let sources = FulfillmentSource::find()
        .filter(fulfillment_source::Column::FulfillmentId.eq(fulfillment_id))
        .order_by_asc(fulfillment_source::Column::Position)
        .all(db)
        .await?;
    Ok(sources.into_iter().map(|s| s.contribution_id).collect())
}

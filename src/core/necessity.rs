//! Necessity business logic - Creating necessities and reading allocation state.
//!
//! Besides plain CRUD this module provides the read side of the allocator: the
//! necessity snapshot and the candidate pool of accepted, unconsumed
//! contributions. Both take any `ConnectionTrait` so they can run inside the
//! acceptance transaction.

use crate::{
    config::settings::NecessitySeed,
    core::{
        allocation::{NecessitySnapshot, PooledContribution},
        money,
    },
    entities::{
        ContributionStatus, FulfillmentSource, MoneyContribution, Necessity, ThingFulfillment,
        fulfillment_source, money_contribution, necessity, thing_fulfillment,
    },
    errors::{Error, Result},
};
use rust_decimal::Decimal;
use sea_orm::{PaginatorTrait, QueryOrder, QuerySelect, Set, prelude::*};
use tracing::{debug, info, instrument, warn};

/// Creates a necessity after validating its name, price and count.
///
/// The unit price must be strictly positive; the target count is a plain
/// unsigned number of units and may be zero.
#[instrument(skip(db))]
pub async fn create_necessity<C>(
    db: &C,
    name: String,
    unit_price: Decimal,
    target_count: u32,
    owner_id: String,
) -> Result<necessity::Model>
where
    C: ConnectionTrait,
{
    if name.trim().is_empty() {
        return Err(Error::Config {
            message: "Necessity name cannot be empty".to_string(),
        });
    }
    money::ensure_positive(unit_price)?;
    let target_count = i32::try_from(target_count).map_err(|_| Error::Config {
        message: format!("Target count {target_count} is too large"),
    })?;

    let model = necessity::ActiveModel {
        name: Set(name.trim().to_string()),
        unit_price: Set(money::to_storage(unit_price)),
        target_count: Set(target_count),
        owner_id: Set(owner_id),
        version: Set(0),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };

    let created = model.insert(db).await?;
    info!(necessity_id = created.id, "Created necessity '{}'", created.name);
    Ok(created)
}

/// Finds a necessity by its unique ID.
pub async fn get_necessity_by_id<C>(db: &C, necessity_id: i64) -> Result<Option<necessity::Model>>
where
    C: ConnectionTrait,
{
    Necessity::find_by_id(necessity_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a necessity by exact name.
pub async fn get_necessity_by_name<C>(db: &C, name: &str) -> Result<Option<necessity::Model>>
where
    C: ConnectionTrait,
{
    Necessity::find()
        .filter(necessity::Column::Name.eq(name))
        .one(db)
        .await
        .map_err(Into::into)
}

/// All necessities, oldest first.
pub async fn get_all_necessities(db: &DatabaseConnection) -> Result<Vec<necessity::Model>> {
    Necessity::find()
        .order_by_asc(necessity::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Creates the configured necessities that do not exist yet.
///
/// Seeding is keyed by name, so running it on every start is harmless.
/// Returns the number of necessities created.
#[instrument(skip(db, seeds), fields(count = seeds.len()))]
pub async fn seed_necessities(db: &DatabaseConnection, seeds: &[NecessitySeed]) -> Result<usize> {
    let mut created = 0;
    for seed in seeds {
        if get_necessity_by_name(db, &seed.name).await?.is_some() {
            debug!("Necessity '{}' already exists, skipping", seed.name);
            continue;
        }
        let unit_price = money::parse_positive_amount(&seed.unit_price)?;
        create_necessity(
            db,
            seed.name.clone(),
            unit_price,
            seed.target_count,
            seed.owner_id.clone(),
        )
        .await?;
        created += 1;
    }
    info!("Seeded {created} necessities");
    Ok(created)
}

/// Number of thing fulfillments already created for a necessity.
pub async fn count_fulfillments<C>(db: &C, necessity_id: i64) -> Result<u64>
where
    C: ConnectionTrait,
{
    ThingFulfillment::find()
        .filter(thing_fulfillment::Column::NecessityId.eq(necessity_id))
        .count(db)
        .await
        .map_err(Into::into)
}

/// Ids of every contribution that some fulfillment of this necessity consumed.
pub async fn get_consumed_contribution_ids<C>(db: &C, necessity_id: i64) -> Result<Vec<i64>>
where
    C: ConnectionTrait,
{
    let fulfillment_ids: Vec<i64> = ThingFulfillment::find()
        .select_only()
        .column(thing_fulfillment::Column::Id)
        .filter(thing_fulfillment::Column::NecessityId.eq(necessity_id))
        .into_tuple()
        .all(db)
        .await?;
    if fulfillment_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut consumed: Vec<i64> = FulfillmentSource::find()
        .select_only()
        .column(fulfillment_source::Column::ContributionId)
        .filter(fulfillment_source::Column::FulfillmentId.is_in(fulfillment_ids))
        .into_tuple()
        .all(db)
        .await?;
    consumed.sort_unstable();
    consumed.dedup();
    Ok(consumed)
}

/// Accepted contributions linked to the necessity that no fulfillment consumed yet,
/// ordered by id ascending.
pub async fn get_pooled_contributions<C>(
    db: &C,
    necessity_id: i64,
) -> Result<Vec<money_contribution::Model>>
where
    C: ConnectionTrait,
{
    let consumed = get_consumed_contribution_ids(db, necessity_id).await?;

    let mut query = MoneyContribution::find()
        .filter(money_contribution::Column::NecessityId.eq(necessity_id))
        .filter(money_contribution::Column::Status.eq(ContributionStatus::Accepted));
    if !consumed.is_empty() {
        query = query.filter(money_contribution::Column::Id.is_not_in(consumed));
    }

    query
        .order_by_asc(money_contribution::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// The candidate pool in the shape the allocator consumes.
pub async fn get_allocation_pool<C>(db: &C, necessity_id: i64) -> Result<Vec<PooledContribution>>
where
    C: ConnectionTrait,
{
    get_pooled_contributions(db, necessity_id)
        .await?
        .into_iter()
        .map(|c| {
            Ok(PooledContribution {
                amount: money::parse_amount(&c.amount)?,
                id: c.id,
                contributor_id: c.contributor_id,
            })
        })
        .collect()
}

/// Reads the necessity state an allocation runs against.
pub async fn load_necessity_snapshot<C>(
    db: &C,
    necessity: &necessity::Model,
) -> Result<NecessitySnapshot>
where
    C: ConnectionTrait,
{
    let unit_price = money::parse_amount(&necessity.unit_price)?;
    let target_count = u32::try_from(necessity.target_count).map_err(|_| {
        Error::InvariantViolation {
            message: format!(
                "necessity {} has negative target count {}",
                necessity.id, necessity.target_count
            ),
        }
    })?;

    let fulfilled = count_fulfillments(db, necessity.id).await?;
    let fulfilled_count = u32::try_from(fulfilled).unwrap_or_else(|_| {
        warn!(necessity_id = necessity.id, fulfilled, "Fulfillment count overflows u32");
        u32::MAX
    });

    Ok(NecessitySnapshot {
        id: necessity.id,
        unit_price,
        target_count,
        fulfilled_count,
        owner_id: necessity.owner_id.clone(),
        version: necessity.version,
    })
}

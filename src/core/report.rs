//! Necessity progress reporting.
//!
//! Produces structured progress data for a necessity (units funded, units
//! missing, money waiting in the pool, distinct supporters) and a compact text
//! rendering of it for logs.

use crate::{
    core::{fulfillment, money, necessity},
    entities::{ContributionStatus, necessity as necessity_entity},
    errors::{Error, Result},
};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use std::collections::HashSet;

/// Progress of a single necessity.
#[derive(Debug, Clone)]
pub struct NecessityReport {
    /// The necessity being reported on
    pub necessity: necessity_entity::Model,
    /// Price of one unit
    pub unit_price: Decimal,
    /// Units created so far
    pub fulfilled_count: u64,
    /// Units still missing, zero once fully funded
    pub still_needed: u64,
    /// Accepted money not yet turned into units
    pub pooled_amount: Decimal,
    /// Distinct contributors with accepted or delivered money for this necessity
    pub supporter_count: usize,
    /// Funded units as a percentage of the target (0-100, can exceed 100)
    pub progress_percent: f64,
}

/// Builds the progress report for a necessity.
pub async fn generate_necessity_report(
    db: &DatabaseConnection,
    necessity_id: i64,
) -> Result<NecessityReport> {
    let record = necessity::get_necessity_by_id(db, necessity_id)
        .await?
        .ok_or(Error::NecessityNotFound { id: necessity_id })?;

    let unit_price = money::parse_amount(&record.unit_price)?;
    let fulfilled_count = u64::try_from(
        fulfillment::get_fulfillments_for_necessity(db, necessity_id)
            .await?
            .len(),
    )
    .unwrap_or(u64::MAX);
    let target = u64::try_from(record.target_count).unwrap_or(0);
    let still_needed = target.saturating_sub(fulfilled_count);

    let pooled_amount = necessity::get_allocation_pool(db, necessity_id)
        .await?
        .iter()
        .map(|c| c.amount)
        .sum();

    let supporters: HashSet<String> =
        crate::core::contribution::get_contributions_for_necessity(db, necessity_id)
            .await?
            .into_iter()
            .filter(|c| {
                matches!(
                    c.status,
                    ContributionStatus::Accepted | ContributionStatus::FulfilledInKind
                )
            })
            .map(|c| c.contributor_id)
            .collect();

    Ok(NecessityReport {
        progress_percent: calculate_progress(fulfilled_count, target),
        necessity: record,
        unit_price,
        fulfilled_count,
        still_needed,
        pooled_amount,
        supporter_count: supporters.len(),
    })
}

/// Percentage of the target that is funded. A zero target counts as complete.
#[must_use]
pub fn calculate_progress(fulfilled: u64, target: u64) -> f64 {
    if target == 0 {
        return 100.0;
    }

    // Unit counts stay far below 2^52.
    #[allow(clippy::cast_precision_loss)]
    let (fulfilled, target) = (fulfilled as f64, target as f64);
    (fulfilled / target) * 100.0
}

/// Generates a progress bar string for visual representation.
///
/// Creates a text-based progress bar like: `[████████░░] 80.0%`
#[must_use]
pub fn format_progress_bar(progress_percent: f64, bar_length: Option<usize>) -> String {
    let length = bar_length.unwrap_or(10);
    let clamped_progress = progress_percent.clamp(0.0, 100.0);

    // Cast safety: clamped_progress ∈ [0, 100], length is small (10-20).
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let filled = ((clamped_progress / 100.0) * length as f64).round() as usize;
    let empty = length.saturating_sub(filled);

    let filled_str = "█".repeat(filled);
    let empty_str = "░".repeat(empty);

    format!("[{filled_str}{empty_str}] {progress_percent:.1}%")
}

/// One-line summary of a necessity report.
#[must_use]
pub fn format_necessity_report(report: &NecessityReport) -> String {
    let bar = format_progress_bar(report.progress_percent, None);
    format!(
        "{name} {bar} | {fulfilled}/{target} units at {price} | {pooled} pooled | {supporters} supporters",
        name = report.necessity.name,
        fulfilled = report.fulfilled_count,
        target = report.necessity.target_count,
        price = money::format_amount(report.unit_price),
        pooled = money::format_amount(report.pooled_amount),
        supporters = report.supporter_count,
    )
}

//! Shared test utilities for the necessity ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    core::{
        contribution::{self, AcceptOutcome},
        necessity,
    },
    entities,
    errors::Result,
};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use tracing_subscriber::EnvFilter;

/// Routes `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a test necessity with sensible defaults.
///
/// # Defaults
/// * `unit_price`: 100
/// * `target_count`: 3
/// * `owner_id`: "admin"
pub async fn create_test_necessity(
    db: &DatabaseConnection,
    name: &str,
) -> Result<entities::necessity::Model> {
    create_custom_necessity(db, name, Decimal::ONE_HUNDRED, 3).await
}

/// Creates a test necessity with a custom price and target.
pub async fn create_custom_necessity(
    db: &DatabaseConnection,
    name: &str,
    unit_price: Decimal,
    target_count: u32,
) -> Result<entities::necessity::Model> {
    necessity::create_necessity(
        db,
        name.to_string(),
        unit_price,
        target_count,
        "admin".to_string(),
    )
    .await
}

/// Creates a pending contribution from `"test_user"`.
pub async fn create_test_contribution(
    db: &DatabaseConnection,
    necessity_id: Option<i64>,
    amount: Decimal,
) -> Result<entities::money_contribution::Model> {
    contribution::create_contribution(
        db,
        "test_user".to_string(),
        amount,
        necessity_id,
        "Test contribution".to_string(),
    )
    .await
}

/// Creates a contribution from `"test_user"` and accepts it right away.
pub async fn create_accepted_contribution(
    db: &DatabaseConnection,
    necessity_id: i64,
    amount: Decimal,
) -> Result<AcceptOutcome> {
    create_custom_accepted_contribution(db, necessity_id, amount, "test_user").await
}

/// Creates a contribution from `contributor_id` and accepts it right away.
pub async fn create_custom_accepted_contribution(
    db: &DatabaseConnection,
    necessity_id: i64,
    amount: Decimal,
    contributor_id: &str,
) -> Result<AcceptOutcome> {
    let created = contribution::create_contribution(
        db,
        contributor_id.to_string(),
        amount,
        Some(necessity_id),
        "Test contribution".to_string(),
    )
    .await?;
    contribution::accept_contribution(db, created.id).await
}

/// Sets up a complete test environment with a necessity of 3 units at 100.
/// Returns (db, necessity) for common test scenarios.
pub async fn setup_with_necessity() -> Result<(DatabaseConnection, entities::necessity::Model)> {
    let db = setup_test_db().await?;
    let necessity = create_test_necessity(&db, "Test Necessity").await?;
    Ok((db, necessity))
}

//! Core business logic - framework-agnostic necessity, contribution and allocation operations.

/// Pure allocation of pooled contributions into thing fulfillments
pub mod allocation;
/// Contribution lifecycle and the acceptance workflow
pub mod contribution;
/// Persisting allocation plans and reading fulfillments
pub mod fulfillment;
/// Exact decimal money helpers
pub mod money;
/// Necessity CRUD, snapshots and the allocation pool
pub mod necessity;
/// Necessity progress reports
pub mod report;

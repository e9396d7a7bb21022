//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod fulfillment_source;
pub mod money_contribution;
pub mod necessity;
pub mod thing_fulfillment;

// Re-export specific types to avoid conflicts
pub use fulfillment_source::{
    Column as FulfillmentSourceColumn, Entity as FulfillmentSource, Model as FulfillmentSourceModel,
};
pub use money_contribution::{
    Column as MoneyContributionColumn, ContributionStatus, Entity as MoneyContribution,
    Model as MoneyContributionModel,
};
pub use necessity::{Column as NecessityColumn, Entity as Necessity, Model as NecessityModel};
pub use thing_fulfillment::{
    Column as ThingFulfillmentColumn, Entity as ThingFulfillment, Model as ThingFulfillmentModel,
};

// Read/write access to the betting application's GraphQL service
pub mod client;
pub mod graphql;
pub mod models;

pub use client::{LedgerClient, SnapshotSource};

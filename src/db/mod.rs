//! Database Module
//!
//! Relational composition over six clustered indexes.
//!
//! ## Tables
//! ```text
//! invoices ──────────────┐ clustered by date, PK id
//!   id ◄─────────────────┼── purchase_groups.invoice_id   (clustered, PK id)
//!                        │     first_client_id ──► clients.id
//!                        │     id ◄── client_group_relation.group_id ──► clients.id
//!                        │     id ◄── purchases.group_id ──► items.id
//! clients, items ────────┘ clustered by id, PK id
//! ```
//!
//! ## Read Path
//! Invoice row → range query groups by invoice id (must match
//! `groups_count`) → per group: first client inline, extra clients by range
//! query on the relation table (`clients_count - 1`), purchases by range
//! query on group id (`purchases_count`). Clients and items resolve through a
//! [`JoinCache`] shared by one read. A missing expected row is
//! `DataCorrupted`.

mod database;
mod join;
mod model;
pub mod rows;

pub use database::{Database, DatabaseStats, TableStats, INVOICE_COUNT_KEY};
pub use join::JoinCache;
pub use model::{Client, DateMode, Invoice, Item, Purchase, PurchaseGroup};

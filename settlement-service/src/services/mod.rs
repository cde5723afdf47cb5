//! Data layer: connection pool plus per-domain operations on [`Database`].

pub mod billing_run;
pub mod complaints;
pub mod customers;
pub mod database;
pub mod invoices;
pub mod ledger;
pub mod metrics;
pub mod outbox;
pub mod payments;

pub use database::Database;
pub use metrics::get_metrics;

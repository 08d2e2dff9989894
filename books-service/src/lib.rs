//! Books Service - double-entry ledger and statement reconciliation.

pub mod config;
pub mod models;
pub mod routes;
pub mod services;
pub mod startup;

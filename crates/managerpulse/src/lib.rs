//! ManagerPulse back-office: the review dataset schema, its scoring rules,
//! a generic admin surface, bulk import/export and deployment bootstrap.

pub mod accounts;
pub mod admin;
pub mod aggregation;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod error;
pub mod interchange;
pub mod scoring;
pub mod store;
pub mod telemetry;

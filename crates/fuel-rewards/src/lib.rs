//! Commission and cashback engine for a fuel loyalty program, with rule administration, an HTTP
//! surface, and batch recalculation of historical sales.

pub mod commission;
pub mod config;
pub mod error;
pub mod import;
pub mod recalculation;
pub mod telemetry;

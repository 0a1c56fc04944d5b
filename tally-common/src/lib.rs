//! # Tally Common Library
//!
//! Shared code for the Tally services:
//! - Error types
//! - The closed classification label set (`Category`)
//! - Reconciled metrics (`Metric`)
//! - Event types and the `EventBus`
//! - Bootstrap configuration loading

pub mod category;
pub mod config;
pub mod error;
pub mod events;
pub mod metric;

pub use category::{Category, DecisionPath};
pub use error::{Error, Result};
pub use metric::Metric;

//! Analysis modules.
//!
//! Aggregation of observations into a scan session and the statistics
//! reports are built from.

pub mod aggregator;

pub use aggregator::*;

//! Aggregation of scored dimensions into a ranking.

pub mod aggregator;

pub use aggregator::aggregate;

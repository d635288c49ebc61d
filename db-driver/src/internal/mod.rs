//! Internal implementation details for the driver.

pub(crate) mod eval;

pub(crate) use eval::Plan;

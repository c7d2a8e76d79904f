// watchtrack-common: shared domain types and pure algorithms for watchtrack

pub mod interval;
pub mod progress;
pub mod protocol;
pub mod tracking;
pub mod types;
pub mod validation;

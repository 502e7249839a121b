pub mod filed_list;
pub mod rate_gate;

pub use filed_list::{FiledList, ProcessedSet};
pub use rate_gate::RateGate;

//! Services layer - the write patterns
//!
//! This module contains the services that run each write pattern against the
//! repositories:
//! - `WriteService` for the single-operation patterns
//! - `FanoutService` for the concurrent independent writes
//! - `demo_data` for the records the demonstration run writes

pub mod demo_data;
pub mod fanout;
pub mod writes;

pub use fanout::{ConcurrentWrites, FanoutService, ProfileUpdate};
pub use writes::WriteService;

//! Testing utilities and mock implementations
//!
//! Lets the connection actor be exercised without a network or wall-clock
//! time: a recording transport factory and a manually advanced scheduler.

pub mod clock;
pub mod mocks;

pub use clock::ManualScheduler;
pub use mocks::*;

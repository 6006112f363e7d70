//! Shared test mocks and utilities for the conference system.

mod clock;
mod process;
mod queue;
mod repository;

pub use clock::{FixedClock, ManualClock, fixed_now};
pub use process::InMemoryProcessRepository;
pub use queue::InMemoryMessageQueue;
pub use repository::{FailingEventRepository, InMemoryEventRepository};

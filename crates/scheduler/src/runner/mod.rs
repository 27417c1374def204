//! Frame scheduler runner -- owns the task queue and drains it frame by frame.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, submission, shutdown and accessors
//! - `drain`: the frame-budgeted drain loop, settlement and async continuations

mod core;
mod drain;

pub use self::core::Scheduler;
pub use self::drain::FrameReport;

pub mod config;
pub mod error;
pub mod heap;

pub use config::{load_dotenv, SchedulerConfig};
pub use error::ConfigError;
pub use heap::PriorityHeap;

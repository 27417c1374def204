mod driver;
pub mod error;
pub mod handle;
pub mod host;
pub mod metrics;
pub mod runner;
pub mod step;
pub mod task;

pub use error::TaskError;
pub use framesched_core::{load_dotenv, ConfigError, PriorityHeap, SchedulerConfig};
pub use handle::Handle;
pub use host::{Host, ManualHost, TokioHost};
pub use metrics::{FrameRate, SchedulerMetrics};
pub use runner::{FrameReport, Scheduler};
pub use step::{call, from_fn, from_future, run_to_completion, Computation, Step};
pub use task::{CancelSignal, Observer, SubmitOptions, TaskId, TaskSnapshot, TaskState};

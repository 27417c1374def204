use std::sync::Arc;

use thiserror::Error;

/// Why a task's handle settled without a value.
///
/// Clonable so the same rejection can be reported to the handle and
/// recorded on the task snapshot.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The computation returned an error, synchronously or from an awaited suspension.
    #[error("task failed: {0}")]
    Failed(Arc<anyhow::Error>),

    /// The computation panicked while being advanced.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task was canceled before it could be resumed.
    #[error("task canceled")]
    Canceled,

    /// The scheduler shut down (or was dropped) before the task settled.
    #[error("scheduler shut down")]
    Shutdown,
}

impl TaskError {
    pub fn failed(err: anyhow::Error) -> Self {
        TaskError::Failed(Arc::new(err))
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TaskError::Panicked(message)
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskError::Canceled)
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, TaskError::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let err = TaskError::from_panic(Box::new("boom"));
        assert!(matches!(err, TaskError::Panicked(ref m) if m == "boom"));

        let err = TaskError::from_panic(Box::new(String::from("owned boom")));
        assert!(matches!(err, TaskError::Panicked(ref m) if m == "owned boom"));

        let err = TaskError::from_panic(Box::new(17u32));
        assert!(matches!(err, TaskError::Panicked(_)));
    }

    #[test]
    fn failed_displays_source_message() {
        let err = TaskError::failed(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.to_string(), "task failed: disk on fire");
        assert!(!err.is_canceled());
        assert!(TaskError::Canceled.is_canceled());
        assert!(TaskError::Shutdown.is_shutdown());
    }
}

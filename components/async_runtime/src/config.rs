//! Callback queue configuration.

use serde::{Deserialize, Serialize};

/// How a [`CallbackQueue`](crate::CallbackQueue) executes its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Tasks wait until the host drains the queue
    Manual,
    /// A dedicated worker thread drains the queue as tasks arrive
    Worker,
}

/// Configuration for a callback queue.
///
/// Every field has a default, so a partial document deserializes.
///
/// # Examples
///
/// ```
/// use async_runtime::{DispatchMode, QueueConfig};
///
/// let config = QueueConfig::manual().with_report_unhandled(false);
/// assert_eq!(config.mode, DispatchMode::Manual);
/// assert!(!config.report_unhandled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Dispatch mode
    pub mode: DispatchMode,
    /// Name of the worker thread (worker mode only)
    pub thread_name: String,
    /// Whether unhandled rejections found at the end of a drain are reported
    pub report_unhandled: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            mode: DispatchMode::Worker,
            thread_name: "promise-callbacks".to_string(),
            report_unhandled: true,
        }
    }
}

impl QueueConfig {
    /// Default configuration for a host-drained queue.
    pub fn manual() -> Self {
        Self {
            mode: DispatchMode::Manual,
            ..Self::default()
        }
    }

    /// Default configuration for a worker-drained queue.
    pub fn worker() -> Self {
        Self::default()
    }

    /// Sets the worker thread name.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Enables or disables unhandled rejection reports for this queue.
    pub fn with_report_unhandled(mut self, report: bool) -> Self {
        self.report_unhandled = report;
        self
    }
}

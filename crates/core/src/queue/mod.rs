//! Task queue - a bounded worker pool for conversion tasks.
//!
//! Each submitted task gets its own
//! [`CancellationToken`](tokio_util::sync::CancellationToken). Cancelling a
//! task that has not started withdraws it for good; cancelling a running
//! task signals the token and leaves termination to the work itself.
//!
//! # Example
//!
//! ```ignore
//! use omniconvert_core::queue::{QueueConfig, TaskOutcome, TaskQueue};
//!
//! let queue = TaskQueue::new(QueueConfig::default().with_workers(2));
//! let handle = queue
//!     .submit("task-1", |token| async move {
//!         // ... run until done or token.cancelled() ...
//!         TaskOutcome::Done
//!     })
//!     .await?;
//!
//! let status = handle.wait().await;
//! queue.shutdown().await;
//! ```

mod config;
mod task_queue;
mod types;

pub use config::QueueConfig;
pub use task_queue::TaskQueue;
pub use types::{PoolStatus, QueueError, TaskHandle, TaskOutcome, TaskStatus};

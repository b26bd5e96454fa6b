//! Conversion service - the entry point used by front ends.
//!
//! Turns a (file, target format) request into a routed [`Task`], schedules
//! it on the [`TaskQueue`](crate::queue::TaskQueue) and forwards
//! [`TaskEvent`]s to a subscriber callback.
//!
//! # Example
//!
//! ```rust,ignore
//! use omniconvert_core::service::{ConversionRequest, ConversionService};
//!
//! let service = ConversionService::from_config(&config)
//!     .with_subscriber(Arc::new(|event| println!("{:?}", event)));
//!
//! let handle = service
//!     .enqueue(ConversionRequest::new("/videos/clip.mp4", "gif"))
//!     .await?;
//! handle.wait().await;
//! ```

mod output;
mod runner;
mod types;

pub use output::resolve_output_path;
pub use runner::ConversionService;
pub use types::{ConversionRequest, ServiceError, Task, TaskEvent, TaskEventCallback};

//! Pipeline module - executes conversion plans.
//!
//! The [`PipelineExecutor`] runs the steps of a [`Plan`](crate::pathfinder::Plan)
//! strictly in order, feeding each step's output into the next:
//! - Intermediate files get collision-free names in the temp directory and
//!   are deleted as soon as the following step has consumed them
//! - The final step writes a hidden staging file next to the destination,
//!   which is renamed into place only after the step succeeds
//! - Engine progress is rescaled into one non-decreasing fraction for the
//!   whole plan
//!
//! On failure or cancellation every file the plan created is removed and the
//! destination is left untouched.
//!
//! # Example
//!
//! ```ignore
//! use omniconvert_core::pipeline::{ExecutionRequest, PipelineConfig, PipelineExecutor};
//!
//! let executor = PipelineExecutor::new(PipelineConfig::default(), registry);
//! let plan = Pathfinder::new().find_path("mp4", "pdf")?;
//!
//! let request = ExecutionRequest {
//!     job_id: "job-1".to_string(),
//!     input_path: PathBuf::from("/videos/talk.mp4"),
//!     output_path: PathBuf::from("/exports/talk.pdf"),
//!     plan,
//! };
//!
//! let outcome = executor
//!     .execute(request, &CancellationToken::new(), |p| println!("{:.0}%", p.fraction * 100.0))
//!     .await?;
//! ```

mod config;
mod error;
mod executor;
mod types;

pub use config::PipelineConfig;
pub use error::ExecutionError;
pub use executor::PipelineExecutor;
pub use types::{
    ExecutionOutcome, ExecutionProgress, ExecutionReport, ExecutionRequest, StepReport,
};

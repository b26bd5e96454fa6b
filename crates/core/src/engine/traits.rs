//! Trait definitions for the engine module.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::EngineError;
use super::types::{StepJob, StepOutput, StepProgress};
use crate::catalog::EngineKind;

/// A conversion backend able to execute one format transition.
///
/// Implementations must honor `cancel`: once the token fires, an in-flight
/// `run` stops its work promptly and returns [`EngineError::Cancelled`].
/// Cancelling is idempotent and may happen from any task.
#[async_trait]
pub trait Engine: Send + Sync {
    /// The engine kind this backend serves.
    fn kind(&self) -> EngineKind;

    /// Returns the name of this engine implementation.
    fn name(&self) -> &str;

    /// Runs one step.
    ///
    /// Progress is reported as local fractions in `[0, 1]`. If the receiver
    /// is dropped, the step continues without progress reporting.
    async fn run(
        &self,
        job: StepJob,
        progress_tx: mpsc::Sender<StepProgress>,
        cancel: CancellationToken,
    ) -> Result<StepOutput, EngineError>;

    /// Validates that the engine's external programs are available.
    async fn validate(&self) -> Result<(), EngineError>;
}

//! Types produced by the pathfinder.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::{EngineKind, Format};

/// One format transition executed by a single engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStep {
    pub source_format: Format,
    pub target_format: Format,
    pub engine: EngineKind,
}

impl ConversionStep {
    pub fn new(source_format: Format, target_format: Format, engine: EngineKind) -> Self {
        Self {
            source_format,
            target_format,
            engine,
        }
    }
}

impl fmt::Display for ConversionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({})",
            self.source_format, self.target_format, self.engine
        )
    }
}

/// An ordered chain of steps connecting a source format to a target format.
///
/// Each step's target feeds the next step's source. Plans are only built by
/// the [`Pathfinder`](super::Pathfinder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    source: Format,
    target: Format,
    steps: Vec<ConversionStep>,
}

impl Plan {
    pub(crate) fn new(source: Format, target: Format, steps: Vec<ConversionStep>) -> Self {
        debug_assert!(!steps.is_empty(), "plans always have at least one step");
        Self {
            source,
            target,
            steps,
        }
    }

    /// The requested source format.
    pub fn source(&self) -> &Format {
        &self.source
    }

    /// The requested target format.
    pub fn target(&self) -> &Format {
        &self.target
    }

    pub fn steps(&self) -> &[ConversionStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether the plan is a single direct conversion.
    pub fn is_direct(&self) -> bool {
        self.steps.len() == 1
    }

    /// Engines used by the plan, in step order (may repeat).
    pub fn engines(&self) -> impl Iterator<Item = EngineKind> + '_ {
        self.steps.iter().map(|s| s.engine)
    }

    /// Formats produced between the first and last step.
    pub fn intermediate_formats(&self) -> impl Iterator<Item = &Format> + '_ {
        let n = self.steps.len();
        self.steps
            .iter()
            .take(n.saturating_sub(1))
            .map(|s| &s.target_format)
    }

    /// Checks that the steps form an unbroken chain from source to target.
    pub fn is_chained(&self) -> bool {
        let (Some(first), Some(last)) = (self.steps.first(), self.steps.last()) else {
            return false;
        };
        first.source_format == self.source
            && last.target_format == self.target
            && self
                .steps
                .windows(2)
                .all(|pair| pair[0].target_format == pair[1].source_format)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)?;
        for step in &self.steps {
            write!(f, " -[{}]-> {}", step.engine, step.target_format)?;
        }
        Ok(())
    }
}

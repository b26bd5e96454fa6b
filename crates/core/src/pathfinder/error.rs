//! Error types for routing.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::catalog::Format;

/// Which end of a conversion request a format was given for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatRole {
    Source,
    Target,
}

impl fmt::Display for FormatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Target => f.write_str("target"),
        }
    }
}

/// Errors that prevent a plan from being built.
///
/// Both variants are raised before any engine runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// The format is not in the catalog.
    #[error("Unknown {role} format: {format:?}")]
    UnknownFormat { format: Format, role: FormatRole },

    /// Both formats are known but their categories are not connected.
    #[error("No conversion path from {from} to {to}")]
    NoPathFound { from: Format, to: Format },
}

impl RoutingError {
    pub fn unknown_source(format: Format) -> Self {
        Self::UnknownFormat {
            format,
            role: FormatRole::Source,
        }
    }

    pub fn unknown_target(format: Format) -> Self {
        Self::UnknownFormat {
            format,
            role: FormatRole::Target,
        }
    }
}

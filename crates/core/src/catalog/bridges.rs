//! Directed bridges between categories.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{Category, Format};
use super::formats_in;

/// A directed edge between two categories.
///
/// A file in `from` can be turned into `format` (a member of `from` or `to`)
/// as a step toward reaching `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bridge {
    pub from: Category,
    pub to: Category,
    pub format: Format,
}

impl Bridge {
    pub fn new(from: Category, to: Category, format: impl Into<Format>) -> Self {
        Self {
            from,
            to,
            format: format.into(),
        }
    }
}

/// Errors found when validating a bridge table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("bridge {from} -> {to} loops onto its own category")]
    SelfLoop { from: Category, to: Category },

    #[error("bridge {from} -> {to} uses {format}, which belongs to neither category")]
    ForeignFormat {
        from: Category,
        to: Category,
        format: Format,
    },

    #[error("bridge {from} -> {to} is defined more than once")]
    Duplicate { from: Category, to: Category },
}

/// Ordered set of bridges.
///
/// Definition order matters: when two category paths have the same length,
/// the search prefers the one whose edges were defined first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeTable {
    bridges: Vec<Bridge>,
}

impl Default for BridgeTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl BridgeTable {
    /// The built-in bridge table.
    pub fn standard() -> Self {
        Self {
            bridges: vec![
                // Still frame
                Bridge::new(Category::Video, Category::Image, "jpg"),
                // Soundtrack extraction
                Bridge::new(Category::Video, Category::Audio, "wav"),
                // Audio over a generated video track
                Bridge::new(Category::Audio, Category::Video, "mp4"),
                Bridge::new(Category::Image, Category::Document, "pdf"),
                Bridge::new(Category::Document, Category::Image, "pdf"),
                Bridge::new(Category::Document, Category::Ebook, "epub"),
                Bridge::new(Category::Ebook, Category::Document, "html"),
            ],
        }
    }

    /// A table with no bridges at all.
    pub fn empty() -> Self {
        Self {
            bridges: Vec::new(),
        }
    }

    /// Returns a copy of this table with one more bridge appended.
    ///
    /// An existing edge between the same categories is replaced in place.
    pub fn with_bridge(mut self, bridge: Bridge) -> Self {
        match self
            .bridges
            .iter_mut()
            .find(|b| b.from == bridge.from && b.to == bridge.to)
        {
            Some(existing) => *existing = bridge,
            None => self.bridges.push(bridge),
        }
        self
    }

    /// Looks up the bridge format for a directed category pair.
    pub fn get(&self, from: Category, to: Category) -> Option<&Format> {
        self.bridges
            .iter()
            .find(|b| b.from == from && b.to == to)
            .map(|b| &b.format)
    }

    /// Returns the categories directly reachable from `from`, in definition order.
    pub fn neighbors(&self, from: Category) -> impl Iterator<Item = Category> + '_ {
        self.bridges
            .iter()
            .filter(move |b| b.from == from)
            .map(|b| b.to)
    }

    /// Iterates over all bridges in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Bridge> {
        self.bridges.iter()
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }

    /// Checks the structural rules every table must satisfy.
    pub fn validate(&self) -> Result<(), BridgeError> {
        for (idx, bridge) in self.bridges.iter().enumerate() {
            if bridge.from == bridge.to {
                return Err(BridgeError::SelfLoop {
                    from: bridge.from,
                    to: bridge.to,
                });
            }

            let format = bridge.format.as_str();
            if !formats_in(bridge.from).contains(&format) && !formats_in(bridge.to).contains(&format)
            {
                return Err(BridgeError::ForeignFormat {
                    from: bridge.from,
                    to: bridge.to,
                    format: bridge.format.clone(),
                });
            }

            if self.bridges[..idx]
                .iter()
                .any(|b| b.from == bridge.from && b.to == bridge.to)
            {
                return Err(BridgeError::Duplicate {
                    from: bridge.from,
                    to: bridge.to,
                });
            }
        }
        Ok(())
    }
}

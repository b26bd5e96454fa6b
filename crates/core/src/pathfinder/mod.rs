//! Pathfinder - computes conversion plans between arbitrary formats.
//!
//! Formats in the same category convert directly with that category's
//! engine. Across categories the pathfinder runs a breadth-first search over
//! the category graph induced by the [`BridgeTable`], so plans always use the
//! fewest category hops. Equal-length paths are decided by bridge definition
//! order.
//!
//! Each hop is executed by the engine of the hop's *source* category, which
//! produces the bridge format. If the last bridge format is not the exact
//! target, a final corrective step runs on the *target* category's engine.
//!
//! # Example
//!
//! ```
//! use omniconvert_core::pathfinder::Pathfinder;
//!
//! let pathfinder = Pathfinder::new();
//! let plan = pathfinder.find_path("mp4", "docx").unwrap();
//! assert_eq!(plan.steps().last().unwrap().target_format, "docx");
//! ```

mod error;
mod types;

pub use error::{FormatRole, RoutingError};
pub use types::{ConversionStep, Plan};

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::catalog::{self, BridgeTable, Category, Format};

/// Computes plans over a bridge table.
#[derive(Debug, Clone, Default)]
pub struct Pathfinder {
    bridges: BridgeTable,
}

impl Pathfinder {
    /// Creates a pathfinder over the standard bridge table.
    pub fn new() -> Self {
        Self::with_bridges(BridgeTable::standard())
    }

    /// Creates a pathfinder over a custom bridge table.
    pub fn with_bridges(bridges: BridgeTable) -> Self {
        Self { bridges }
    }

    pub fn bridges(&self) -> &BridgeTable {
        &self.bridges
    }

    /// Finds the shortest plan converting `source` into `target`.
    pub fn find_path(
        &self,
        source: impl Into<Format>,
        target: impl Into<Format>,
    ) -> Result<Plan, RoutingError> {
        let source = source.into();
        let target = target.into();

        let source_category = catalog::category_of(source.as_str())
            .ok_or_else(|| RoutingError::unknown_source(source.clone()))?;
        let target_category = catalog::category_of(target.as_str())
            .ok_or_else(|| RoutingError::unknown_target(target.clone()))?;

        if source_category == target_category {
            let step = ConversionStep::new(
                source.clone(),
                target.clone(),
                catalog::engine_for(source_category),
            );
            return Ok(Plan::new(source, target, vec![step]));
        }

        let path = self
            .category_path(source_category, target_category)
            .ok_or_else(|| RoutingError::NoPathFound {
                from: source.clone(),
                to: target.clone(),
            })?;

        let mut steps = Vec::with_capacity(path.len());
        let mut current = source.clone();

        for hop in path.windows(2) {
            let (from, to) = (hop[0], hop[1]);
            let bridge = self
                .bridges
                .get(from, to)
                .ok_or_else(|| RoutingError::NoPathFound {
                    from: source.clone(),
                    to: target.clone(),
                })?;

            // Already holding the bridge artifact
            if *bridge == current {
                continue;
            }

            steps.push(ConversionStep::new(
                current.clone(),
                bridge.clone(),
                catalog::engine_for(from),
            ));
            current = bridge.clone();
        }

        if current != target {
            steps.push(ConversionStep::new(
                current,
                target.clone(),
                catalog::engine_for(target_category),
            ));
        }

        let plan = Plan::new(source, target, steps);
        debug!(plan = %plan, hops = path.len() - 1, "Planned conversion");
        Ok(plan)
    }

    /// Returns the shortest category path from `from` to `to`, both included.
    ///
    /// A category always reaches itself with zero hops.
    pub fn category_path(&self, from: Category, to: Category) -> Option<Vec<Category>> {
        if from == to {
            return Some(vec![from]);
        }

        let mut parents: HashMap<Category, Category> = HashMap::new();
        let mut seen = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);

        while let Some(node) = queue.pop_front() {
            for next in self.bridges.neighbors(node) {
                if !seen.insert(next) {
                    continue;
                }
                parents.insert(next, node);

                if next == to {
                    let mut path = vec![to];
                    let mut cursor = to;
                    while let Some(parent) = parents.get(&cursor) {
                        path.push(*parent);
                        cursor = *parent;
                    }
                    path.reverse();
                    return Some(path);
                }

                queue.push_back(next);
            }
        }

        None
    }

    /// Returns every category reachable from `from` through zero or more bridges.
    pub fn reachable_categories(&self, from: Category) -> BTreeSet<Category> {
        let mut seen = BTreeSet::from([from]);
        let mut queue = VecDeque::from([from]);

        while let Some(node) = queue.pop_front() {
            for next in self.bridges.neighbors(node) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        seen
    }

    /// Returns all formats a file of `source` format can be converted into.
    ///
    /// Always includes the formats of the source's own category. Empty when
    /// the source format is unknown.
    pub fn supported_targets(&self, source: impl Into<Format>) -> BTreeSet<Format> {
        let source = source.into();
        let Some(category) = catalog::category_of(source.as_str()) else {
            return BTreeSet::new();
        };

        self.reachable_categories(category)
            .into_iter()
            .flat_map(|c| catalog::formats_in(c).iter().copied().map(Format::new))
            .collect()
    }
}

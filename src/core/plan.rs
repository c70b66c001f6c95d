//! Read plans.
//!
//! A read plan describes what to search: which antennas, under which air
//! protocol, optionally narrowed by a filter, optionally with an embedded
//! memory read. Plans nest: a multi plan divides its time budget among its
//! children in proportion to their weights.

use serde::{Deserialize, Serialize};

use crate::core::filter::TagFilter;
use crate::core::op::TagOp;
use crate::core::tag::TagProtocol;

/// Default plan weight.
pub const DEFAULT_WEIGHT: u32 = 1000;

/// A single-protocol search over a set of antennas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleReadPlan {
    /// Antenna ids to search. Empty means the reader's automatic
    /// antenna selection.
    pub antennas: Vec<u16>,

    /// Air protocol to search under.
    pub protocol: TagProtocol,

    /// Optional singulation filter.
    pub filter: Option<TagFilter>,

    /// Optional embedded tag operation (memory reads only).
    pub op: Option<TagOp>,

    /// Weight for time division among siblings of a multi plan.
    pub weight: u32,

    /// Request the reader's fast-search mode. Accepted for API
    /// completeness; the RQL grammar has no clause for it.
    pub fast_search: bool,
}

impl SimpleReadPlan {
    /// Plan searching the given antennas under a protocol.
    pub fn new(antennas: Vec<u16>, protocol: TagProtocol) -> Self {
        Self {
            antennas,
            protocol,
            filter: None,
            op: None,
            weight: DEFAULT_WEIGHT,
            fast_search: false,
        }
    }

    /// Set the singulation filter.
    #[must_use]
    pub fn with_filter(mut self, filter: TagFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Embed a tag operation.
    #[must_use]
    pub fn with_op(mut self, op: TagOp) -> Self {
        self.op = Some(op);
        self
    }

    /// Set the weight.
    #[must_use]
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

impl Default for SimpleReadPlan {
    fn default() -> Self {
        Self::new(Vec::new(), TagProtocol::Gen2)
    }
}

/// An ordered sequence of child plans sharing one time budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiReadPlan {
    /// Child plans, searched in order.
    pub plans: Vec<ReadPlan>,
}

impl MultiReadPlan {
    pub fn new(plans: Vec<ReadPlan>) -> Self {
        Self { plans }
    }
}

/// A simple plan that stops the search once N tags have been read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopTriggerPlan {
    /// The wrapped search.
    pub plan: SimpleReadPlan,

    /// Stop after this many tag reads.
    pub stop_count: u32,
}

/// A caller-specified description of what to read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReadPlan {
    Simple(SimpleReadPlan),
    Multi(MultiReadPlan),
    StopTrigger(StopTriggerPlan),
}

impl ReadPlan {
    /// The plan's weight for time division.
    ///
    /// A multi plan's weight is the sum of its children's weights.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Simple(p) => p.weight,
            Self::StopTrigger(p) => p.plan.weight,
            Self::Multi(m) => m.plans.iter().map(ReadPlan::weight).sum(),
        }
    }
}

impl Default for ReadPlan {
    fn default() -> Self {
        Self::Simple(SimpleReadPlan::default())
    }
}

impl From<SimpleReadPlan> for ReadPlan {
    fn from(p: SimpleReadPlan) -> Self {
        Self::Simple(p)
    }
}

impl From<MultiReadPlan> for ReadPlan {
    fn from(p: MultiReadPlan) -> Self {
        Self::Multi(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weight() {
        let plan = SimpleReadPlan::new(vec![1], TagProtocol::Gen2);
        assert_eq!(plan.weight, DEFAULT_WEIGHT);
    }

    #[test]
    fn test_multi_weight_is_sum_of_children() {
        let multi = ReadPlan::Multi(MultiReadPlan::new(vec![
            SimpleReadPlan::new(vec![1], TagProtocol::Gen2)
                .with_weight(300)
                .into(),
            SimpleReadPlan::new(vec![2], TagProtocol::Iso180006b)
                .with_weight(700)
                .into(),
        ]));
        assert_eq!(multi.weight(), 1000);
    }

    #[test]
    fn test_nested_multi_weight() {
        let inner = ReadPlan::Multi(MultiReadPlan::new(vec![
            SimpleReadPlan::new(vec![1], TagProtocol::Gen2).with_weight(100).into(),
            SimpleReadPlan::new(vec![2], TagProtocol::Gen2).with_weight(200).into(),
        ]));
        let outer = ReadPlan::Multi(MultiReadPlan::new(vec![
            inner,
            SimpleReadPlan::new(vec![3], TagProtocol::Gen2).with_weight(300).into(),
        ]));
        assert_eq!(outer.weight(), 600);
    }
}

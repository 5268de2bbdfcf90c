use std::{fmt::{Debug, Display}, str::FromStr};

use bitvec::prelude::*;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{parser::{self, NameParseError}, statement::Operator};

/// One executable operation kind a connector may declare.
///
/// The discriminant doubles as the bit position inside a [`CapabilitySet`], so new
/// capabilities must be appended and `ALL` kept in discriminant order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Capability {
    Scan = 0,
    Project = 1,
    SelectWindow = 2,
    SelectInnerJoin = 3,
    SelectInnerJoinPartialResults = 4,
    FilterPkEq = 5,
    FilterPkGt = 6,
    FilterPkLt = 7,
    FilterPkGe = 8,
    FilterPkLe = 9,
    FilterPkDistinct = 10,
    FilterIndexedEq = 11,
    FilterIndexedGt = 12,
    FilterIndexedLt = 13,
    FilterIndexedGe = 14,
    FilterIndexedLe = 15,
    FilterIndexedDistinct = 16,
    FilterIndexedMatch = 17,
    FilterNonIndexedEq = 18,
    FilterNonIndexedGt = 19,
    FilterNonIndexedLt = 20,
    FilterNonIndexedGe = 21,
    FilterNonIndexedLe = 22,
    FilterNonIndexedDistinct = 23,
    Insert = 24,
    InsertIfNotExists = 25,
}

/// How the filtered column is stored, which decides the filter capability a step needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnClass {
    PartitionKey,
    Indexed,
    NonIndexed,
}

impl Capability {
    pub const COUNT: usize = 26;

    pub const ALL: [Capability; Capability::COUNT] = [
        Capability::Scan,
        Capability::Project,
        Capability::SelectWindow,
        Capability::SelectInnerJoin,
        Capability::SelectInnerJoinPartialResults,
        Capability::FilterPkEq,
        Capability::FilterPkGt,
        Capability::FilterPkLt,
        Capability::FilterPkGe,
        Capability::FilterPkLe,
        Capability::FilterPkDistinct,
        Capability::FilterIndexedEq,
        Capability::FilterIndexedGt,
        Capability::FilterIndexedLt,
        Capability::FilterIndexedGe,
        Capability::FilterIndexedLe,
        Capability::FilterIndexedDistinct,
        Capability::FilterIndexedMatch,
        Capability::FilterNonIndexedEq,
        Capability::FilterNonIndexedGt,
        Capability::FilterNonIndexedLt,
        Capability::FilterNonIndexedGe,
        Capability::FilterNonIndexedLe,
        Capability::FilterNonIndexedDistinct,
        Capability::Insert,
        Capability::InsertIfNotExists,
    ];

    /// Join variants in increasing order of what they demand from the connector.
    pub const JOIN_VARIANTS: [Capability; 2] = [
        Capability::SelectInnerJoin,
        Capability::SelectInnerJoinPartialResults,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Capability::Scan => "SCAN",
            Capability::Project => "PROJECT",
            Capability::SelectWindow => "SELECT_WINDOW",
            Capability::SelectInnerJoin => "SELECT_INNER_JOIN",
            Capability::SelectInnerJoinPartialResults => "SELECT_INNER_JOIN_PARTIALS_RESULTS",
            Capability::FilterPkEq => "FILTER_PK_EQ",
            Capability::FilterPkGt => "FILTER_PK_GT",
            Capability::FilterPkLt => "FILTER_PK_LT",
            Capability::FilterPkGe => "FILTER_PK_GET",
            Capability::FilterPkLe => "FILTER_PK_LET",
            Capability::FilterPkDistinct => "FILTER_PK_DISTINCT",
            Capability::FilterIndexedEq => "FILTER_INDEXED_EQ",
            Capability::FilterIndexedGt => "FILTER_INDEXED_GT",
            Capability::FilterIndexedLt => "FILTER_INDEXED_LT",
            Capability::FilterIndexedGe => "FILTER_INDEXED_GET",
            Capability::FilterIndexedLe => "FILTER_INDEXED_LET",
            Capability::FilterIndexedDistinct => "FILTER_INDEXED_DISTINCT",
            Capability::FilterIndexedMatch => "FILTER_INDEXED_MATCH",
            Capability::FilterNonIndexedEq => "FILTER_NON_INDEXED_EQ",
            Capability::FilterNonIndexedGt => "FILTER_NON_INDEXED_GT",
            Capability::FilterNonIndexedLt => "FILTER_NON_INDEXED_LT",
            Capability::FilterNonIndexedGe => "FILTER_NON_INDEXED_GET",
            Capability::FilterNonIndexedLe => "FILTER_NON_INDEXED_LET",
            Capability::FilterNonIndexedDistinct => "FILTER_NON_INDEXED_DISTINCT",
            Capability::Insert => "INSERT",
            Capability::InsertIfNotExists => "INSERT_IF_NOT_EXISTS",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Capability> {
        Capability::ALL.iter().copied().find(|c| c.tag() == tag)
    }

    /// Filter capability for a predicate on a column of the given class.
    /// `Match` only exists for indexed columns.
    pub fn filter(class: ColumnClass, operator: Operator) -> Option<Capability> {
        use Capability::*;
        let capability = match (class, operator) {
            (ColumnClass::PartitionKey, Operator::Eq) => FilterPkEq,
            (ColumnClass::PartitionKey, Operator::Gt) => FilterPkGt,
            (ColumnClass::PartitionKey, Operator::Lt) => FilterPkLt,
            (ColumnClass::PartitionKey, Operator::Ge) => FilterPkGe,
            (ColumnClass::PartitionKey, Operator::Le) => FilterPkLe,
            (ColumnClass::PartitionKey, Operator::Distinct) => FilterPkDistinct,
            (ColumnClass::Indexed, Operator::Eq) => FilterIndexedEq,
            (ColumnClass::Indexed, Operator::Gt) => FilterIndexedGt,
            (ColumnClass::Indexed, Operator::Lt) => FilterIndexedLt,
            (ColumnClass::Indexed, Operator::Ge) => FilterIndexedGe,
            (ColumnClass::Indexed, Operator::Le) => FilterIndexedLe,
            (ColumnClass::Indexed, Operator::Distinct) => FilterIndexedDistinct,
            (ColumnClass::Indexed, Operator::Match) => FilterIndexedMatch,
            (ColumnClass::NonIndexed, Operator::Eq) => FilterNonIndexedEq,
            (ColumnClass::NonIndexed, Operator::Gt) => FilterNonIndexedGt,
            (ColumnClass::NonIndexed, Operator::Lt) => FilterNonIndexedLt,
            (ColumnClass::NonIndexed, Operator::Ge) => FilterNonIndexedGe,
            (ColumnClass::NonIndexed, Operator::Le) => FilterNonIndexedLe,
            (ColumnClass::NonIndexed, Operator::Distinct) => FilterNonIndexedDistinct,
            (ColumnClass::PartitionKey | ColumnClass::NonIndexed, Operator::Match) => return None,
        };
        Some(capability)
    }

    pub fn is_filter(self) -> bool {
        (Capability::FilterPkEq as u8..=Capability::FilterNonIndexedDistinct as u8).contains(&(self as u8))
    }

    pub fn is_join(self) -> bool {
        Capability::JOIN_VARIANTS.contains(&self)
    }

    fn bit(self) -> usize {
        self as usize
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for Capability {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse_capability(s)
    }
}

type CapabilityBits = BitArray<[u32; 1], Lsb0>;

/// Set of capabilities declared by one connector.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<Capability>", from = "Vec<Capability>")]
pub struct CapabilitySet {
    bits: CapabilityBits,
}

impl CapabilitySet {
    pub fn empty() -> Self {
        CapabilitySet { bits: CapabilityBits::ZERO }
    }

    pub fn insert(&mut self, capability: Capability) {
        self.bits.set(capability.bit(), true);
    }

    pub fn remove(&mut self, capability: Capability) {
        self.bits.set(capability.bit(), false);
    }

    pub fn declares(&self, capability: Capability) -> bool {
        self.bits[capability.bit()]
    }

    pub fn declares_any(&self, capabilities: &[Capability]) -> bool {
        self.first_declared(capabilities).is_some()
    }

    /// First capability of `alternatives` this set declares, honouring the caller's order.
    pub fn first_declared(&self, alternatives: &[Capability]) -> Option<Capability> {
        alternatives.iter().copied().find(|c| self.declares(*c))
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.bits.iter_ones().map(|bit| Capability::ALL[bit])
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        CapabilitySet::empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        let mut set = CapabilitySet::empty();
        for capability in iter {
            set.insert(capability);
        }
        set
    }
}

impl<const N: usize> From<[Capability; N]> for CapabilitySet {
    fn from(value: [Capability; N]) -> Self {
        value.into_iter().collect()
    }
}

impl From<Vec<Capability>> for CapabilitySet {
    fn from(value: Vec<Capability>) -> Self {
        value.into_iter().collect()
    }
}

impl From<CapabilitySet> for Vec<Capability> {
    fn from(value: CapabilitySet) -> Self {
        value.iter().collect()
    }
}

impl FromStr for CapabilitySet {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse_capability_set(s)
    }
}

impl Debug for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Display for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.iter().join(", "))
    }
}

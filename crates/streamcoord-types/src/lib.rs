//! # streamcoord-types: core types for the Stream Coordinator
//!
//! This crate contains the opaque identifiers and small value types shared
//! across the coordinator:
//! - Identity ([`StreamId`], [`Node`], [`Pid`])
//! - Ordering ([`Epoch`], [`Index`], [`Offset`])
//! - Replica progress ([`Tail`])
//! - Quorum arithmetic ([`quorum_size`])
//!
//! None of these types carry behavior beyond equality, ordering, and
//! display — the state machine in `streamcoord-kernel` is the only crate
//! that interprets them.

use std::fmt::{Debug, Display};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ============================================================================
// StreamId - opaque byte string, globally unique per stream
// ============================================================================

/// Globally unique identifier for a stream.
///
/// Opaque by design: the coordinator never interprets the bytes, only
/// compares and orders them. Backed by `Arc<[u8]>` so cloning a `StreamId`
/// (which happens on every listener/member lookup) is cheap.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(Arc<[u8]>);

impl StreamId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(bytes.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "StreamId({s:?})"),
            Err(_) => write!(f, "StreamId({:02x?})", &self.0),
        }
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "{s}"),
            Err(_) => write!(f, "{:02x?}", &self.0),
        }
    }
}

impl From<&str> for StreamId {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes().to_vec())
    }
}

impl From<String> for StreamId {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes())
    }
}

// ============================================================================
// Node - opaque cluster node identity
// ============================================================================

/// Identity of a cluster node. Opaque — the coordinator never parses this,
/// only compares and uses it as a map key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Node(Arc<str>);

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::from(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// Pid - identity of a log process on a node
// ============================================================================

/// Identity of a log process ("writer" or "replica" server) running on a
/// node. Carries its node so `node_of(pid)` never requires a lookup.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pid {
    node: Node,
    /// Locally-unique token distinguishing successive processes on the same
    /// node (a restart gets a new token even though the node is unchanged).
    token: u64,
}

impl Pid {
    pub fn new(node: Node, token: u64) -> Self {
        Self { node, token }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn token(&self) -> u64 {
        self.token
    }
}

impl Debug for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pid({}#{})", self.node, self.token)
    }
}

impl Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.node, self.token)
    }
}

// ============================================================================
// Epoch - monotonic non-negative integer per stream
// ============================================================================

/// A logical term in which exactly one writer exists for a stream.
/// Strictly increases on every election (spec §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Epoch(u64);

impl Epoch {
    /// The epoch a stream is created in.
    pub const INITIAL: Epoch = Epoch(1);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next epoch (strictly greater, per the election invariant).
    pub fn next(self) -> Self {
        Epoch(self.0 + 1)
    }
}

impl Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl From<u64> for Epoch {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Epoch> for u64 {
    fn from(epoch: Epoch) -> Self {
        epoch.0
    }
}

// ============================================================================
// Index - monotonic command index supplied by the runtime
// ============================================================================

/// Correlation tag for an in-flight aux action: the index of the command
/// that scheduled it (spec §3.1, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Index(u64);

impl Index {
    pub const ZERO: Index = Index(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether this index falls on a release-cursor boundary (spec §4.1:
    /// `index mod 4096 == 0`).
    pub fn is_release_cursor_boundary(self, interval: u64) -> bool {
        interval != 0 && self.0 % interval == 0
    }
}

impl Display for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Index {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Index> for u64 {
    fn from(index: Index) -> Self {
        index.0
    }
}

// ============================================================================
// Offset - position within a stopped member's log
// ============================================================================

/// Position within a member's local log, as reported on a graceful stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Offset(u64);

impl Offset {
    pub const ZERO: Offset = Offset(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Offset {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ============================================================================
// Tail - highest log position of a stopped member
// ============================================================================

/// The highest log position of a stopped member: either `empty` (never ran)
/// or `(epoch, offset)` (spec §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tail {
    Empty,
    At(Epoch, Offset),
}

impl Tail {
    pub fn epoch(&self) -> Option<Epoch> {
        match self {
            Tail::Empty => None,
            Tail::At(epoch, _) => Some(*epoch),
        }
    }

    pub fn offset(&self) -> Option<Offset> {
        match self {
            Tail::Empty => None,
            Tail::At(_, offset) => Some(*offset),
        }
    }
}

impl Default for Tail {
    fn default() -> Self {
        Tail::Empty
    }
}

impl Display for Tail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tail::Empty => write!(f, "empty"),
            Tail::At(epoch, offset) => write!(f, "({epoch}, {offset})"),
        }
    }
}

// ============================================================================
// Quorum arithmetic
// ============================================================================

/// Returns the quorum size for a membership of `node_count` nodes: a strict
/// majority, with `n=1` defined as `1` (GLOSSARY: Quorum).
pub fn quorum_size(node_count: usize) -> usize {
    if node_count == 0 {
        0
    } else {
        node_count / 2 + 1
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Quorum is always a strict majority: more than half, and never
        /// more than the full node count (GLOSSARY: Quorum).
        #[test]
        fn quorum_is_strict_majority_and_bounded(node_count in 0usize..=500) {
            let quorum = quorum_size(node_count);
            prop_assert!(quorum <= node_count);
            if node_count > 0 {
                prop_assert!(quorum * 2 > node_count);
            } else {
                prop_assert_eq!(quorum, 0);
            }
        }

        /// `Epoch::next` is strictly increasing for any starting value, the
        /// property the election invariant (spec invariant 4) relies on.
        #[test]
        fn epoch_next_is_always_strictly_greater(value in 0u64..u64::MAX) {
            let epoch = Epoch::new(value);
            prop_assert!(epoch.next() > epoch);
        }

        /// Any `Index` round-trips through its release-cursor boundary check
        /// consistently with plain modular arithmetic.
        #[test]
        fn release_cursor_boundary_matches_modulo(value in 0u64..1_000_000, interval in 1u64..10_000) {
            let index = Index::new(value);
            prop_assert_eq!(index.is_release_cursor_boundary(interval), value % interval == 0);
        }

        /// Any `Node` name round-trips through JSON unchanged.
        #[test]
        fn node_round_trips_through_json(name in "[a-zA-Z0-9_-]{1,32}") {
            let node = Node::from(name.clone());
            let json = serde_json::to_string(&node).unwrap();
            let back: Node = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(node, back);
            prop_assert_eq!(back.as_str(), name.as_str());
        }
    }
}

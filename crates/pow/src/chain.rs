//! Read-only access to block history.
//!
//! The retargeting code only ever walks backwards from a tip, one predecessor
//! at a time. [`ChainEntry`] captures exactly that capability so any block
//! index can be plugged in. [`HeaderChain`] is an append-only in-memory
//! implementation used by the command line tool and by tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    params::Params,
    pow::CompactTarget,
    retarget::{self, RetargetError},
};

/// A block in the chain as seen by the retargeting code.
///
/// Implementations are cheap handles (usually a reference) into a block index
/// that must not change while a traversal is in progress.
pub trait ChainEntry: Clone {
    /// Height of the block, genesis being 0.
    fn height(&self) -> u32;

    /// Block timestamp in seconds since the Unix epoch.
    fn time(&self) -> i64;

    /// The compact target the block was mined against.
    fn bits(&self) -> CompactTarget;

    /// The previous block, or `None` at the start of the known history.
    fn prev(&self) -> Option<Self>;
}

/// Errors raised when building a [`HeaderChain`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    /// A node was supplied out of order.
    #[error("Non-contiguous header at height {found}, expected {expected}")]
    NonContiguous { expected: u32, found: u32 },

    /// Appending would move the height past `u32::MAX`.
    #[error("Chain height overflow")]
    HeightOverflow,
}

/// Summary of a block header as stored in a [`HeaderChain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNode {
    pub height: u32,
    pub time: u32,
    pub bits: CompactTarget,
}

/// Append-only list of headers starting at an arbitrary height.
///
/// Histories loaded from a checkpoint do not reach back to genesis; a walk
/// past the first stored node behaves as if it had reached genesis.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ChainNode>", into = "Vec<ChainNode>")]
pub struct HeaderChain {
    nodes: Vec<ChainNode>,
}

impl HeaderChain {
    /// Creates an empty chain whose first pushed header is genesis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a chain from nodes ordered by strictly consecutive heights.
    pub fn from_nodes(nodes: Vec<ChainNode>) -> Result<Self, ChainError> {
        let mut chain = HeaderChain { nodes: Vec::with_capacity(nodes.len()) };
        for node in nodes {
            chain.push_node(node)?;
        }
        Ok(chain)
    }

    /// Appends a header after the tip (or as genesis if the chain is empty)
    /// and returns its height.
    pub fn push(&mut self, time: u32, bits: CompactTarget) -> Result<u32, ChainError> {
        let height = match self.nodes.last() {
            Some(tip) => tip.height.checked_add(1).ok_or(ChainError::HeightOverflow)?,
            None => 0,
        };
        self.nodes.push(ChainNode { height, time, bits });
        Ok(height)
    }

    /// Appends a fully specified node. The first node of an empty chain may
    /// have any height; every later node must follow the tip directly.
    pub fn push_node(&mut self, node: ChainNode) -> Result<(), ChainError> {
        if let Some(tip) = self.nodes.last() {
            let expected = tip.height.checked_add(1).ok_or(ChainError::HeightOverflow)?;
            if node.height != expected {
                return Err(ChainError::NonContiguous { expected, found: node.height });
            }
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Number of stored headers.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no header has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Height of the first stored node.
    pub fn start_height(&self) -> Option<u32> {
        self.nodes.first().map(|node| node.height)
    }

    /// The last header of the chain.
    pub fn tip(&self) -> Option<ChainCursor<'_>> {
        ChainCursor::from_history(&self.nodes)
    }

    /// The header at `height`, if it is stored.
    pub fn at_height(&self, height: u32) -> Option<ChainCursor<'_>> {
        let offset = height.checked_sub(self.start_height()?)?;
        let end = usize::try_from(offset).ok()?.checked_add(1)?;
        ChainCursor::from_history(self.nodes.get(..end)?)
    }

    /// Compact target required for the block following the tip.
    ///
    /// See [`retarget::next_work_required`]; an empty chain yields the
    /// network's maximum attainable target.
    pub fn next_work_required(
        &self,
        candidate_time: i64,
        params: &Params,
    ) -> Result<CompactTarget, RetargetError> {
        retarget::next_work_required(self.tip(), candidate_time, params)
    }
}

impl TryFrom<Vec<ChainNode>> for HeaderChain {
    type Error = ChainError;

    fn try_from(nodes: Vec<ChainNode>) -> Result<Self, Self::Error> {
        HeaderChain::from_nodes(nodes)
    }
}

impl From<HeaderChain> for Vec<ChainNode> {
    fn from(chain: HeaderChain) -> Self {
        chain.nodes
    }
}

/// A position in a [`HeaderChain`].
#[derive(Clone, Copy, Debug)]
pub struct ChainCursor<'a> {
    node: &'a ChainNode,
    ancestors: &'a [ChainNode],
}

impl<'a> ChainCursor<'a> {
    fn from_history(history: &'a [ChainNode]) -> Option<Self> {
        let (node, ancestors) = history.split_last()?;
        Some(ChainCursor { node, ancestors })
    }

    /// The stored header this cursor points at.
    pub fn node(&self) -> &'a ChainNode {
        self.node
    }
}

impl ChainEntry for ChainCursor<'_> {
    fn height(&self) -> u32 {
        self.node.height
    }

    fn time(&self) -> i64 {
        i64::from(self.node.time)
    }

    fn bits(&self) -> CompactTarget {
        self.node.bits
    }

    fn prev(&self) -> Option<Self> {
        ChainCursor::from_history(self.ancestors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BITS: CompactTarget = CompactTarget::new(0x1d00_ffff);

    #[test]
    fn test_push_assigns_heights() {
        let mut chain = HeaderChain::new();
        assert!(chain.tip().is_none());
        assert_eq!(chain.push(100, BITS), Ok(0));
        assert_eq!(chain.push(250, BITS), Ok(1));

        let tip = chain.tip().unwrap();
        assert_eq!(tip.height(), 1);
        assert_eq!(tip.time(), 250);

        let genesis = tip.prev().unwrap();
        assert_eq!(genesis.height(), 0);
        assert!(genesis.prev().is_none());
    }

    #[test]
    fn test_checkpointed_history() {
        let chain = HeaderChain::from_nodes(vec![
            ChainNode { height: 500, time: 10, bits: BITS },
            ChainNode { height: 501, time: 20, bits: BITS },
            ChainNode { height: 502, time: 30, bits: BITS },
        ])
        .unwrap();

        assert_eq!(chain.start_height(), Some(500));
        assert_eq!(chain.at_height(501).unwrap().time(), 20);
        assert_eq!(chain.at_height(501).unwrap().prev().unwrap().height(), 500);
        assert!(chain.at_height(499).is_none());
        assert!(chain.at_height(503).is_none());
        assert!(chain.at_height(500).unwrap().prev().is_none());
    }

    #[test]
    fn test_rejects_gaps() {
        let result = HeaderChain::from_nodes(vec![
            ChainNode { height: 7, time: 10, bits: BITS },
            ChainNode { height: 9, time: 20, bits: BITS },
        ]);
        assert_eq!(result, Err(ChainError::NonContiguous { expected: 8, found: 9 }));
    }

    #[test]
    fn test_json_round_trip() {
        let mut chain = HeaderChain::new();
        chain.push(1_700_000_000, BITS).unwrap();
        chain.push(1_700_000_150, CompactTarget::new(0x1c7f_ff80)).unwrap();

        let json = serde_json::to_string(&chain).unwrap();
        assert!(json.starts_with('['));
        let decoded: HeaderChain = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, chain);

        let gapped = r#"[{"height":1,"time":0,"bits":1},{"height":3,"time":0,"bits":1}]"#;
        assert!(serde_json::from_str::<HeaderChain>(gapped).is_err());
    }
}

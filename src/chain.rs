//! Chain ancestry: the block-index view consumed by the retargeting engine
//!
//! [`ChainAncestry`] is the contract: height, packed bits, timestamp,
//! median-time-past, previous link, and an ancestor-at-height lookup that
//! must be logarithmic or better. [`ChainIndex`] is the concrete
//! implementation: an arena of index entries keyed by integer ids, with a
//! skip-pointer table so ancestor lookups never degrade to linear chain
//! scans on long chains.

use crate::types::{CompactBits, Height};
use crate::{Error, Result};

/// Window size for median-time-past
const MEDIAN_TIME_SPAN: usize = 11;

/// Read-only view over a chain snapshot.
///
/// The view must stay immutable for the duration of an engine call: a
/// consistent snapshot, not a live chain under concurrent extension.
pub trait ChainAncestry {
    /// Handle to one index node
    type Node: Copy;

    /// Height of the node (0 = genesis)
    fn height(&self, node: Self::Node) -> Height;

    /// Packed difficulty bits at this node
    fn bits(&self, node: Self::Node) -> CompactBits;

    /// Block timestamp (seconds since Unix epoch)
    fn time(&self, node: Self::Node) -> i64;

    /// Median timestamp over the recent ancestor window, used instead of
    /// raw timestamps to resist single-miner time manipulation
    fn median_time_past(&self, node: Self::Node) -> i64;

    /// Previous node; `None` only at genesis
    fn prev(&self, node: Self::Node) -> Option<Self::Node>;

    /// Ancestor of `node` at the given height, or `None` if `height`
    /// exceeds the node's own height. O(log height) or better.
    fn ancestor(&self, node: Self::Node, height: Height) -> Option<Self::Node>;
}

/// Opaque handle into a [`ChainIndex`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct IndexEntry {
    height: Height,
    bits: CompactBits,
    time: i64,
    median_time_past: i64,
    prev: Option<NodeId>,
    skip: Option<NodeId>,
}

/// Arena-backed chain index with skip pointers.
///
/// Entries are append-only; any entry may be extended, so forks are
/// representable. Median-time-past and the skip pointer are computed once at
/// append time, keeping every accessor O(1) and `ancestor` O(log height).
#[derive(Debug, Clone, Default)]
pub struct ChainIndex {
    entries: Vec<IndexEntry>,
}

/// Turn the lowest set bit of `n` off
fn invert_lowest_one(n: u64) -> u64 {
    n & n.wrapping_sub(1)
}

/// Height to jump to from a node at `height` when following a skip pointer.
/// Exponentially spaced jumps with overlap for nearby heights.
fn skip_height(height: Height) -> Height {
    if height < 2 {
        return 0;
    }
    if height & 1 == 1 {
        invert_lowest_one(invert_lowest_one(height - 1)) + 1
    } else {
        invert_lowest_one(height)
    }
}

impl ChainIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in the arena
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the arena is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handle to the most recently appended entry
    pub fn tip(&self) -> Option<NodeId> {
        if self.entries.is_empty() {
            None
        } else {
            Some(NodeId(self.entries.len() - 1))
        }
    }

    /// Append a node. `prev == None` starts a chain at height 0; anything
    /// else extends the referenced entry. A dangling previous id is an
    /// error.
    pub fn push(&mut self, prev: Option<NodeId>, bits: CompactBits, time: i64) -> Result<NodeId> {
        let (height, skip) = match prev {
            None => (0, None),
            Some(p) => {
                let parent = self
                    .entries
                    .get(p.0)
                    .ok_or_else(|| Error::chain(format!("dangling previous id {}", p.0)))?;
                let height = parent.height + 1;
                (height, self.ancestor(p, skip_height(height)))
            }
        };

        // Median of this block's time and up to ten ancestors'
        let mut window = Vec::with_capacity(MEDIAN_TIME_SPAN);
        window.push(time);
        let mut walk = prev;
        while let Some(node) = walk {
            if window.len() == MEDIAN_TIME_SPAN {
                break;
            }
            let entry = &self.entries[node.0];
            window.push(entry.time);
            walk = entry.prev;
        }
        window.sort_unstable();
        let median_time_past = window[window.len() / 2];

        let id = NodeId(self.entries.len());
        self.entries.push(IndexEntry {
            height,
            bits,
            time,
            median_time_past,
            prev,
            skip,
        });
        Ok(id)
    }

    fn entry(&self, node: NodeId) -> &IndexEntry {
        &self.entries[node.0]
    }
}

impl ChainAncestry for ChainIndex {
    type Node = NodeId;

    fn height(&self, node: NodeId) -> Height {
        self.entry(node).height
    }

    fn bits(&self, node: NodeId) -> CompactBits {
        self.entry(node).bits
    }

    fn time(&self, node: NodeId) -> i64 {
        self.entry(node).time
    }

    fn median_time_past(&self, node: NodeId) -> i64 {
        self.entry(node).median_time_past
    }

    fn prev(&self, node: NodeId) -> Option<NodeId> {
        self.entry(node).prev
    }

    fn ancestor(&self, node: NodeId, height: Height) -> Option<NodeId> {
        let mut walk = node;
        let mut walk_height = self.entry(walk).height;
        if height > walk_height {
            return None;
        }

        while walk_height > height {
            let entry = self.entry(walk);
            let height_skip = skip_height(walk_height);
            let height_skip_prev = skip_height(walk_height - 1);
            // Follow the skip pointer when it lands on or usefully close to
            // the requested height; otherwise step one back.
            match entry.skip {
                Some(skip)
                    if height_skip == height
                        || (height_skip > height
                            && !(height_skip_prev < height_skip.saturating_sub(2)
                                && height_skip_prev >= height)) =>
                {
                    walk = skip;
                    walk_height = height_skip;
                }
                _ => {
                    walk = entry.prev?;
                    walk_height -= 1;
                }
            }
        }
        Some(walk)
    }
}

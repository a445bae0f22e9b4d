//! Tree node model and its wire form.
//!
//! On the wire a node is `{l, e: [{p, k, v, t}]}`: an optional leftmost
//! subtree, then entries whose keys are prefix-compressed against the
//! preceding entry's key. Each entry carries its value and the subtree that
//! sits between it and the next entry.

use serde::{Deserialize, Serialize};

use quire_store::codec;
use quire_types::ObjectId;

use crate::error::{MstError, MstResult};

/// A decoded tree node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Node {
    /// Subtree holding keys smaller than the first entry.
    pub left: Option<ObjectId>,
    /// Entries in strictly increasing key order.
    pub entries: Vec<Leaf>,
}

/// One key/value entry plus the subtree to its right.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Leaf {
    pub key: String,
    pub value: ObjectId,
    pub right: Option<ObjectId>,
}

#[derive(Serialize, Deserialize)]
struct NodeData {
    l: Option<ObjectId>,
    e: Vec<EntryData>,
}

#[derive(Serialize, Deserialize)]
struct EntryData {
    p: usize,
    #[serde(with = "serde_bytes")]
    k: Vec<u8>,
    v: ObjectId,
    t: Option<ObjectId>,
}

impl Node {
    /// The node of an empty tree.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True for a node with neither entries nor subtrees.
    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.entries.is_empty()
    }

    /// Index of the first entry whose key is not less than `key`.
    pub fn position(&self, key: &str) -> usize {
        self.entries.partition_point(|leaf| leaf.key.as_str() < key)
    }

    /// Whether the entry at `idx` holds exactly `key`.
    pub fn holds(&self, idx: usize, key: &str) -> bool {
        self.entries.get(idx).is_some_and(|leaf| leaf.key == key)
    }

    /// The subtree covering keys just before entry `idx`.
    pub fn child_before(&self, idx: usize) -> Option<ObjectId> {
        match idx {
            0 => self.left,
            i => self.entries[i - 1].right,
        }
    }

    /// Replace the subtree covering keys just before entry `idx`.
    pub fn set_child_before(&mut self, idx: usize, child: Option<ObjectId>) {
        match idx {
            0 => self.left = child,
            i => self.entries[i - 1].right = child,
        }
    }

    /// The rightmost subtree.
    pub fn last_child(&self) -> Option<ObjectId> {
        self.child_before(self.entries.len())
    }

    /// All subtree pointers, left to right.
    pub fn children(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.left
            .into_iter()
            .chain(self.entries.iter().filter_map(|leaf| leaf.right))
    }

    /// Encode to DAG-CBOR.
    pub fn encode(&self) -> MstResult<Vec<u8>> {
        let mut prev: &str = "";
        let mut entries = Vec::with_capacity(self.entries.len());
        for leaf in &self.entries {
            let shared = common_prefix_len(prev, &leaf.key);
            entries.push(EntryData {
                p: shared,
                k: leaf.key.as_bytes()[shared..].to_vec(),
                v: leaf.value,
                t: leaf.right,
            });
            prev = &leaf.key;
        }
        Ok(codec::encode(&NodeData {
            l: self.left,
            e: entries,
        })?)
    }

    /// Decode from DAG-CBOR, checking prefix bounds and key ordering.
    pub fn decode(id: &ObjectId, bytes: &[u8]) -> MstResult<Self> {
        let corrupt = |reason: String| MstError::CorruptNode { id: *id, reason };
        let data: NodeData = codec::decode(bytes)?;

        let mut entries: Vec<Leaf> = Vec::with_capacity(data.e.len());
        for entry in data.e {
            let prev = entries.last().map(|leaf| leaf.key.as_bytes()).unwrap_or_default();
            if entry.p > prev.len() {
                return Err(corrupt(format!(
                    "prefix length {} exceeds previous key length {}",
                    entry.p,
                    prev.len()
                )));
            }
            let mut key_bytes = prev[..entry.p].to_vec();
            key_bytes.extend_from_slice(&entry.k);
            let key = String::from_utf8(key_bytes)
                .map_err(|_| corrupt("key is not valid UTF-8".into()))?;
            if let Some(last) = entries.last() {
                if last.key >= key {
                    return Err(corrupt(format!("keys out of order at {key:?}")));
                }
            }
            entries.push(Leaf {
                key,
                value: entry.v,
                right: entry.t,
            });
        }

        Ok(Self {
            left: data.l,
            entries,
        })
    }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

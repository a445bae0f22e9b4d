//! Node-level and record-level differences between two tree versions.
//!
//! Two trees with equal key/value sets share every node, so the nodes that
//! differ are exactly the ones on changed paths. Entries found only in
//! created nodes or only in deleted nodes give the record changes.

use std::collections::{BTreeMap, BTreeSet};

use quire_store::BlockStore;
use quire_types::ObjectId;

use crate::error::MstResult;
use crate::tree::Mst;

/// Nodes gained and lost between two roots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MstDiff {
    /// Reachable from the new root but not from the old one.
    pub created: BTreeSet<ObjectId>,
    /// Reachable from the old root but not from the new one.
    pub deleted: BTreeSet<ObjectId>,
}

impl MstDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty()
    }
}

/// Compare the node sets of two roots.
pub fn mst_diff(store: &dyn BlockStore, old: &ObjectId, new: &ObjectId) -> MstResult<MstDiff> {
    if old == new {
        return Ok(MstDiff::default());
    }
    let mst = Mst::new(store);
    let before = mst.node_ids(old)?;
    let after = mst.node_ids(new)?;
    Ok(MstDiff {
        created: after.difference(&before).copied().collect(),
        deleted: before.difference(&after).copied().collect(),
    })
}

/// A single key-level change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordDelta {
    Created {
        key: String,
        value: ObjectId,
    },
    Updated {
        key: String,
        prior: ObjectId,
        later: ObjectId,
    },
    Deleted {
        key: String,
        prior: ObjectId,
    },
}

impl RecordDelta {
    pub fn key(&self) -> &str {
        match self {
            Self::Created { key, .. } | Self::Updated { key, .. } | Self::Deleted { key, .. } => key,
        }
    }
}

/// Derive record changes from a node diff, ordered by key.
///
/// Nodes in `diff.created` are read from `store`, which must therefore hold
/// the new tree; nodes in `diff.deleted` must still be readable there too.
pub fn record_diff(store: &dyn BlockStore, diff: &MstDiff) -> MstResult<Vec<RecordDelta>> {
    let mst = Mst::new(store);
    let gather = |ids: &BTreeSet<ObjectId>| -> MstResult<BTreeMap<String, ObjectId>> {
        let mut out = BTreeMap::new();
        for id in ids {
            for leaf in mst.read(id)?.entries {
                out.insert(leaf.key, leaf.value);
            }
        }
        Ok(out)
    };
    let added = gather(&diff.created)?;
    let mut removed = gather(&diff.deleted)?;

    let mut deltas = Vec::new();
    for (key, value) in added {
        match removed.remove(&key) {
            // moved between nodes without changing
            Some(prior) if prior == value => {}
            Some(prior) => deltas.push(RecordDelta::Updated {
                key,
                prior,
                later: value,
            }),
            None => deltas.push(RecordDelta::Created { key, value }),
        }
    }
    deltas.extend(
        removed
            .into_iter()
            .map(|(key, prior)| RecordDelta::Deleted { key, prior }),
    );
    deltas.sort_by(|a, b| a.key().cmp(b.key()));
    Ok(deltas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use quire_store::MemoryBlockStore;

    fn value(tag: &str) -> ObjectId {
        ObjectId::from_bytes(tag.as_bytes())
    }

    fn seed(store: &MemoryBlockStore, n: usize) -> ObjectId {
        let mst = Mst::new(store);
        let mut root = mst.create_empty().unwrap();
        for i in 0..n {
            let key = format!("app.test/{i:04}");
            root = mst.put(&root, &key, value(&key)).unwrap();
        }
        root
    }

    #[test]
    fn identical_roots_have_empty_diff() {
        let store = MemoryBlockStore::new();
        let root = seed(&store, 10);
        let diff = mst_diff(&store, &root, &root).unwrap();
        assert!(diff.is_empty());
        assert!(record_diff(&store, &diff).unwrap().is_empty());
    }

    #[test]
    fn create_update_delete_are_reported() {
        let store = MemoryBlockStore::new();
        let mst = Mst::new(&store);
        let old = seed(&store, 50);
        let mut new = mst.put(&old, "app.test/new", value("fresh")).unwrap();
        new = mst.put(&new, "app.test/0010", value("changed")).unwrap();
        new = mst.delete(&new, "app.test/0020").unwrap();

        let diff = mst_diff(&store, &old, &new).unwrap();
        assert!(diff.created.contains(&new));
        assert!(diff.deleted.contains(&old));

        let deltas = record_diff(&store, &diff).unwrap();
        assert_eq!(
            deltas,
            vec![
                RecordDelta::Updated {
                    key: "app.test/0010".into(),
                    prior: value("app.test/0010"),
                    later: value("changed"),
                },
                RecordDelta::Deleted {
                    key: "app.test/0020".into(),
                    prior: value("app.test/0020"),
                },
                RecordDelta::Created {
                    key: "app.test/new".into(),
                    value: value("fresh"),
                },
            ]
        );
    }

    #[test]
    fn diff_from_empty_lists_every_node() {
        let store = MemoryBlockStore::new();
        let mst = Mst::new(&store);
        let empty = mst.create_empty().unwrap();
        let root = seed(&store, 40);
        let diff = mst_diff(&store, &empty, &root).unwrap();
        assert_eq!(diff.created, mst.node_ids(&root).unwrap());
        assert_eq!(diff.deleted, BTreeSet::from([empty]));
        let deltas = record_diff(&store, &diff).unwrap();
        assert_eq!(deltas.len(), 40);
        assert!(deltas.iter().all(|d| matches!(d, RecordDelta::Created { .. })));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn record_diff_matches_key_sets(
            before in proptest::collection::btree_map(0u32..400, 0u8..3, 0..40),
            after in proptest::collection::btree_map(0u32..400, 0u8..3, 0..40),
        ) {
            let store = MemoryBlockStore::new();
            let mst = Mst::new(&store);
            let build = |m: &BTreeMap<u32, u8>| {
                let mut root = mst.create_empty().unwrap();
                for (k, v) in m {
                    let key = format!("app.test/{k}");
                    root = mst.put(&root, &key, ObjectId::from_bytes(&[*v])).unwrap();
                }
                root
            };
            let old = build(&before);
            let new = build(&after);

            let mut expected = Vec::new();
            let keys: BTreeSet<u32> = before.keys().chain(after.keys()).copied().collect();
            for k in keys {
                let key = format!("app.test/{k}");
                match (before.get(&k), after.get(&k)) {
                    (None, Some(v)) => expected.push(RecordDelta::Created {
                        key,
                        value: ObjectId::from_bytes(&[*v]),
                    }),
                    (Some(p), None) => expected.push(RecordDelta::Deleted {
                        key,
                        prior: ObjectId::from_bytes(&[*p]),
                    }),
                    (Some(p), Some(v)) if p != v => expected.push(RecordDelta::Updated {
                        key,
                        prior: ObjectId::from_bytes(&[*p]),
                        later: ObjectId::from_bytes(&[*v]),
                    }),
                    _ => {}
                }
            }
            expected.sort_by(|a, b| a.key().cmp(b.key()));

            let diff = mst_diff(&store, &old, &new).unwrap();
            prop_assert_eq!(record_diff(&store, &diff).unwrap(), expected);
        }
    }
}

//! Write-staging transactions
//!
//! A [`Transaction`] buffers every write in an overlay. Reads go through the
//! overlay first, so a transaction always sees its own writes. Nothing
//! reaches the engine until [`Transaction::commit`]; dropping the transaction
//! (or calling [`Transaction::abort`]) discards the overlay.

use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{Arc, RwLock},
};

use matrixon_common::{MatrixonError, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument};

use crate::abstraction::KeyValueDatabaseEngine;

type Overlay = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

pub struct Transaction {
    engine: Arc<dyn KeyValueDatabaseEngine>,
    commit_gate: Arc<RwLock<()>>,
    staged: BTreeMap<&'static str, Overlay>,
}

impl Transaction {
    pub(crate) fn new(engine: Arc<dyn KeyValueDatabaseEngine>, commit_gate: Arc<RwLock<()>>) -> Self {
        Self {
            engine,
            commit_gate,
            staged: BTreeMap::new(),
        }
    }

    /// Whether any write has been staged
    pub fn is_dirty(&self) -> bool {
        self.staged.values().any(|overlay| !overlay.is_empty())
    }

    pub(crate) fn get_raw(&self, tree: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(staged) = self.staged.get(tree).and_then(|overlay| overlay.get(key)) {
            return Ok(staged.clone());
        }
        let _gate = self.commit_gate.read().map_err(gate_poisoned)?;
        self.engine.open_tree(tree)?.get(key)
    }

    pub(crate) fn put_raw(&mut self, tree: &'static str, key: Vec<u8>, value: Vec<u8>) {
        self.staged.entry(tree).or_default().insert(key, Some(value));
    }

    pub(crate) fn remove_raw(&mut self, tree: &'static str, key: Vec<u8>) {
        self.staged.entry(tree).or_default().insert(key, None);
    }

    /// Committed entries merged with the staged ones, ascending by key
    pub(crate) fn scan_prefix_raw(
        &self,
        tree: &'static str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = {
            let _gate = self.commit_gate.read().map_err(gate_poisoned)?;
            self.engine.open_tree(tree)?.scan_prefix(prefix)?.into_iter().collect()
        };

        if let Some(overlay) = self.staged.get(tree) {
            let staged = overlay
                .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
                .take_while(|(k, _)| k.starts_with(prefix));
            for (key, value) in staged {
                match value {
                    Some(value) => {
                        merged.insert(key.clone(), value.clone());
                    }
                    None => {
                        merged.remove(key);
                    }
                }
            }
        }

        Ok(merged.into_iter().collect())
    }

    /// The last `limit` entries under `prefix`, committed and staged merged,
    /// descending by key. The engine is only read as far back as needed.
    pub(crate) fn scan_prefix_rev_raw(
        &self,
        tree: &'static str,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let staged: Vec<(&Vec<u8>, &Option<Vec<u8>>)> = self
            .staged
            .get(tree)
            .map(|overlay| {
                overlay
                    .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
                    .take_while(|(k, _)| k.starts_with(prefix))
                    .collect()
            })
            .unwrap_or_default();
        // each staged key hides at most one committed entry
        let wanted = limit.saturating_add(staged.len());

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = {
            let _gate = self.commit_gate.read().map_err(gate_poisoned)?;
            let engine_tree = self.engine.open_tree(tree)?;
            match prefix_successor(prefix) {
                Some(end) => engine_tree
                    .iter_from(&end, true)
                    .skip_while(|entry| matches!(entry, Ok((key, _)) if *key == end))
                    .take_while(|entry| entry.as_ref().map_or(true, |(key, _)| key.starts_with(prefix)))
                    .take(wanted)
                    .collect::<Result<_>>()?,
                None => engine_tree.scan_prefix(prefix)?.into_iter().rev().take(wanted).collect(),
            }
        };

        for (key, value) in staged {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().rev().take(limit).collect())
    }

    pub(crate) fn get_json<T: DeserializeOwned>(&self, tree: &'static str, key: &[u8]) -> Result<Option<T>> {
        self.get_raw(tree, key)?
            .map(|bytes| decode(tree, &bytes))
            .transpose()
    }

    pub(crate) fn put_json<T: Serialize>(&mut self, tree: &'static str, key: Vec<u8>, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put_raw(tree, key, bytes);
        Ok(())
    }

    pub(crate) fn scan_json<T: DeserializeOwned>(&self, tree: &'static str, prefix: &[u8]) -> Result<Vec<T>> {
        self.scan_prefix_raw(tree, prefix)?
            .into_iter()
            .map(|(_, bytes)| decode(tree, &bytes))
            .collect()
    }

    /// Decodes only the last `limit` records under `prefix`, newest first
    pub(crate) fn scan_json_rev<T: DeserializeOwned>(
        &self,
        tree: &'static str,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<T>> {
        self.scan_prefix_rev_raw(tree, prefix, limit)?
            .into_iter()
            .map(|(_, bytes)| decode(tree, &bytes))
            .collect()
    }

    /// Applies every staged write atomically with respect to other readers
    #[instrument(level = "debug", skip(self))]
    pub fn commit(self) -> Result<()> {
        let _gate = self.commit_gate.write().map_err(gate_poisoned)?;
        let mut writes = 0usize;
        for (tree_name, overlay) in self.staged {
            let tree = self.engine.open_tree(tree_name)?;
            let mut inserts = Vec::new();
            for (key, value) in overlay {
                writes += 1;
                match value {
                    Some(value) => inserts.push((key, value)),
                    None => tree.remove(&key)?,
                }
            }
            tree.insert_batch(&mut inserts.into_iter())?;
        }
        self.engine.flush()?;
        debug!("✅ Committed transaction with {} writes", writes);
        Ok(())
    }

    /// Discards every staged write
    pub fn abort(self) {
        debug!("↩️ Aborting transaction with {} staged trees", self.staged.len());
    }
}

fn decode<T: DeserializeOwned>(tree: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|_| MatrixonError::bad_database(format!("Invalid record in {tree}")))
}

/// Smallest key sorting after every key that starts with `prefix`, `None`
/// for an all-`0xff` prefix
fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

fn gate_poisoned<T>(_: std::sync::PoisonError<T>) -> MatrixonError {
    MatrixonError::bad_database("Commit gate poisoned")
}

#[cfg(test)]
mod tests {
    use super::prefix_successor;
    use crate::Database;
    use test_log::test;

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_successor(b"a\xff\xff"), Some(b"b".to_vec()));
        assert_eq!(prefix_successor(b"\xff"), None);
    }

    #[test]
    fn test_reverse_scan_merges_overlay() {
        let db = Database::open_in_memory();
        let mut txn = db.transaction();
        for key in [b"p1", b"p2", b"p3", b"p4"] {
            txn.put_raw("tree", key.to_vec(), key.to_vec());
        }
        txn.put_raw("tree", b"q0".to_vec(), b"outside".to_vec());
        txn.put_raw("tree", b"o9".to_vec(), b"outside".to_vec());
        txn.commit().unwrap();

        let mut txn = db.transaction();
        txn.remove_raw("tree", b"p4".to_vec());
        txn.remove_raw("tree", b"p3".to_vec());
        txn.put_raw("tree", b"p2".to_vec(), b"changed".to_vec());

        let scanned = txn.scan_prefix_rev_raw("tree", b"p", 2).unwrap();
        assert_eq!(
            scanned,
            vec![(b"p2".to_vec(), b"changed".to_vec()), (b"p1".to_vec(), b"p1".to_vec())]
        );

        txn.put_raw("tree", b"p5".to_vec(), b"new".to_vec());
        let scanned = txn.scan_prefix_rev_raw("tree", b"p", 1).unwrap();
        assert_eq!(scanned, vec![(b"p5".to_vec(), b"new".to_vec())]);
        assert!(txn.scan_prefix_rev_raw("tree", b"x", 3).unwrap().is_empty());
    }

    #[test]
    fn test_reads_see_own_writes_before_commit() {
        let db = Database::open_in_memory();
        let mut txn = db.transaction();
        txn.put_raw("tree", b"a".to_vec(), b"1".to_vec());
        assert_eq!(txn.get_raw("tree", b"a").unwrap(), Some(b"1".to_vec()));
        assert!(txn.is_dirty());

        let other = db.transaction();
        assert_eq!(other.get_raw("tree", b"a").unwrap(), None);
    }

    #[test]
    fn test_commit_and_abort() {
        let db = Database::open_in_memory();

        let mut txn = db.transaction();
        txn.put_raw("tree", b"a".to_vec(), b"1".to_vec());
        txn.abort();
        assert_eq!(db.transaction().get_raw("tree", b"a").unwrap(), None);

        let mut txn = db.transaction();
        txn.put_raw("tree", b"a".to_vec(), b"1".to_vec());
        txn.put_raw("tree", b"b".to_vec(), b"2".to_vec());
        txn.commit().unwrap();

        let mut txn = db.transaction();
        txn.remove_raw("tree", b"a".to_vec());
        let scanned = txn.scan_prefix_raw("tree", b"").unwrap();
        assert_eq!(scanned, vec![(b"b".to_vec(), b"2".to_vec())]);
        txn.commit().unwrap();

        assert_eq!(db.transaction().get_raw("tree", b"a").unwrap(), None);
    }
}

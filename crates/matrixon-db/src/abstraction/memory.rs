use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::{Arc, RwLock},
};

use matrixon_common::{MatrixonError, Result};
use tracing::debug;

use super::{KeyValueDatabaseEngine, KvTree};

/// Engine keeping every tree in memory. Used by tests and the replay tool.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    trees: RwLock<HashMap<&'static str, Arc<MemoryTree>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueDatabaseEngine for MemoryEngine {
    fn open_tree(&self, name: &'static str) -> Result<Arc<dyn KvTree>> {
        if let Some(tree) = self.trees.read().map_err(poisoned)?.get(name) {
            return Ok(tree.clone());
        }

        let mut trees = self.trees.write().map_err(poisoned)?;
        let tree = trees.entry(name).or_insert_with(|| {
            debug!("🔧 Opening in-memory tree {}", name);
            Arc::new(MemoryTree::default())
        });
        Ok(tree.clone())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryTree {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl KvTree for MemoryTree {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().map_err(poisoned)?.get(key).cloned())
    }

    fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data
            .write()
            .map_err(poisoned)?
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn insert_batch(&self, iter: &mut dyn Iterator<Item = (Vec<u8>, Vec<u8>)>) -> Result<()> {
        let mut data = self.data.write().map_err(poisoned)?;
        for (key, value) in iter {
            data.insert(key, value);
        }
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.data.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn iter_from<'a>(
        &'a self,
        from: &[u8],
        backwards: bool,
    ) -> Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + 'a> {
        Box::new(MemoryTreeIter {
            tree: self,
            cursor: Some(Bound::Included(from.to_vec())),
            backwards,
        })
    }

    fn len(&self) -> Result<usize> {
        Ok(self.data.read().map_err(poisoned)?.len())
    }
}

/// Cursor over a [`MemoryTree`]. The lock is taken per step and released in
/// between, so a writer is never blocked by a half-consumed iterator.
struct MemoryTreeIter<'a> {
    tree: &'a MemoryTree,
    cursor: Option<Bound<Vec<u8>>>,
    backwards: bool,
}

impl Iterator for MemoryTreeIter<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let bound = self.cursor.take()?;
        let data = match self.tree.data.read() {
            Ok(data) => data,
            Err(e) => return Some(Err(poisoned(e))),
        };
        let (key, value) = if self.backwards {
            data.range::<Vec<u8>, _>((Bound::Unbounded, bound)).next_back()
        } else {
            data.range::<Vec<u8>, _>((bound, Bound::Unbounded)).next()
        }?;
        self.cursor = Some(Bound::Excluded(key.clone()));
        Some(Ok((key.clone(), value.clone())))
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> MatrixonError {
    MatrixonError::bad_database("In-memory tree lock poisoned")
}

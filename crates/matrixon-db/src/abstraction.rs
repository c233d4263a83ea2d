// =============================================================================
// Matrixon Matrix NextServer - Database Abstraction Module
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// Date: 2024-12-11
// Version: 2.0.0-alpha (Timeline Store)
// License: Apache 2.0 / MIT
//
// Description:
//   Key-value engine abstraction the timeline stores are built on. Engines
//   expose named trees of ordered byte keys.
//
// Features:
//   • Pluggable engines
//   • Ordered prefix scans
//   • Batch inserts
//
// Dependencies:
//   • Structured logging with tracing
//   • Error handling with thiserror
//   • Serialization with serde
//   • Matrix protocol types with ruma
//
// References:
//   • Matrix spec: https://spec.matrix.org/
//   • Client-server sync: https://spec.matrix.org/latest/client-server-api/#syncing
//
// =============================================================================

use std::sync::Arc;

use matrixon_common::Result;

pub mod memory;

pub use memory::MemoryEngine;

pub trait KeyValueDatabaseEngine: Send + Sync {
    /// Opens (or creates) the tree with the given name
    ///
    /// # Errors
    ///
    /// Returns a `Database` error if the tree cannot be opened.
    fn open_tree(&self, name: &'static str) -> Result<Arc<dyn KvTree>>;

    /// Flushes all pending changes to durable storage
    ///
    /// # Errors
    ///
    /// Returns a `Database` error if the flush operation fails.
    fn flush(&self) -> Result<()>;
}

pub trait KvTree: Send + Sync {
    /// Retrieves a value from the tree
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Inserts a key-value pair into the tree
    fn insert(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Inserts multiple key-value pairs in a batch
    fn insert_batch(&self, iter: &mut dyn Iterator<Item = (Vec<u8>, Vec<u8>)>) -> Result<()>;

    /// Removes a key-value pair from the tree
    fn remove(&self, key: &[u8]) -> Result<()>;

    /// Returns all key-value pairs whose key starts with `prefix`, in
    /// ascending key order
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Walks the tree from `from` (inclusive) in key order, or towards
    /// smaller keys when `backwards` is set. Entries are read one at a time,
    /// so stopping early never touches the rest of the tree.
    fn iter_from<'a>(
        &'a self,
        from: &[u8],
        backwards: bool,
    ) -> Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + 'a>;

    /// Number of entries in the tree
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

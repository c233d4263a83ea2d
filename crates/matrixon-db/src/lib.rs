//! Matrixon Database Library
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.11.0-alpha
//! Date: 2024-03-21
//!
//! Transactional key-value storage for the client-side room timeline:
//! fragments, timeline events, room state and room members. Engines plug in
//! through [`KeyValueDatabaseEngine`]; the bundled [`MemoryEngine`] keeps
//! everything in memory.
//!
//! # Examples
//! ```rust
//! use matrixon_db::{Database, TimelineFragmentStore};
//! use ruma::room_id;
//!
//! let db = Database::open_in_memory();
//! let txn = db.transaction();
//! assert!(txn.live_fragment(room_id!("!room:example.org")).unwrap().is_none());
//! ```

use std::sync::{Arc, RwLock};

use tracing::{debug, instrument};

pub mod abstraction;
pub mod key_value;
pub mod models;
pub mod transaction;

pub use abstraction::{KeyValueDatabaseEngine, KvTree, MemoryEngine};
pub use key_value::{RoomMemberStore, RoomStateStore, TimelineEventStore, TimelineFragmentStore};
pub use models::{Annotation, EventStorageEntry, Fragment, RoomMember};
pub use transaction::Transaction;

/// Handle to a storage engine. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    engine: Arc<dyn KeyValueDatabaseEngine>,
    commit_gate: Arc<RwLock<()>>,
}

impl Database {
    pub fn new(engine: Arc<dyn KeyValueDatabaseEngine>) -> Self {
        Self {
            engine,
            commit_gate: Arc::new(RwLock::new(())),
        }
    }

    /// A database backed by a fresh [`MemoryEngine`]
    pub fn open_in_memory() -> Self {
        debug!("🔧 Opening in-memory database");
        Self::new(Arc::new(MemoryEngine::new()))
    }

    /// Starts a transaction. The caller owns its lifetime: commit it, or
    /// drop it to discard every write.
    #[instrument(level = "debug", skip(self))]
    pub fn transaction(&self) -> Transaction {
        Transaction::new(self.engine.clone(), self.commit_gate.clone())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

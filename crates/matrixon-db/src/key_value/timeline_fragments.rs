// =============================================================================
// Matrixon Matrix NextServer - Timeline Fragments Module
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
//   Storage of timeline fragments: contiguous, gap-free runs of a room's
//   timeline linked to their neighbours once gaps are bridged.
//
// Features:
//   • Live fragment lookup
//   • Fragment add/update with existence checks
//   • Per-room fragment listing
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

use matrixon_common::{MatrixonError, Result};
use ruma::RoomId;
use tracing::instrument;

use super::{fragment_key, room_prefix, TIMELINE_FRAGMENTS};
use crate::{models::Fragment, transaction::Transaction};

pub trait TimelineFragmentStore {
    /// The fragment sync events are appended to, if the room was ever synced
    fn live_fragment(&self, room_id: &RoomId) -> Result<Option<Fragment>>;

    fn fragment(&self, room_id: &RoomId, fragment_id: u32) -> Result<Option<Fragment>>;

    /// Every fragment of the room, ascending by id
    fn fragments(&self, room_id: &RoomId) -> Result<Vec<Fragment>>;

    /// Adds a new fragment; fails if the id is taken
    fn add_fragment(&mut self, fragment: &Fragment) -> Result<()>;

    /// Overwrites an existing fragment; fails if it is unknown
    fn update_fragment(&mut self, fragment: &Fragment) -> Result<()>;
}

impl TimelineFragmentStore for Transaction {
    #[instrument(level = "debug", skip(self), fields(room = %room_id))]
    fn live_fragment(&self, room_id: &RoomId) -> Result<Option<Fragment>> {
        // With unlinked islands (e.g. from jumping to a permalink) several
        // fragments may be open-ended; the newest one is the sync fragment.
        Ok(self
            .fragments(room_id)?
            .into_iter()
            .rev()
            .find(Fragment::is_live))
    }

    fn fragment(&self, room_id: &RoomId, fragment_id: u32) -> Result<Option<Fragment>> {
        self.get_json(TIMELINE_FRAGMENTS, &fragment_key(room_id, fragment_id))
    }

    fn fragments(&self, room_id: &RoomId) -> Result<Vec<Fragment>> {
        self.scan_json(TIMELINE_FRAGMENTS, &room_prefix(room_id))
    }

    fn add_fragment(&mut self, fragment: &Fragment) -> Result<()> {
        let key = fragment_key(&fragment.room_id, fragment.id);
        if self.get_raw(TIMELINE_FRAGMENTS, &key)?.is_some() {
            return Err(MatrixonError::AlreadyExists(format!(
                "fragment {} in {}",
                fragment.id, fragment.room_id
            )));
        }
        self.put_json(TIMELINE_FRAGMENTS, key, fragment)
    }

    fn update_fragment(&mut self, fragment: &Fragment) -> Result<()> {
        let key = fragment_key(&fragment.room_id, fragment.id);
        if self.get_raw(TIMELINE_FRAGMENTS, &key)?.is_none() {
            return Err(MatrixonError::NotFound(format!(
                "fragment {} in {}",
                fragment.id, fragment.room_id
            )));
        }
        self.put_json(TIMELINE_FRAGMENTS, key, fragment)
    }
}

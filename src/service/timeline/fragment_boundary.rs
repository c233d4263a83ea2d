// =============================================================================
// Matrixon Matrix NextServer - Fragment Boundary Module
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
//   Creates the first live fragment of a room and opens a new one when a
//   sync reports a gap.
//
// Features:
//   • Fragment creation
//   • Fragment linking on limited syncs
//   • Boundary entries
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

use matrixon_common::{MatrixonError, Result};
use matrixon_core::TimelineSection;
use matrixon_db::{Fragment, TimelineFragmentStore, Transaction};
use ruma::OwnedRoomId;
use tracing::{debug, instrument};

use super::{
    entries::{FragmentBoundaryEntry, TimelineEntry},
    event_key::{EventKey, MIN_FRAGMENT_ID},
    fragment_id_comparer::FragmentOrder,
};

/// Creates and replaces the live fragment of one room.
pub struct FragmentBoundaryManager {
    room_id: OwnedRoomId,
    order: Arc<dyn FragmentOrder>,
}

impl FragmentBoundaryManager {
    pub fn new(room_id: OwnedRoomId, order: Arc<dyn FragmentOrder>) -> Self {
        Self { room_id, order }
    }

    /// Makes sure there is a live fragment to append `timeline` to and
    /// returns the key to write its first event at, together with the
    /// boundary entries of any fragment created or closed.
    ///
    /// A room without a key gets its first fragment. A limited timeline
    /// closes the current live fragment and links a new one after it; the
    /// `prev_batch` token lets the gap between them be filled later.
    #[instrument(level = "debug", skip(self, timeline, txn), fields(room = %self.room_id))]
    pub fn ensure_live_fragment(
        &self,
        current_key: Option<EventKey>,
        timeline: &TimelineSection,
        txn: &mut Transaction,
    ) -> Result<(EventKey, Vec<TimelineEntry>)> {
        let Some(current_key) = current_key else {
            let fragment = Fragment {
                room_id: self.room_id.clone(),
                id: MIN_FRAGMENT_ID,
                previous_id: None,
                next_id: None,
                previous_token: timeline.prev_batch.clone(),
                next_token: None,
            };
            txn.add_fragment(&fragment)?;
            self.order.add(&fragment)?;
            debug!("🔧 Created first fragment {} for {}", fragment.id, self.room_id);

            let start = FragmentBoundaryEntry::start(fragment, self.order.clone());
            return Ok((
                EventKey::default_live_key(),
                vec![TimelineEntry::FragmentBoundary(start)],
            ));
        };

        if !timeline.limited {
            return Ok((current_key, Vec::new()));
        }

        let mut current = txn
            .fragment(&self.room_id, current_key.fragment_id)?
            .ok_or_else(|| {
                MatrixonError::invalid_state(format!(
                    "live fragment {} of {} is missing from storage",
                    current_key.fragment_id, self.room_id
                ))
            })?;

        let new_key = current_key.next_fragment_key();
        let fragment = Fragment {
            room_id: self.room_id.clone(),
            id: new_key.fragment_id,
            previous_id: Some(current.id),
            next_id: None,
            previous_token: timeline.prev_batch.clone(),
            next_token: None,
        };
        txn.add_fragment(&fragment)?;
        current.next_id = Some(fragment.id);
        txn.update_fragment(&current)?;
        self.order.add(&fragment)?;
        self.order.append(fragment.id, current.id)?;
        debug!(
            "🔧 Limited sync: fragment {} follows {} in {}",
            fragment.id, current.id, self.room_id
        );

        let end = FragmentBoundaryEntry::end(current, self.order.clone());
        let start = FragmentBoundaryEntry::start(fragment, self.order.clone());
        Ok((
            new_key,
            vec![
                TimelineEntry::FragmentBoundary(end),
                TimelineEntry::FragmentBoundary(start),
            ],
        ))
    }
}

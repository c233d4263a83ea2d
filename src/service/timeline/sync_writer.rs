// =============================================================================
// Matrixon Matrix NextServer - Sync Writer Module
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
//   Writes one sync response of a room: rejoin overlap, room state and the
//   timeline, with a two-phase update of the live position.
//
// Features:
//   • Rejoin overlap detection
//   • Ordered timeline writes
//   • Two-phase live key update
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

use std::{collections::HashMap, sync::Arc, time::Instant};

use matrixon_common::Result;
use matrixon_core::{RoomSyncResponse, StateSection, TimelineSection};
use matrixon_db::{
    EventStorageEntry, RoomStateStore, TimelineEventStore, TimelineFragmentStore, Transaction,
};
use ruma::{OwnedRoomId, OwnedUserId, RoomId};
use tracing::{debug, info, instrument, warn};

use super::{
    dedup::deduplicate_events,
    entries::{EventEntry, TimelineEntry},
    event_key::EventKey,
    fragment_boundary::FragmentBoundaryManager,
    fragment_id_comparer::FragmentOrder,
    member_writer::{MemberChange, MemberWriter},
    relation_writer::RelationWriter,
};

/// Outcome of writing one sync response.
#[derive(Debug, Default)]
pub struct SyncWriteResult {
    /// New timeline entries, fragment boundaries included, in write order
    pub entries: Vec<TimelineEntry>,
    /// Previously stored entries changed by relations in this sync
    pub updated_entries: Vec<TimelineEntry>,
    /// Key to hand to [`SyncWriter::after_sync`] once the transaction commits
    pub new_live_key: Option<EventKey>,
    pub member_changes: HashMap<OwnedUserId, MemberChange>,
}

/// Appends sync responses of one room to its live timeline fragment.
///
/// `write_sync` only stages writes in the caller's transaction. The writer's
/// own position moves in [`after_sync`](Self::after_sync), which the caller
/// runs after a successful commit, so an aborted transaction leaves the
/// writer at the last committed position.
///
/// The fragment order is not transactional. A limited sync registers its new
/// fragment and link with the [`FragmentOrder`] while the transaction is
/// still open, and an abort leaves them behind. The next attempt creates the
/// same fragment id at the same place and overwrites the link, so the order
/// stays consistent with what is eventually committed.
pub struct SyncWriter {
    room_id: OwnedRoomId,
    order: Arc<dyn FragmentOrder>,
    member_writer: Arc<dyn MemberWriter>,
    relation_writer: Arc<dyn RelationWriter>,
    boundaries: FragmentBoundaryManager,
    last_live_key: Option<EventKey>,
}

impl SyncWriter {
    pub fn new(
        room_id: OwnedRoomId,
        order: Arc<dyn FragmentOrder>,
        member_writer: Arc<dyn MemberWriter>,
        relation_writer: Arc<dyn RelationWriter>,
    ) -> Self {
        Self {
            boundaries: FragmentBoundaryManager::new(room_id.clone(), order.clone()),
            room_id,
            order,
            member_writer,
            relation_writer,
            last_live_key: None,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Next free position in the live fragment, `None` for a room that was
    /// never synced
    pub fn last_live_key(&self) -> Option<EventKey> {
        self.last_live_key
    }

    /// Restores the live position from storage. Only reads.
    #[instrument(level = "debug", skip(self, txn), fields(room = %self.room_id))]
    pub fn load(&mut self, txn: &Transaction) -> Result<Option<EventKey>> {
        self.last_live_key = match txn.live_fragment(&self.room_id)? {
            Some(fragment) => {
                let key = match txn.last_events(&self.room_id, fragment.id, 1)?.first() {
                    Some(last) => EventKey::new(last.fragment_id, last.event_index).next_key(),
                    None => EventKey::default_fragment_key(fragment.id),
                };
                Some(key)
            }
            None => None,
        };
        debug!(
            "🔧 Loaded live key {:?} for {}",
            self.last_live_key.map(|key| key.to_string()),
            self.room_id
        );
        Ok(self.last_live_key)
    }

    /// Writes the state and timeline of one sync response. `is_rejoin`
    /// marks the first sync after rejoining the room, whose timeline may
    /// overlap with what is already stored.
    #[instrument(level = "debug", skip(self, response, txn), fields(room = %self.room_id))]
    pub async fn write_sync(
        &self,
        response: &RoomSyncResponse,
        is_rejoin: bool,
        txn: &mut Transaction,
    ) -> Result<SyncWriteResult> {
        let start = Instant::now();
        let mut result = SyncWriteResult::default();

        let mut timeline = response.timeline.clone();
        if is_rejoin {
            if let Some(timeline) = timeline.as_mut() {
                self.handle_rejoin_overlap(timeline, txn)?;
            }
        }

        if let Some(state) = &response.state {
            let is_limited = timeline.as_ref().is_some_and(|timeline| timeline.limited);
            self.write_state(state, is_limited, txn, &mut result).await?;
        }

        let mut current_key = self.last_live_key;
        if let Some(timeline) = timeline.as_ref().filter(|timeline| !timeline.events.is_empty()) {
            current_key = Some(self.write_timeline(timeline, current_key, txn, &mut result).await?);
        }
        result.new_live_key = current_key;

        info!(
            "✅ Wrote sync for {} in {:?}: {} entries, {} updated, {} member changes",
            self.room_id,
            start.elapsed(),
            result.entries.len(),
            result.updated_entries.len(),
            result.member_changes.len()
        );
        Ok(result)
    }

    /// Moves the writer to the key returned by a committed `write_sync`
    pub fn after_sync(&mut self, new_live_key: Option<EventKey>) {
        self.last_live_key = new_live_key;
    }

    /// After a rejoin the server may resend events we already have. If the
    /// last stored event shows up in the new timeline, only what follows it
    /// is written and there is no gap. Otherwise the overlap is unknown and
    /// the timeline is treated as limited.
    fn handle_rejoin_overlap(&self, timeline: &mut TimelineSection, txn: &Transaction) -> Result<()> {
        if let Some(key) = self.last_live_key {
            if let Some(last) = txn.last_events(&self.room_id, key.fragment_id, 1)?.first() {
                let last_event_id = &last.event.event_id;
                if let Some(position) = timeline
                    .events
                    .iter()
                    .position(|event| &event.event_id == last_event_id)
                {
                    debug!(
                        "🔧 Rejoin overlap ends at {}, skipping {} events",
                        last_event_id,
                        position + 1
                    );
                    timeline.events = timeline.events.split_off(position + 1);
                    timeline.limited = false;
                    return Ok(());
                }
            }
        }

        if !timeline.limited {
            warn!(
                "⚠️ No overlap with stored timeline of {} after rejoin, treating sync as limited",
                self.room_id
            );
            timeline.limited = true;
        }
        Ok(())
    }

    async fn write_state(
        &self,
        state: &StateSection,
        is_limited: bool,
        txn: &mut Transaction,
        result: &mut SyncWriteResult,
    ) -> Result<()> {
        for event in &state.events {
            if event.is_member_event() {
                if let Some(change) = self
                    .member_writer
                    .write_state_member_event(event, is_limited, txn)
                    .await?
                {
                    result.member_changes.insert(change.member.user_id.clone(), change);
                }
            } else {
                txn.set_room_state(&self.room_id, event)?;
            }
        }
        Ok(())
    }

    async fn write_timeline(
        &self,
        timeline: &TimelineSection,
        current_key: Option<EventKey>,
        txn: &mut Transaction,
        result: &mut SyncWriteResult,
    ) -> Result<EventKey> {
        let events = deduplicate_events(&timeline.events);
        let (mut key, boundaries) = self.boundaries.ensure_live_fragment(current_key, timeline, txn)?;
        result.entries.extend(boundaries);

        for (index, event) in events.iter().enumerate() {
            let mut storage = EventStorageEntry::new(
                self.room_id.clone(),
                key.fragment_id,
                key.event_index,
                event.clone(),
            );
            // Only events up to this one may shape the sender's profile, a
            // later rename must not leak backwards.
            if let Some(member) = self
                .member_writer
                .lookup_member(&event.sender, event, &events[..=index], txn)
                .await?
            {
                storage.display_name = member.display_name;
                storage.avatar_url = member.avatar_url;
            }

            if !txn.try_insert_event(&storage)? {
                warn!("⚠️ Skipping {} in {}, already in the timeline", event.event_id, self.room_id);
                continue;
            }

            let entry = EventEntry::new(storage, self.order.clone());
            if let Some(updated) = self.relation_writer.write_relation(&entry, txn).await? {
                result
                    .updated_entries
                    .extend(updated.into_iter().map(TimelineEntry::Event));
            }
            result.entries.push(TimelineEntry::Event(entry));
            key = key.next_key();

            if event.is_state() {
                if event.is_member_event() {
                    if let Some(change) = self.member_writer.write_timeline_member_event(event, txn).await? {
                        result.member_changes.insert(change.member.user_id.clone(), change);
                    }
                } else {
                    txn.set_room_state(&self.room_id, event)?;
                }
            }
        }

        Ok(key)
    }
}

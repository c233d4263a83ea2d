// =============================================================================
// Matrixon Matrix NextServer - Timeline Events Module
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
//   Append-only storage of timeline event entries addressed by fragment id and
//   event index, with a secondary event-id index for relation lookups.
//
// Features:
//   • Most-recent-first fragment reads
//   • Event id deduplication on insert
//   • In-place updates for relation aggregation
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
use ruma::{EventId, RoomId};
use tracing::{instrument, warn};

use super::{event_key, fragment_key, room_prefix, TIMELINE_EVENTS, TIMELINE_EVENT_IDS};
use crate::{models::EventStorageEntry, transaction::Transaction};

pub trait TimelineEventStore {
    /// Up to `amount` entries from the end of a fragment, most recent first
    fn last_events(&self, room_id: &RoomId, fragment_id: u32, amount: usize) -> Result<Vec<EventStorageEntry>>;

    /// Up to `amount` entries from the start of a fragment, oldest first
    fn first_events(&self, room_id: &RoomId, fragment_id: u32, amount: usize) -> Result<Vec<EventStorageEntry>>;

    fn event_by_id(&self, room_id: &RoomId, event_id: &EventId) -> Result<Option<EventStorageEntry>>;

    /// Inserts an entry; fails if its position or its event id is taken
    fn insert_event(&mut self, entry: &EventStorageEntry) -> Result<()>;

    /// Like [`insert_event`](Self::insert_event), but returns `false`
    /// instead of failing when the event id is already stored
    fn try_insert_event(&mut self, entry: &EventStorageEntry) -> Result<bool>;

    /// Overwrites an existing entry in place; its position must not change
    fn update_event(&mut self, entry: &EventStorageEntry) -> Result<()>;
}

fn position_bytes(fragment_id: u32, event_index: u32) -> Vec<u8> {
    let mut bytes = fragment_id.to_be_bytes().to_vec();
    bytes.extend_from_slice(&event_index.to_be_bytes());
    bytes
}

fn event_id_key(room_id: &RoomId, event_id: &EventId) -> Vec<u8> {
    let mut key = room_prefix(room_id);
    key.extend_from_slice(event_id.as_bytes());
    key
}

fn parse_position(bytes: &[u8]) -> Result<(u32, u32)> {
    let invalid = || MatrixonError::bad_database("Invalid event position in timeline_event_ids");
    let fragment_id = bytes.get(0..4).ok_or_else(invalid)?;
    let event_index = bytes.get(4..8).ok_or_else(invalid)?;
    Ok((
        u32::from_be_bytes(fragment_id.try_into().map_err(|_| invalid())?),
        u32::from_be_bytes(event_index.try_into().map_err(|_| invalid())?),
    ))
}

impl TimelineEventStore for Transaction {
    #[instrument(level = "debug", skip(self), fields(room = %room_id))]
    fn last_events(&self, room_id: &RoomId, fragment_id: u32, amount: usize) -> Result<Vec<EventStorageEntry>> {
        self.scan_json_rev(TIMELINE_EVENTS, &fragment_key(room_id, fragment_id), amount)
    }

    fn first_events(&self, room_id: &RoomId, fragment_id: u32, amount: usize) -> Result<Vec<EventStorageEntry>> {
        let mut entries: Vec<EventStorageEntry> =
            self.scan_json(TIMELINE_EVENTS, &fragment_key(room_id, fragment_id))?;
        entries.truncate(amount);
        Ok(entries)
    }

    fn event_by_id(&self, room_id: &RoomId, event_id: &EventId) -> Result<Option<EventStorageEntry>> {
        let Some(position) = self.get_raw(TIMELINE_EVENT_IDS, &event_id_key(room_id, event_id))? else {
            return Ok(None);
        };
        let (fragment_id, event_index) = parse_position(&position)?;
        let entry = self.get_json(TIMELINE_EVENTS, &event_key(room_id, fragment_id, event_index))?;
        if entry.is_none() {
            return Err(MatrixonError::bad_database(format!(
                "Event id index points at a missing entry for {event_id}"
            )));
        }
        Ok(entry)
    }

    fn insert_event(&mut self, entry: &EventStorageEntry) -> Result<()> {
        if !self.try_insert_event(entry)? {
            return Err(MatrixonError::AlreadyExists(format!(
                "event {} in {}",
                entry.event.event_id, entry.room_id
            )));
        }
        Ok(())
    }

    #[instrument(level = "debug", skip(self, entry), fields(room = %entry.room_id, event = %entry.event.event_id))]
    fn try_insert_event(&mut self, entry: &EventStorageEntry) -> Result<bool> {
        let id_key = event_id_key(&entry.room_id, &entry.event.event_id);
        if self.get_raw(TIMELINE_EVENT_IDS, &id_key)?.is_some() {
            warn!("⚠️ Event {} is already stored", entry.event.event_id);
            return Ok(false);
        }

        let key = event_key(&entry.room_id, entry.fragment_id, entry.event_index);
        if self.get_raw(TIMELINE_EVENTS, &key)?.is_some() {
            return Err(MatrixonError::invalid_state(format!(
                "position {}/{} in {} is already taken",
                entry.fragment_id, entry.event_index, entry.room_id
            )));
        }

        self.put_json(TIMELINE_EVENTS, key, entry)?;
        self.put_raw(
            TIMELINE_EVENT_IDS,
            id_key,
            position_bytes(entry.fragment_id, entry.event_index),
        );
        Ok(true)
    }

    fn update_event(&mut self, entry: &EventStorageEntry) -> Result<()> {
        let key = event_key(&entry.room_id, entry.fragment_id, entry.event_index);
        let stored = self
            .get_raw(TIMELINE_EVENT_IDS, &event_id_key(&entry.room_id, &entry.event.event_id))?
            .map(|position| parse_position(&position))
            .transpose()?;
        if stored != Some((entry.fragment_id, entry.event_index)) {
            return Err(MatrixonError::NotFound(format!(
                "event {} at {}/{} in {}",
                entry.event.event_id, entry.fragment_id, entry.event_index, entry.room_id
            )));
        }
        self.put_json(TIMELINE_EVENTS, key, entry)
    }
}

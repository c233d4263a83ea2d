// =============================================================================
// Matrixon Matrix NextServer - Room State Module
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
//   Latest room state event per (type, state key), overwritten whenever a newer
//   state event arrives from the state section or the timeline.
//
// Features:
//   • Upsert by type and state key
//   • Per-room state listing
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

use matrixon_common::Result;
use matrixon_core::RoomEvent;
use ruma::RoomId;
use tracing::debug;

use super::{room_prefix, ROOM_STATE};
use crate::transaction::Transaction;

pub trait RoomStateStore {
    /// Upserts the latest state event for its `(type, state_key)` pair
    fn set_room_state(&mut self, room_id: &RoomId, event: &RoomEvent) -> Result<()>;

    fn room_state(&self, room_id: &RoomId, event_type: &str, state_key: &str) -> Result<Option<RoomEvent>>;

    /// All current state events of a room
    fn room_state_events(&self, room_id: &RoomId) -> Result<Vec<RoomEvent>>;
}

fn state_key_bytes(room_id: &RoomId, event_type: &str, state_key: &str) -> Vec<u8> {
    let mut key = room_prefix(room_id);
    key.extend_from_slice(event_type.as_bytes());
    key.push(0xff);
    key.extend_from_slice(state_key.as_bytes());
    key
}

impl RoomStateStore for Transaction {
    fn set_room_state(&mut self, room_id: &RoomId, event: &RoomEvent) -> Result<()> {
        let state_key = event.state_key.as_deref().unwrap_or_default();
        let event_type = event.kind.to_string();
        debug!("🔧 Setting room state {} [{}] in {}", event_type, state_key, room_id);
        self.put_json(ROOM_STATE, state_key_bytes(room_id, &event_type, state_key), event)
    }

    fn room_state(&self, room_id: &RoomId, event_type: &str, state_key: &str) -> Result<Option<RoomEvent>> {
        self.get_json(ROOM_STATE, &state_key_bytes(room_id, event_type, state_key))
    }

    fn room_state_events(&self, room_id: &RoomId) -> Result<Vec<RoomEvent>> {
        self.scan_json(ROOM_STATE, &room_prefix(room_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use ruma::room_id;
    use serde_json::json;
    use test_log::test;

    fn topic(event_id: &str, topic: &str) -> RoomEvent {
        serde_json::from_value(json!({
            "event_id": event_id,
            "type": "m.room.topic",
            "sender": "@alice:example.org",
            "state_key": "",
            "content": { "topic": topic }
        }))
        .unwrap()
    }

    #[test]
    fn test_newer_state_overwrites_older() {
        let db = Database::open_in_memory();
        let mut txn = db.transaction();
        let room_id = room_id!("!room:example.org");

        txn.set_room_state(room_id, &topic("$t1", "first")).unwrap();
        txn.set_room_state(room_id, &topic("$t2", "second")).unwrap();

        let stored = txn.room_state(room_id, "m.room.topic", "").unwrap().unwrap();
        assert_eq!(stored.content["topic"], "second");
        assert_eq!(txn.room_state_events(room_id).unwrap().len(), 1);
        assert!(txn.room_state(room_id, "m.room.name", "").unwrap().is_none());
    }
}

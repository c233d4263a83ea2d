// =============================================================================
// Matrixon Matrix NextServer - Key Value Module
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
//   Typed timeline stores layered over the transactional key-value engine. Keys
//   are byte strings built from the room id, 0xff separators and big-endian
//   integers so that byte order equals timeline order.
//
// Features:
//   • Per-room key prefixes
//   • Order-preserving integer encoding
//   • Store traits implemented for Transaction
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

mod room_members;
mod room_state;
mod timeline_events;
mod timeline_fragments;

pub use room_members::RoomMemberStore;
pub use room_state::RoomStateStore;
pub use timeline_events::TimelineEventStore;
pub use timeline_fragments::TimelineFragmentStore;

use ruma::RoomId;

pub(crate) const TIMELINE_FRAGMENTS: &str = "timeline_fragments";
pub(crate) const TIMELINE_EVENTS: &str = "timeline_events";
pub(crate) const TIMELINE_EVENT_IDS: &str = "timeline_event_ids";
pub(crate) const ROOM_STATE: &str = "room_state";
pub(crate) const ROOM_MEMBERS: &str = "room_members";

/// `room_id` followed by the `0xff` separator. Room ids are UTF-8 and never
/// contain `0xff`, so this prefix never matches a different room.
fn room_prefix(room_id: &RoomId) -> Vec<u8> {
    let mut prefix = room_id.as_bytes().to_vec();
    prefix.push(0xff);
    prefix
}

/// Big-endian so that byte order equals numeric order
fn push_u32(key: &mut Vec<u8>, value: u32) {
    key.extend_from_slice(&value.to_be_bytes());
}

fn fragment_key(room_id: &RoomId, fragment_id: u32) -> Vec<u8> {
    let mut key = room_prefix(room_id);
    push_u32(&mut key, fragment_id);
    key
}

fn event_key(room_id: &RoomId, fragment_id: u32, event_index: u32) -> Vec<u8> {
    let mut key = fragment_key(room_id, fragment_id);
    push_u32(&mut key, event_index);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruma::room_id;
    use test_log::test;

    #[test]
    fn test_room_prefix() {
        let room_id = room_id!("!test:example.com");
        let prefix = room_prefix(room_id);

        assert_eq!(prefix.len(), room_id.as_bytes().len() + 1);
        assert!(prefix.starts_with(room_id.as_bytes()));
        assert_eq!(prefix[room_id.as_bytes().len()], 0xff);
    }

    #[test]
    fn test_event_keys_sort_numerically() {
        let room_id = room_id!("!test:example.com");

        assert!(event_key(room_id, 0, 255) < event_key(room_id, 0, 256));
        assert!(event_key(room_id, 0, u32::MAX) < event_key(room_id, 1, 0));
        assert!(event_key(room_id, 1, 0).starts_with(&fragment_key(room_id, 1)));
    }
}

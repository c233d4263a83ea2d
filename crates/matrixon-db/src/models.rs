//! Stored record types
//!
//! Records are encoded with `serde_json`. Keys are built separately by the
//! stores in [`crate::key_value`], so none of these types need to be
//! orderable themselves.

use std::collections::BTreeMap;

use matrixon_core::RoomEvent;
use ruma::{
    events::room::member::MembershipState, MilliSecondsSinceUnixEpoch, OwnedRoomId, OwnedUserId,
};
use serde::{Deserialize, Serialize};

/// A contiguous, gap-free run of a room's timeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub room_id: OwnedRoomId,
    pub id: u32,
    pub previous_id: Option<u32>,
    pub next_id: Option<u32>,
    /// Token to paginate backwards from the start of this fragment; `None`
    /// once the start of the room has been reached or the fragment is
    /// linked to its predecessor.
    pub previous_token: Option<String>,
    /// Token to paginate forwards from the end of this fragment.
    pub next_token: Option<String>,
}

impl Fragment {
    /// The fragment new sync events are appended to: nothing is known to
    /// follow it, neither a linked fragment nor a pagination token.
    pub fn is_live(&self) -> bool {
        self.next_id.is_none() && self.next_token.is_none()
    }
}

/// Aggregated `m.annotation` relations for one key on a target event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub count: u32,
    /// Whether one of the annotations was sent by the local user
    #[serde(default)]
    pub me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<MilliSecondsSinceUnixEpoch>,
}

/// A timeline event as persisted: the raw event, its position and the
/// sender's profile as it was when the event was written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventStorageEntry {
    pub room_id: OwnedRoomId,
    pub fragment_id: u32,
    pub event_index: u32,
    pub event: RoomEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, Annotation>,
}

impl EventStorageEntry {
    pub fn new(room_id: OwnedRoomId, fragment_id: u32, event_index: u32, event: RoomEvent) -> Self {
        Self {
            room_id,
            fragment_id,
            event_index,
            event,
            display_name: None,
            avatar_url: None,
            annotations: BTreeMap::new(),
        }
    }
}

/// Membership and profile of one user in one room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMember {
    pub room_id: OwnedRoomId,
    pub user_id: OwnedUserId,
    pub membership: MembershipState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

//! Sync response and room event types
//!
//! These mirror the shape of the joined-room section of a client `/sync`
//! response as far as the timeline writer needs it. Every section is optional
//! so that partial responses deserialize into "nothing to write" instead of
//! failing.

use ruma::{
    events::{room::member::MembershipState, TimelineEventType},
    MilliSecondsSinceUnixEpoch, OwnedEventId, OwnedUserId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Relation type used by reactions.
pub const ANNOTATION_REL_TYPE: &str = "m.annotation";

/// A room event as delivered in the `state` or `timeline` section of a sync.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RoomEvent {
    pub event_id: OwnedEventId,
    #[serde(rename = "type")]
    pub kind: TimelineEventType,
    pub sender: OwnedUserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_server_ts: Option<MilliSecondsSinceUnixEpoch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsigned: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts: Option<OwnedEventId>,
}

/// `m.relates_to` of an event, reduced to the fields aggregation looks at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelatesTo {
    pub rel_type: Option<String>,
    pub event_id: OwnedEventId,
    pub key: Option<String>,
}

impl RoomEvent {
    /// Whether the event carries a state key, i.e. updates room state.
    pub fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    pub fn is_member_event(&self) -> bool {
        self.kind == TimelineEventType::RoomMember
    }

    /// `unsigned.prev_content`, if the server sent it.
    pub fn prev_content(&self) -> Option<&Value> {
        self.unsigned.as_ref()?.get("prev_content")
    }

    /// Membership carried by an `m.room.member` event.
    pub fn membership(&self) -> Option<MembershipState> {
        self.content
            .get("membership")
            .and_then(Value::as_str)
            .map(MembershipState::from)
    }

    /// Parses `content["m.relates_to"]`. Replies (`m.in_reply_to`) carry no
    /// top-level `event_id` and are ignored.
    pub fn relates_to(&self) -> Option<RelatesTo> {
        let relates_to = self.content.get("m.relates_to")?;
        let event_id = relates_to
            .get("event_id")
            .and_then(Value::as_str)
            .and_then(|id| OwnedEventId::try_from(id).ok())?;

        Some(RelatesTo {
            rel_type: relates_to
                .get("rel_type")
                .and_then(Value::as_str)
                .map(str::to_owned),
            event_id,
            key: relates_to
                .get("key")
                .and_then(Value::as_str)
                .map(str::to_owned),
        })
    }

    /// The event a redaction targets. Newer room versions move `redacts`
    /// into the content, older ones keep it at the top level.
    pub fn redacted_event_id(&self) -> Option<OwnedEventId> {
        if self.kind != TimelineEventType::RoomRedaction {
            return None;
        }
        self.redacts.clone().or_else(|| {
            self.content
                .get("redacts")
                .and_then(Value::as_str)
                .and_then(|id| OwnedEventId::try_from(id).ok())
        })
    }
}

/// `state` section of a joined room.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct StateSection {
    #[serde(default)]
    pub events: Vec<RoomEvent>,
}

/// `timeline` section of a joined room.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TimelineSection {
    #[serde(default)]
    pub events: Vec<RoomEvent>,
    /// The server could not guarantee this slice is contiguous with what
    /// the client saw before.
    #[serde(default)]
    pub limited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_batch: Option<String>,
}

/// Joined-room section of a sync response.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct RoomSyncResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<TimelineSection>,
}

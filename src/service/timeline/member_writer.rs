// =============================================================================
// Matrixon Matrix NextServer - Member Writer Module
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
//   Keeps stored room membership in step with the sync stream and resolves
//   the sender profile of each written event.
//
// Features:
//   • Lazy-loaded member handling
//   • Membership change reporting
//   • Profile lookup within a batch
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

use async_trait::async_trait;
use matrixon_common::Result;
use matrixon_core::RoomEvent;
use matrixon_db::{RoomMember, RoomMemberStore, Transaction};
use ruma::{events::room::member::MembershipState, OwnedRoomId, OwnedUserId, UserId};
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// Membership or profile change of one user, produced while writing a sync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberChange {
    pub member: RoomMember,
    /// Membership before the change; `None` if the user was unknown
    pub previous_membership: Option<MembershipState>,
}

impl MemberChange {
    pub fn user_id(&self) -> &UserId {
        &self.member.user_id
    }

    pub fn membership(&self) -> &MembershipState {
        &self.member.membership
    }

    pub fn has_joined(&self) -> bool {
        self.member.membership == MembershipState::Join
            && self.previous_membership != Some(MembershipState::Join)
    }

    pub fn has_left(&self) -> bool {
        self.previous_membership == Some(MembershipState::Join)
            && self.member.membership != MembershipState::Join
    }
}

/// Keeps room membership in storage in step with the events being written.
#[async_trait]
pub trait MemberWriter: Send + Sync {
    /// Member event from the sync `state` section. When the timeline is not
    /// limited these are lazy-loaded members rather than membership changes.
    async fn write_state_member_event(
        &self,
        event: &RoomEvent,
        is_limited: bool,
        txn: &mut Transaction,
    ) -> Result<Option<MemberChange>>;

    /// Member event that is part of the timeline itself
    async fn write_timeline_member_event(
        &self,
        event: &RoomEvent,
        txn: &mut Transaction,
    ) -> Result<Option<MemberChange>>;

    /// Profile of `sender` at the point `event` is written. `batch` holds
    /// the timeline events up to and including `event`.
    async fn lookup_member(
        &self,
        sender: &UserId,
        event: &RoomEvent,
        batch: &[RoomEvent],
        txn: &Transaction,
    ) -> Result<Option<RoomMember>>;
}

/// [`MemberWriter`] backed by the room member store.
#[derive(Clone, Debug)]
pub struct RoomMemberWriter {
    room_id: OwnedRoomId,
}

impl RoomMemberWriter {
    pub fn new(room_id: OwnedRoomId) -> Self {
        Self { room_id }
    }

    /// Member described by an `m.room.member` event. Servers leave the
    /// profile out of some leave events, so it falls back to `prev_content`.
    pub fn member_from_event(&self, event: &RoomEvent) -> Option<RoomMember> {
        if !event.is_member_event() {
            return None;
        }
        let user_id = OwnedUserId::try_from(event.state_key.as_deref()?).ok()?;
        let membership = event.membership()?;

        let profile_field = |field: &str| {
            event
                .content
                .get(field)
                .and_then(Value::as_str)
                .or_else(|| event.prev_content()?.get(field)?.as_str())
                .map(str::to_owned)
        };

        Some(RoomMember {
            room_id: self.room_id.clone(),
            user_id,
            membership,
            display_name: profile_field("displayname"),
            avatar_url: profile_field("avatar_url"),
        })
    }

    async fn write_member(
        &self,
        event: &RoomEvent,
        is_lazy_loaded: bool,
        txn: &mut Transaction,
    ) -> Result<Option<MemberChange>> {
        let Some(member) = self.member_from_event(event) else {
            warn!("⚠️ Ignoring malformed member event {}", event.event_id);
            return Ok(None);
        };

        let existing = txn.member(&self.room_id, &member.user_id)?;
        if existing.as_ref() == Some(&member) {
            return Ok(None);
        }

        txn.set_member(&member)?;
        let previous_membership = match existing {
            Some(existing) => Some(existing.membership),
            // a lazy-loaded member was already in the room, it did not just join
            None if is_lazy_loaded => Some(member.membership.clone()),
            None => event
                .prev_content()
                .and_then(|prev| prev.get("membership"))
                .and_then(Value::as_str)
                .map(MembershipState::from),
        };
        debug!(
            "🔧 Member {} in {} is now {}",
            member.user_id,
            self.room_id,
            member.membership.as_str()
        );
        Ok(Some(MemberChange {
            member,
            previous_membership,
        }))
    }
}

#[async_trait]
impl MemberWriter for RoomMemberWriter {
    #[instrument(level = "debug", skip(self, event, txn), fields(room = %self.room_id, event = %event.event_id))]
    async fn write_state_member_event(
        &self,
        event: &RoomEvent,
        is_limited: bool,
        txn: &mut Transaction,
    ) -> Result<Option<MemberChange>> {
        self.write_member(event, !is_limited, txn).await
    }

    #[instrument(level = "debug", skip(self, event, txn), fields(room = %self.room_id, event = %event.event_id))]
    async fn write_timeline_member_event(
        &self,
        event: &RoomEvent,
        txn: &mut Transaction,
    ) -> Result<Option<MemberChange>> {
        self.write_member(event, false, txn).await
    }

    async fn lookup_member(
        &self,
        sender: &UserId,
        event: &RoomEvent,
        batch: &[RoomEvent],
        txn: &Transaction,
    ) -> Result<Option<RoomMember>> {
        if let Some(member) = txn.member(&self.room_id, sender)? {
            return Ok(Some(member));
        }

        // Members of a limited or lazy-loading sync may only be known from
        // member events earlier in the same batch.
        let is_sender_member_event = |candidate: &RoomEvent| {
            candidate.is_member_event() && candidate.state_key.as_deref() == Some(sender.as_str())
        };
        let member_event = if is_sender_member_event(event) {
            Some(event)
        } else {
            batch.iter().find(|candidate| is_sender_member_event(*candidate))
        };
        Ok(member_event.and_then(|member_event| self.member_from_event(member_event)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrixon_db::Database;
    use ruma::{room_id, user_id};
    use serde_json::json;
    use test_log::test;

    fn writer() -> RoomMemberWriter {
        RoomMemberWriter::new(room_id!("!room:example.org").to_owned())
    }

    fn member_event(event_id: &str, user: &str, content: Value, unsigned: Option<Value>) -> RoomEvent {
        let mut raw = json!({
            "event_id": event_id,
            "type": "m.room.member",
            "sender": user,
            "state_key": user,
            "content": content,
        });
        if let Some(unsigned) = unsigned {
            raw["unsigned"] = unsigned;
        }
        serde_json::from_value(raw).unwrap()
    }

    #[test(tokio::test)]
    async fn test_join_then_leave_reports_changes() {
        let db = Database::open_in_memory();
        let mut txn = db.transaction();
        let writer = writer();

        let join = member_event("$join", "@alice:example.org", json!({ "membership": "join", "displayname": "Alice" }), None);
        let change = writer.write_timeline_member_event(&join, &mut txn).await.unwrap().unwrap();
        assert!(change.has_joined());
        assert!(!change.has_left());
        assert_eq!(change.user_id().as_str(), "@alice:example.org");

        // repeating the same member event changes nothing
        assert!(writer.write_timeline_member_event(&join, &mut txn).await.unwrap().is_none());

        let leave = member_event(
            "$leave",
            "@alice:example.org",
            json!({ "membership": "leave" }),
            Some(json!({ "prev_content": { "membership": "join", "displayname": "Alice" } })),
        );
        let change = writer.write_timeline_member_event(&leave, &mut txn).await.unwrap().unwrap();
        assert!(change.has_left());
        assert_eq!(change.membership(), &MembershipState::Leave);
        assert_eq!(change.member.display_name.as_deref(), Some("Alice"));
    }

    #[test(tokio::test)]
    async fn test_lazy_loaded_member_is_not_a_join() {
        let db = Database::open_in_memory();
        let mut txn = db.transaction();
        let writer = writer();

        let bob = member_event("$bob", "@bob:example.org", json!({ "membership": "join" }), None);
        let change = writer.write_state_member_event(&bob, false, &mut txn).await.unwrap().unwrap();
        assert_eq!(change.previous_membership, Some(MembershipState::Join));
        assert!(!change.has_joined());

        let carol = member_event("$carol", "@carol:example.org", json!({ "membership": "join" }), None);
        let change = writer.write_state_member_event(&carol, true, &mut txn).await.unwrap().unwrap();
        assert!(change.has_joined());
    }

    #[test(tokio::test)]
    async fn test_lookup_prefers_store_then_batch() {
        let db = Database::open_in_memory();
        let mut txn = db.transaction();
        let writer = writer();
        let alice = user_id!("@alice:example.org");

        let message: RoomEvent = serde_json::from_value(json!({
            "event_id": "$msg",
            "type": "m.room.message",
            "sender": "@alice:example.org",
            "content": { "msgtype": "m.text", "body": "hi" }
        }))
        .unwrap();
        assert!(writer.lookup_member(alice, &message, &[message.clone()], &txn).await.unwrap().is_none());

        let join = member_event("$join", "@alice:example.org", json!({ "membership": "join", "displayname": "Alice" }), None);
        let batch = vec![join.clone(), message.clone()];
        let member = writer.lookup_member(alice, &message, &batch, &txn).await.unwrap().unwrap();
        assert_eq!(member.display_name.as_deref(), Some("Alice"));

        let rename = member_event("$rename", "@alice:example.org", json!({ "membership": "join", "displayname": "Alicia" }), None);
        writer.write_timeline_member_event(&rename, &mut txn).await.unwrap();
        let member = writer.lookup_member(alice, &message, &batch, &txn).await.unwrap().unwrap();
        assert_eq!(member.display_name.as_deref(), Some("Alicia"));
    }

    #[test]
    fn test_malformed_member_event() {
        let event = member_event("$bad", "@alice:example.org", json!({ "displayname": "no membership" }), None);
        assert!(writer().member_from_event(&event).is_none());
    }
}

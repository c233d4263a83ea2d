// =============================================================================
// Matrixon Matrix NextServer - Room Members Module
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
//   Stored membership and profile of each user in a room, backing the
//   historical display-name snapshots taken when events are written.
//
// Features:
//   • Member lookup by user id
//   • Per-room member listing
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
use ruma::{RoomId, UserId};

use super::{room_prefix, ROOM_MEMBERS};
use crate::{models::RoomMember, transaction::Transaction};

pub trait RoomMemberStore {
    fn member(&self, room_id: &RoomId, user_id: &UserId) -> Result<Option<RoomMember>>;

    fn set_member(&mut self, member: &RoomMember) -> Result<()>;

    fn members(&self, room_id: &RoomId) -> Result<Vec<RoomMember>>;
}

fn member_key(room_id: &RoomId, user_id: &UserId) -> Vec<u8> {
    let mut key = room_prefix(room_id);
    key.extend_from_slice(user_id.as_bytes());
    key
}

impl RoomMemberStore for Transaction {
    fn member(&self, room_id: &RoomId, user_id: &UserId) -> Result<Option<RoomMember>> {
        self.get_json(ROOM_MEMBERS, &member_key(room_id, user_id))
    }

    fn set_member(&mut self, member: &RoomMember) -> Result<()> {
        self.put_json(ROOM_MEMBERS, member_key(&member.room_id, &member.user_id), member)
    }

    fn members(&self, room_id: &RoomId) -> Result<Vec<RoomMember>> {
        self.scan_json(ROOM_MEMBERS, &room_prefix(room_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use ruma::{events::room::member::MembershipState, room_id, user_id};
    use test_log::test;

    #[test]
    fn test_member_roundtrip_per_room() {
        let db = Database::open_in_memory();
        let mut txn = db.transaction();
        let room_id = room_id!("!room:example.org");
        let alice = user_id!("@alice:example.org");

        txn.set_member(&RoomMember {
            room_id: room_id.to_owned(),
            user_id: alice.to_owned(),
            membership: MembershipState::Join,
            display_name: Some("Alice".to_owned()),
            avatar_url: None,
        })
        .unwrap();

        let member = txn.member(room_id, alice).unwrap().unwrap();
        assert_eq!(member.membership, MembershipState::Join);
        assert_eq!(member.display_name.as_deref(), Some("Alice"));
        assert!(txn.member(room_id!("!other:example.org"), alice).unwrap().is_none());
        assert_eq!(txn.members(room_id).unwrap().len(), 1);
    }
}

// =============================================================================
// Matrixon Matrix NextServer - Relation Writer Module
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
//   Aggregates reactions onto their targets and applies redactions to
//   stored events.
//
// Features:
//   • Annotation counting
//   • Redaction of stored events
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

use async_trait::async_trait;
use matrixon_common::Result;
use matrixon_core::{types::ANNOTATION_REL_TYPE, RoomEvent};
use matrixon_db::{EventStorageEntry, TimelineEventStore, Transaction};
use ruma::{events::TimelineEventType, EventId, OwnedUserId};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::{entries::EventEntry, fragment_id_comparer::FragmentOrder};

/// Aggregates relations (reactions, redactions) onto the entries they
/// target.
#[async_trait]
pub trait RelationWriter: Send + Sync {
    /// Applies the relation `entry` carries, if any. Returns the stored
    /// entries that changed as a result.
    async fn write_relation(
        &self,
        entry: &EventEntry,
        txn: &mut Transaction,
    ) -> Result<Option<Vec<EventEntry>>>;
}

/// [`RelationWriter`] keeping annotation counts and redactions of locally
/// stored events up to date.
#[derive(Clone, Debug, Default)]
pub struct RoomRelationWriter {
    own_user_id: Option<OwnedUserId>,
}

/// Content keys the redaction algorithm keeps, per event type
fn preserved_content_keys(kind: &TimelineEventType) -> &'static [&'static str] {
    match kind {
        TimelineEventType::RoomMember => &["membership", "join_authorised_via_users_server"],
        TimelineEventType::RoomCreate => &["creator"],
        TimelineEventType::RoomJoinRules => &["join_rule", "allow"],
        TimelineEventType::RoomPowerLevels => &[
            "ban",
            "events",
            "events_default",
            "invite",
            "kick",
            "redact",
            "state_default",
            "users",
            "users_default",
        ],
        TimelineEventType::RoomHistoryVisibility => &["history_visibility"],
        _ => &[],
    }
}

impl RoomRelationWriter {
    pub fn new(own_user_id: Option<OwnedUserId>) -> Self {
        Self { own_user_id }
    }

    fn is_own(&self, event: &RoomEvent) -> bool {
        self.own_user_id.as_deref() == Some(&*event.sender)
    }

    fn add_annotation(&self, target: &mut EventStorageEntry, key: &str, annotation: &RoomEvent) {
        let aggregated = target.annotations.entry(key.to_owned()).or_default();
        aggregated.count += 1;
        aggregated.me |= self.is_own(annotation);
        aggregated.first_timestamp = match (aggregated.first_timestamp, annotation.origin_server_ts) {
            (Some(first), Some(ts)) => Some(first.min(ts)),
            (first, ts) => first.or(ts),
        };
    }

    fn remove_annotation(&self, target: &mut EventStorageEntry, key: &str, annotation: &RoomEvent) {
        let Some(aggregated) = target.annotations.get_mut(key) else {
            return;
        };
        aggregated.count = aggregated.count.saturating_sub(1);
        if self.is_own(annotation) {
            aggregated.me = false;
        }
        if aggregated.count == 0 {
            target.annotations.remove(key);
        }
    }

    /// Strips `target` down to what the redaction algorithm keeps and records
    /// the redaction in `unsigned.redacted_because`.
    fn redact(target: &mut EventStorageEntry, redaction: &RoomEvent) -> Result<()> {
        let keep = preserved_content_keys(&target.event.kind);
        let content = match target.event.content.take() {
            Value::Object(content) => content
                .into_iter()
                .filter(|(key, _)| keep.contains(&key.as_str()))
                .collect(),
            _ => Map::new(),
        };
        target.event.content = Value::Object(content);

        let mut unsigned = match target.event.unsigned.take() {
            Some(Value::Object(unsigned)) => unsigned,
            _ => Map::new(),
        };
        unsigned.insert("redacted_because".to_owned(), serde_json::to_value(redaction)?);
        target.event.unsigned = Some(Value::Object(unsigned));
        Ok(())
    }

    fn write_annotation(&self, entry: &EventEntry, txn: &mut Transaction) -> Result<Option<Vec<EventEntry>>> {
        let Some(relates_to) = entry.event().relates_to() else {
            return Ok(None);
        };
        let (Some(ANNOTATION_REL_TYPE), Some(key)) =
            (relates_to.rel_type.as_deref(), relates_to.key.as_deref())
        else {
            return Ok(None);
        };
        let Some(mut target) = txn.event_by_id(entry.room_id(), &relates_to.event_id)? else {
            debug!("🔧 Annotation target {} is not stored locally", relates_to.event_id);
            return Ok(None);
        };

        self.add_annotation(&mut target, key, entry.event());
        txn.update_event(&target)?;
        Ok(Some(vec![EventEntry::new(target, entry.order().clone())]))
    }

    fn write_redaction(
        &self,
        entry: &EventEntry,
        redacted_id: &EventId,
        txn: &mut Transaction,
    ) -> Result<Option<Vec<EventEntry>>> {
        let Some(mut target) = txn.event_by_id(entry.room_id(), redacted_id)? else {
            debug!("🔧 Redacted event {} is not stored locally", redacted_id);
            return Ok(None);
        };
        let order: &Arc<dyn FragmentOrder> = entry.order();
        let mut updated = Vec::with_capacity(2);

        // A redacted reaction no longer counts towards its target. Read the
        // relation before the content is stripped.
        if target.event.kind == TimelineEventType::Reaction {
            if let Some(relates_to) = target.event.relates_to() {
                if let (Some(ANNOTATION_REL_TYPE), Some(key)) =
                    (relates_to.rel_type.as_deref(), relates_to.key.as_deref())
                {
                    if let Some(mut annotated) = txn.event_by_id(entry.room_id(), &relates_to.event_id)? {
                        self.remove_annotation(&mut annotated, key, &target.event);
                        txn.update_event(&annotated)?;
                        updated.push(EventEntry::new(annotated, order.clone()));
                    }
                }
            }
        }

        Self::redact(&mut target, entry.event())?;
        txn.update_event(&target)?;
        updated.push(EventEntry::new(target, order.clone()));
        Ok(Some(updated))
    }
}

#[async_trait]
impl RelationWriter for RoomRelationWriter {
    #[instrument(level = "debug", skip(self, entry, txn), fields(event = %entry.event_id()))]
    async fn write_relation(
        &self,
        entry: &EventEntry,
        txn: &mut Transaction,
    ) -> Result<Option<Vec<EventEntry>>> {
        if let Some(redacted_id) = entry.event().redacted_event_id() {
            return self.write_redaction(entry, &redacted_id, txn);
        }
        self.write_annotation(entry, txn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::timeline::FragmentIdComparer;
    use matrixon_db::Database;
    use ruma::{event_id, room_id, user_id};
    use serde_json::json;
    use test_log::test;

    fn store(txn: &mut Transaction, index: u32, raw: Value) -> EventEntry {
        let event: RoomEvent = serde_json::from_value(raw).unwrap();
        let storage = EventStorageEntry::new(room_id!("!room:example.org").to_owned(), 0, index, event);
        txn.insert_event(&storage).unwrap();
        EventEntry::new(storage, Arc::new(FragmentIdComparer::new()))
    }

    fn message(txn: &mut Transaction) -> EventEntry {
        store(
            txn,
            1,
            json!({
                "event_id": "$msg",
                "type": "m.room.message",
                "sender": "@alice:example.org",
                "origin_server_ts": 1000,
                "content": { "msgtype": "m.text", "body": "hello" }
            }),
        )
    }

    fn reaction(txn: &mut Transaction, index: u32, event_id: &str, sender: &str, ts: u64) -> EventEntry {
        store(
            txn,
            index,
            json!({
                "event_id": event_id,
                "type": "m.reaction",
                "sender": sender,
                "origin_server_ts": ts,
                "content": {
                    "m.relates_to": { "rel_type": "m.annotation", "event_id": "$msg", "key": "👍" }
                }
            }),
        )
    }

    #[test(tokio::test)]
    async fn test_reactions_are_counted() {
        let db = Database::open_in_memory();
        let mut txn = db.transaction();
        let writer = RoomRelationWriter::new(Some(user_id!("@alice:example.org").to_owned()));
        message(&mut txn);

        let first = reaction(&mut txn, 2, "$r1", "@bob:example.org", 3000);
        let updated = writer.write_relation(&first, &mut txn).await.unwrap().unwrap();
        assert_eq!(updated[0].event_id().as_str(), "$msg");

        let second = reaction(&mut txn, 3, "$r2", "@alice:example.org", 2000);
        writer.write_relation(&second, &mut txn).await.unwrap();

        let target = txn.event_by_id(room_id!("!room:example.org"), event_id!("$msg")).unwrap().unwrap();
        let annotation = &target.annotations["👍"];
        assert_eq!(annotation.count, 2);
        assert!(annotation.me);
        assert_eq!(annotation.first_timestamp.map(|ts| u64::from(ts.0)), Some(2000));
    }

    #[test(tokio::test)]
    async fn test_redaction_strips_content() {
        let db = Database::open_in_memory();
        let mut txn = db.transaction();
        let writer = RoomRelationWriter::default();
        message(&mut txn);

        let redaction = store(
            &mut txn,
            2,
            json!({
                "event_id": "$redaction",
                "type": "m.room.redaction",
                "sender": "@alice:example.org",
                "redacts": "$msg",
                "content": {}
            }),
        );
        let updated = writer.write_relation(&redaction, &mut txn).await.unwrap().unwrap();
        assert_eq!(updated.len(), 1);

        let target = txn.event_by_id(room_id!("!room:example.org"), event_id!("$msg")).unwrap().unwrap();
        assert_eq!(target.event.content, json!({}));
        assert_eq!(
            target.event.unsigned.unwrap()["redacted_because"]["event_id"],
            "$redaction"
        );
    }

    #[test(tokio::test)]
    async fn test_redacting_a_reaction_decrements_its_target() {
        let db = Database::open_in_memory();
        let mut txn = db.transaction();
        let writer = RoomRelationWriter::default();
        message(&mut txn);
        let r1 = reaction(&mut txn, 2, "$r1", "@bob:example.org", 3000);
        writer.write_relation(&r1, &mut txn).await.unwrap();

        let redaction = store(
            &mut txn,
            3,
            json!({
                "event_id": "$redaction",
                "type": "m.room.redaction",
                "sender": "@bob:example.org",
                "content": { "redacts": "$r1" }
            }),
        );
        let updated = writer.write_relation(&redaction, &mut txn).await.unwrap().unwrap();
        let ids: Vec<_> = updated.iter().map(|entry| entry.event_id().as_str()).collect();
        assert_eq!(ids, vec!["$msg", "$r1"]);

        let target = txn.event_by_id(room_id!("!room:example.org"), event_id!("$msg")).unwrap().unwrap();
        assert!(target.annotations.is_empty());
    }

    #[test(tokio::test)]
    async fn test_unknown_targets_and_plain_events_are_ignored() {
        let db = Database::open_in_memory();
        let mut txn = db.transaction();
        let writer = RoomRelationWriter::default();

        let orphan = reaction(&mut txn, 1, "$r1", "@bob:example.org", 1000);
        assert!(writer.write_relation(&orphan, &mut txn).await.unwrap().is_none());

        let plain = message(&mut txn);
        assert!(writer.write_relation(&plain, &mut txn).await.unwrap().is_none());
    }
}

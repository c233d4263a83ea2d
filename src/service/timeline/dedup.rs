// =============================================================================
// Matrixon Matrix NextServer - Deduplication Module
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
//   Filters duplicate events out of a single sync batch.
//
// Features:
//   • First occurrence wins
//   • Order preserving
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

use std::collections::HashSet;

use matrixon_core::RoomEvent;
use tracing::warn;

/// Drops events whose id already occurred earlier in the batch, keeping
/// the first occurrence and the relative order of the rest.
pub fn deduplicate_events(events: &[RoomEvent]) -> Vec<RoomEvent> {
    let mut seen = HashSet::with_capacity(events.len());
    let mut unique = Vec::with_capacity(events.len());
    for event in events {
        if seen.insert(event.event_id.as_str()) {
            unique.push(event.clone());
        } else {
            warn!("⚠️ Dropping duplicate event {} from sync batch", event.event_id);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_log::test;

    fn message(event_id: &str, body: &str) -> RoomEvent {
        serde_json::from_value(json!({
            "event_id": event_id,
            "type": "m.room.message",
            "sender": "@alice:example.org",
            "content": { "msgtype": "m.text", "body": body }
        }))
        .unwrap()
    }

    #[test]
    fn test_first_occurrence_wins() {
        let events = vec![
            message("$a", "first"),
            message("$b", "b"),
            message("$a", "second"),
            message("$c", "c"),
            message("$b", "b again"),
        ];

        let deduplicated = deduplicate_events(&events);
        let ids: Vec<_> = deduplicated.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["$a", "$b", "$c"]);
        assert_eq!(deduplicated[0].content["body"], "first");
    }

    #[test]
    fn test_empty_batch() {
        assert!(deduplicate_events(&[]).is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::prelude::v1::test;

        proptest! {
            #[test]
            fn first_seen_order_is_kept(ids in prop::collection::vec(0u8..10, 0..40)) {
                let events: Vec<_> = ids.iter().map(|id| message(&format!("$e{id}"), "body")).collect();
                let deduplicated = deduplicate_events(&events);

                let mut expected: Vec<String> = Vec::new();
                for id in &ids {
                    let event_id = format!("$e{id}");
                    if !expected.contains(&event_id) {
                        expected.push(event_id);
                    }
                }
                let actual: Vec<String> = deduplicated.iter().map(|e| e.event_id.to_string()).collect();
                prop_assert_eq!(actual, expected);
            }
        }
    }
}

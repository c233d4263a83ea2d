// =============================================================================
// Matrixon Matrix NextServer - Timeline Module
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
//   Timeline sync writing: event keys, fragment boundaries, deduplication,
//   membership snapshots and relation aggregation.
//
// Features:
//   • Sync writer
//   • Fragment boundary manager
//   • Member and relation writers
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

mod dedup;
mod entries;
mod event_key;
mod fragment_boundary;
mod fragment_id_comparer;
mod member_writer;
mod relation_writer;
mod sync_writer;

pub use dedup::deduplicate_events;
pub use entries::{EventEntry, FragmentBoundaryEntry, TimelineEntry};
pub use event_key::{EventKey, MIDDLE, MIN_FRAGMENT_ID};
pub use fragment_boundary::FragmentBoundaryManager;
pub use fragment_id_comparer::{FragmentIdComparer, FragmentOrder};
pub use member_writer::{MemberChange, MemberWriter, RoomMemberWriter};
pub use relation_writer::{RelationWriter, RoomRelationWriter};
pub use sync_writer::{SyncWriteResult, SyncWriter};

// =============================================================================
// Matrixon Matrix NextServer - Library Crate
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
//   Client-side Matrix timeline sync writer: appends incremental sync
//   responses to a local, paginatable timeline store.
//
// Features:
//   • Fragment-based timeline storage
//   • Gap detection and fragment linking
//   • Historical sender profiles
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

pub mod clap;
pub mod service;

// Re-export common types
pub use ruma;
pub use tracing;

// Re-export workspace crates
pub use matrixon_common as common;
pub use matrixon_core as core;
pub use matrixon_db as db;

pub use matrixon_common::{MatrixonError, Result};
pub use service::timeline::{
    EventEntry, EventKey, FragmentBoundaryEntry, FragmentIdComparer, FragmentOrder, MemberChange,
    MemberWriter, RelationWriter, RoomMemberWriter, RoomRelationWriter, SyncWriteResult, SyncWriter,
    TimelineEntry,
};

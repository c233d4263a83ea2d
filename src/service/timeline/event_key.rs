// =============================================================================
// Matrixon Matrix NextServer - Event Key Module
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
//   Comparable position of an entry within a room's timeline.
//
// Features:
//   • Fragment id and event index ordering
//   • Live and fragment start keys
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

use std::fmt;

use serde::{Deserialize, Serialize};

/// First fragment id of a room.
pub const MIN_FRAGMENT_ID: u32 = 0;

/// Index a fragment starts at, leaving room to grow in both directions:
/// sync appends after it, back-pagination prepends before it.
pub const MIDDLE: u32 = 0x8000_0000;

/// Position of an entry in a room's timeline.
///
/// Keys order by fragment id, then by event index. Within one fragment that
/// order is the timeline order; across fragments only the fragment order
/// comparer knows the real order, the numeric id is a creation sequence.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub fragment_id: u32,
    pub event_index: u32,
}

impl EventKey {
    pub const fn new(fragment_id: u32, event_index: u32) -> Self {
        Self {
            fragment_id,
            event_index,
        }
    }

    /// Key of the first event of a room that has never been synced
    pub const fn default_live_key() -> Self {
        Self::default_fragment_key(MIN_FRAGMENT_ID)
    }

    pub const fn default_fragment_key(fragment_id: u32) -> Self {
        Self::new(fragment_id, MIDDLE)
    }

    pub fn next_key(&self) -> Self {
        Self::new(self.fragment_id, self.event_index + 1)
    }

    /// Start key of the fragment that replaces this key's fragment after a
    /// gap.
    pub fn next_fragment_key(&self) -> Self {
        Self::default_fragment_key(self.fragment_id + 1)
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}]", self.fragment_id, self.event_index)
    }
}

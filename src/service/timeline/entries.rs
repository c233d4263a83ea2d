// =============================================================================
// Matrixon Matrix NextServer - Timeline Entries Module
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
//   Timeline entries handed back to callers: stored events and fragment
//   boundaries, comparable across linked fragments.
//
// Features:
//   • Event entries with profile snapshots
//   • Fragment start/end boundaries with pagination tokens
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

use std::{cmp::Ordering, collections::BTreeMap, fmt, sync::Arc};

use matrixon_common::Result;
use matrixon_core::RoomEvent;
use matrixon_db::{Annotation, EventStorageEntry, Fragment};
use ruma::{EventId, RoomId};

use super::{event_key::EventKey, fragment_id_comparer::FragmentOrder};

/// Stored timeline event bound to the fragment order it is compared with.
#[derive(Clone)]
pub struct EventEntry {
    storage: EventStorageEntry,
    order: Arc<dyn FragmentOrder>,
}

impl EventEntry {
    pub fn new(storage: EventStorageEntry, order: Arc<dyn FragmentOrder>) -> Self {
        Self { storage, order }
    }

    pub fn key(&self) -> EventKey {
        EventKey::new(self.storage.fragment_id, self.storage.event_index)
    }

    pub fn room_id(&self) -> &RoomId {
        &self.storage.room_id
    }

    pub fn event(&self) -> &RoomEvent {
        &self.storage.event
    }

    pub fn event_id(&self) -> &EventId {
        &self.storage.event.event_id
    }

    /// Sender display name at the time the event was written
    pub fn display_name(&self) -> Option<&str> {
        self.storage.display_name.as_deref()
    }

    pub fn avatar_url(&self) -> Option<&str> {
        self.storage.avatar_url.as_deref()
    }

    pub fn annotations(&self) -> &BTreeMap<String, Annotation> {
        &self.storage.annotations
    }

    pub(crate) fn order(&self) -> &Arc<dyn FragmentOrder> {
        &self.order
    }
}

impl fmt::Debug for EventEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEntry")
            .field("key", &self.key())
            .field("event_id", &self.storage.event.event_id)
            .field("type", &self.storage.event.kind)
            .finish_non_exhaustive()
    }
}

/// Start or end of a fragment. Boundaries sort before (start) or after
/// (end) every event of their fragment and carry the pagination token for
/// their side.
#[derive(Clone)]
pub struct FragmentBoundaryEntry {
    fragment: Fragment,
    is_fragment_start: bool,
    order: Arc<dyn FragmentOrder>,
}

impl FragmentBoundaryEntry {
    pub fn start(fragment: Fragment, order: Arc<dyn FragmentOrder>) -> Self {
        Self {
            fragment,
            is_fragment_start: true,
            order,
        }
    }

    pub fn end(fragment: Fragment, order: Arc<dyn FragmentOrder>) -> Self {
        Self {
            fragment,
            is_fragment_start: false,
            order,
        }
    }

    pub fn is_fragment_start(&self) -> bool {
        self.is_fragment_start
    }

    pub fn is_fragment_end(&self) -> bool {
        !self.is_fragment_start
    }

    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    pub fn key(&self) -> EventKey {
        let event_index = if self.is_fragment_start { u32::MIN } else { u32::MAX };
        EventKey::new(self.fragment.id, event_index)
    }

    /// Token to paginate from this boundary into the gap beyond it
    pub fn token(&self) -> Option<&str> {
        if self.is_fragment_start {
            self.fragment.previous_token.as_deref()
        } else {
            self.fragment.next_token.as_deref()
        }
    }
}

impl fmt::Debug for FragmentBoundaryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentBoundaryEntry")
            .field("key", &self.key())
            .field("start", &self.is_fragment_start)
            .field("token", &self.token())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub enum TimelineEntry {
    Event(EventEntry),
    FragmentBoundary(FragmentBoundaryEntry),
}

impl TimelineEntry {
    pub fn key(&self) -> EventKey {
        match self {
            Self::Event(entry) => entry.key(),
            Self::FragmentBoundary(entry) => entry.key(),
        }
    }

    pub fn as_event(&self) -> Option<&EventEntry> {
        match self {
            Self::Event(entry) => Some(entry),
            Self::FragmentBoundary(_) => None,
        }
    }

    pub fn as_fragment_boundary(&self) -> Option<&FragmentBoundaryEntry> {
        match self {
            Self::Event(_) => None,
            Self::FragmentBoundary(entry) => Some(entry),
        }
    }

    fn order(&self) -> &Arc<dyn FragmentOrder> {
        match self {
            Self::Event(entry) => &entry.order,
            Self::FragmentBoundary(entry) => &entry.order,
        }
    }

    /// Timeline order of two entries of the same room. Within a fragment
    /// the event index decides; across fragments the fragment order does,
    /// which fails for fragments that are not linked.
    pub fn compare(&self, other: &TimelineEntry) -> Result<Ordering> {
        let (a, b) = (self.key(), other.key());
        if a.fragment_id == b.fragment_id {
            return Ok(a.event_index.cmp(&b.event_index));
        }
        self.order().compare(a.fragment_id, b.fragment_id)
    }
}

// =============================================================================
// Matrixon Matrix NextServer - Fragment Id Comparer Module
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
//   Tracks the links between fragments of a room and orders fragment ids
//   by timeline position.
//
// Features:
//   • Append/prepend links
//   • Island detection
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

use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{RwLock, RwLockWriteGuard},
};

use matrixon_common::{MatrixonError, Result};
use matrixon_db::Fragment;
use tracing::debug;

/// Relative order of a room's fragments.
///
/// Fragment ids only record creation order; a fragment created later by
/// back-pagination sits before older ones. Implementations track the
/// links between fragments and answer order queries from them.
pub trait FragmentOrder: Send + Sync {
    /// Registers a fragment together with the links it already has
    fn add(&self, fragment: &Fragment) -> Result<()>;

    /// Records that `new_id` directly follows `after_id`
    fn append(&self, new_id: u32, after_id: u32) -> Result<()>;

    /// Records that `new_id` directly precedes `before_id`
    fn prepend(&self, new_id: u32, before_id: u32) -> Result<()>;

    fn compare(&self, a: u32, b: u32) -> Result<Ordering>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Link {
    previous: Option<u32>,
    next: Option<u32>,
}

/// In-memory [`FragmentOrder`] over the fragment links of one room.
#[derive(Debug, Default)]
pub struct FragmentIdComparer {
    links: RwLock<HashMap<u32, Link>>,
}

impl FragmentIdComparer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the comparer with the fragments already in storage
    pub fn from_fragments(fragments: &[Fragment]) -> Result<Self> {
        let comparer = Self::new();
        for fragment in fragments {
            comparer.add(fragment)?;
        }
        debug!("🔧 Seeded fragment comparer with {} fragments", fragments.len());
        Ok(comparer)
    }

    fn write_links(&self) -> Result<RwLockWriteGuard<'_, HashMap<u32, Link>>> {
        self.links
            .write()
            .map_err(|_| MatrixonError::invalid_state("fragment comparer lock poisoned"))
    }

    /// Follows `step` links starting at `from`; `true` if `to` is reached
    fn reaches(links: &HashMap<u32, Link>, from: u32, to: u32, step: fn(&Link) -> Option<u32>) -> bool {
        let mut current = from;
        // A chain can never be longer than the number of known fragments,
        // which also stops a corrupt cycle.
        for _ in 0..links.len() {
            match links.get(&current).and_then(step) {
                Some(next) if next == to => return true,
                Some(next) => current = next,
                None => return false,
            }
        }
        false
    }
}

impl FragmentOrder for FragmentIdComparer {
    fn add(&self, fragment: &Fragment) -> Result<()> {
        let mut links = self.write_links()?;
        links.insert(
            fragment.id,
            Link {
                previous: fragment.previous_id,
                next: fragment.next_id,
            },
        );
        if let Some(previous) = fragment.previous_id {
            links.entry(previous).or_default().next = Some(fragment.id);
        }
        if let Some(next) = fragment.next_id {
            links.entry(next).or_default().previous = Some(fragment.id);
        }
        Ok(())
    }

    fn append(&self, new_id: u32, after_id: u32) -> Result<()> {
        let mut links = self.write_links()?;
        links.entry(new_id).or_default().previous = Some(after_id);
        links.entry(after_id).or_default().next = Some(new_id);
        Ok(())
    }

    fn prepend(&self, new_id: u32, before_id: u32) -> Result<()> {
        let mut links = self.write_links()?;
        links.entry(new_id).or_default().next = Some(before_id);
        links.entry(before_id).or_default().previous = Some(new_id);
        Ok(())
    }

    fn compare(&self, a: u32, b: u32) -> Result<Ordering> {
        if a == b {
            return Ok(Ordering::Equal);
        }
        let links = self
            .links
            .read()
            .map_err(|_| MatrixonError::invalid_state("fragment comparer lock poisoned"))?;

        if Self::reaches(&links, a, b, |link| link.next) {
            Ok(Ordering::Less)
        } else if Self::reaches(&links, a, b, |link| link.previous) {
            Ok(Ordering::Greater)
        } else {
            Err(MatrixonError::invalid_state(format!(
                "fragments {a} and {b} are not linked"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruma::room_id;
    use test_log::test;

    fn fragment(id: u32, previous_id: Option<u32>, next_id: Option<u32>) -> Fragment {
        Fragment {
            room_id: room_id!("!room:example.org").to_owned(),
            id,
            previous_id,
            next_id,
            previous_token: None,
            next_token: None,
        }
    }

    #[test]
    fn test_append_orders_after() {
        let comparer = FragmentIdComparer::new();
        comparer.add(&fragment(0, None, None)).unwrap();
        comparer.add(&fragment(1, None, None)).unwrap();
        comparer.append(1, 0).unwrap();
        comparer.append(2, 1).unwrap();

        assert_eq!(comparer.compare(0, 2).unwrap(), Ordering::Less);
        assert_eq!(comparer.compare(2, 0).unwrap(), Ordering::Greater);
        assert_eq!(comparer.compare(1, 1).unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_prepend_orders_before_lower_ids() {
        let comparer = FragmentIdComparer::new();
        comparer.add(&fragment(0, None, None)).unwrap();
        // fragment 5 was created later by back-pagination
        comparer.prepend(5, 0).unwrap();

        assert_eq!(comparer.compare(5, 0).unwrap(), Ordering::Less);
        assert_eq!(comparer.compare(0, 5).unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_unlinked_islands_are_an_error() {
        let comparer = FragmentIdComparer::from_fragments(&[
            fragment(0, None, Some(1)),
            fragment(1, Some(0), None),
            fragment(7, None, None),
        ])
        .unwrap();

        assert_eq!(comparer.compare(0, 1).unwrap(), Ordering::Less);
        assert!(matches!(comparer.compare(0, 7), Err(MatrixonError::InvalidState(_))));
    }
}

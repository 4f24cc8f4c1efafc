//! Victim/spared classification for a single instance
//!
//! Pure logic: the cutoff and immunity set are passed in, never read from
//! the environment or the clock, so classification is exhaustively
//! testable.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// One instance as reported by the inventory, read-only for the core.
#[derive(Debug, Clone)]
pub struct InstanceRecord {
    /// EC2 instance id
    pub id: String,
    /// Launch timestamp (UTC)
    pub launch_time: DateTime<Utc>,
    /// Tags as received; keys keep their original casing
    pub tags: HashMap<String, String>,
}

/// Outcome of classifying a single instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Past the cutoff and not immune: selected for termination
    Victim,
    /// Too young, or exempted by an immunity tag
    Spared,
}

/// Classify an instance against the cutoff and immunity set.
///
/// An instance is a victim iff it launched strictly before the cutoff and
/// none of its tag keys, lower-cased, appear in `immunity_tags`. An
/// instance launched exactly at the cutoff is spared. Tag values are
/// irrelevant: the presence of a matching key alone grants immunity.
pub fn classify(
    instance: &InstanceRecord,
    cutoff: DateTime<Utc>,
    immunity_tags: &HashSet<String>,
) -> Classification {
    let immune = instance
        .tags
        .keys()
        .any(|key| immunity_tags.contains(&key.to_lowercase()));

    if instance.launch_time < cutoff && !immune {
        Classification::Victim
    } else {
        Classification::Spared
    }
}

//! Error taxonomy for a reaper run
//!
//! Configuration problems never surface (they degrade to defaults in
//! [`crate::config`]); protection-disable failures are logged per victim
//! and swallowed. Only the two run-aborting cases are typed here.

use thiserror::Error;

/// Fatal failures that abort a run.
#[derive(Debug, Error)]
pub enum ReaperError {
    /// Listing the inventory failed. Victims accumulated so far are
    /// discarded: a partial victim list is unsafe to act on.
    #[error("instance inventory failed")]
    Inventory(#[source] anyhow::Error),

    /// The batched terminate call failed. Logged before propagation, never
    /// retried by the core.
    #[error("instance termination failed")]
    Termination(#[source] anyhow::Error),
}

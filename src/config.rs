//! Settings resolution from environment-style configuration
//!
//! Resolution never fails: every missing or malformed value degrades to a
//! safe default (dry-run on, wide age window, no protection override).

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Environment variable enabling/disabling dry-run mode
pub const DRY_RUN_VAR: &str = "REAPER_DRY_RUN";

/// Environment variable holding the maximum instance age in days
pub const MAX_AGE_DAYS_VAR: &str = "REAPER_MAX_AGE_DAYS";

/// Environment variable holding the comma-separated immunity tag keys
pub const IMMUNITY_TAGS_VAR: &str = "REAPER_IMMUNITY_TAGS";

/// Environment variable enabling the termination-protection override
pub const IGNORE_TERMINATION_PROTECTION_VAR: &str = "REAPER_IGNORE_TERMINATION_PROTECTION";

/// Age threshold applied when [`MAX_AGE_DAYS_VAR`] is absent or unparsable
pub const DEFAULT_MAX_AGE_DAYS: u32 = 180;

/// Read-only key/value lookup backing settings resolution.
///
/// The sole interface to configuration storage, so tests can resolve
/// settings from a plain map instead of mutating process environment.
pub trait ConfigSource {
    fn get(&self, name: &str) -> Option<String>;
}

/// Process environment backed [`ConfigSource`].
///
/// A variable set to the empty string is treated the same as an unset one.
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

/// Resolved run settings, immutable for the duration of one run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Report victims without terminating anything
    pub dry_run: bool,
    /// Day count the cutoff was derived from (kept for logging)
    pub max_age_days: u32,
    /// Instances launched strictly before this timestamp are candidates
    pub cutoff: DateTime<Utc>,
    /// Lower-cased tag keys whose presence exempts an instance
    pub immunity_tags: HashSet<String>,
    /// Disable EC2 API termination protection on victims before terminating
    pub ignore_termination_protection: bool,
}

impl Settings {
    /// Resolve settings from a configuration source.
    ///
    /// The cutoff is computed here, at resolution time, so a fresh
    /// resolution per run always reflects the current clock. A day count
    /// too large for the timestamp range saturates to the earliest
    /// representable instant, which spares everything of any real age.
    pub fn resolve(source: &impl ConfigSource) -> Self {
        let max_age_days = parse_max_age_days(source.get(MAX_AGE_DAYS_VAR));
        let cutoff = Utc::now()
            .checked_sub_signed(Duration::days(i64::from(max_age_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self {
            dry_run: parse_bool(source.get(DRY_RUN_VAR), true),
            max_age_days,
            cutoff,
            immunity_tags: parse_immunity_tags(source.get(IMMUNITY_TAGS_VAR)),
            ignore_termination_protection: parse_bool(
                source.get(IGNORE_TERMINATION_PROTECTION_VAR),
                false,
            ),
        }
    }
}

/// Parse a boolean-like configuration value.
///
/// Anything present that is not case-insensitively `"false"` counts as
/// true, so numeric strings like `"1"`, `"0"`, and `"-1"` all resolve to
/// true. This matches the long-standing behavior pinned by the tests; it
/// errs toward dry-run for the [`DRY_RUN_VAR`] flag.
fn parse_bool(raw: Option<String>, default: bool) -> bool {
    match raw {
        Some(value) => !value.eq_ignore_ascii_case("false"),
        None => default,
    }
}

/// Parse the maximum age in days, falling back to [`DEFAULT_MAX_AGE_DAYS`].
///
/// Negative or non-numeric values are rejected by the `u32` parse and fall
/// back to the default.
fn parse_max_age_days(raw: Option<String>) -> u32 {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_MAX_AGE_DAYS)
}

/// Parse the comma-separated immunity tag list into a lower-cased set.
fn parse_immunity_tags(raw: Option<String>) -> HashSet<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(|token| token.trim().to_lowercase())
            .filter(|token| !token.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

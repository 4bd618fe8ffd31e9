//! The scheduling decision applied to a URL's metadata after every fetch.
//!
//! `backoff_hours = clamp(delta_hours * backoff_multiplier, 1, 24*30)`
//! `backoff_minutes = max(15, backoff_hours * 60)`, capped at `24*60*30`
//! `expected_next_fetch = now + backoff_minutes`
//!
//! If the content hash changed, the multiplier resets to 1 and
//! `previous_change_time` advances to `now`; otherwise it doubles, capped at
//! 8.

use super::UrlMetadata;
use chrono::{DateTime, Duration, Utc};

const MAX_BACKOFF_MULTIPLIER: u32 = 8;
const MIN_BACKOFF_HOURS: f64 = 1.0;
const MAX_BACKOFF_HOURS: f64 = 24.0 * 30.0;
const MIN_BACKOFF_MINUTES: f64 = 15.0;
const MAX_BACKOFF_MINUTES: f64 = 24.0 * 60.0 * 30.0;

/// Mutates `metadata` in place per the scheduling policy and returns nothing;
/// callers read the fields back off the same struct.
pub fn apply_after_crawl(metadata: &mut UrlMetadata, new_hash: &str, now: DateTime<Utc>) {
    let changed = metadata
        .content_hash
        .as_deref()
        .map(|existing| existing != new_hash)
        .unwrap_or(true);

    if changed {
        metadata.backoff_multiplier = 1;
        metadata.previous_change_time = Some(now);
    } else {
        metadata.backoff_multiplier = (metadata.backoff_multiplier * 2).min(MAX_BACKOFF_MULTIPLIER);
    }

    metadata.content_hash = Some(new_hash.to_string());
    metadata.fetch_count += 1;
    metadata.last_fetch_time = Some(now);
    metadata.expected_next_fetch = next_schedule(metadata, now);
    metadata.change_frequency = estimate_change_frequency(metadata);
}

/// Computes `expected_next_fetch` for the current multiplier and
/// `previous_change_time`, without mutating anything.
pub fn next_schedule(metadata: &UrlMetadata, now: DateTime<Utc>) -> DateTime<Utc> {
    let since_change = metadata.previous_change_time.unwrap_or(now);
    let delta_hours = (now - since_change).num_seconds().max(0) as f64 / 3600.0;

    let backoff_hours =
        (delta_hours * metadata.backoff_multiplier as f64).clamp(MIN_BACKOFF_HOURS, MAX_BACKOFF_HOURS);
    let backoff_minutes = (backoff_hours * 60.0).max(MIN_BACKOFF_MINUTES).min(MAX_BACKOFF_MINUTES);

    now + Duration::minutes(backoff_minutes as i64)
}

/// Frontier-comparator priority derived from the same record: overdue URLs
/// get priority growing with how overdue they are, not-yet-due URLs decay
/// from 1.0 toward a 0.1 floor as their due time recedes past a 24-hour
/// horizon.
pub fn priority_for(metadata: &UrlMetadata, now: DateTime<Utc>) -> f64 {
    if now >= metadata.expected_next_fetch {
        let overdue_hours = (now - metadata.expected_next_fetch).num_seconds().max(0) as f64 / 3600.0;
        1.0 + overdue_hours
    } else {
        let until_due_hours = (metadata.expected_next_fetch - now).num_seconds().max(0) as f64 / 3600.0;
        let fraction = (until_due_hours / 24.0).min(1.0);
        1.0 - fraction * 0.9
    }
}

/// Approximates changes/day from the current backoff interval: a tighter
/// backoff implies a more frequently changing page.
fn estimate_change_frequency(metadata: &UrlMetadata) -> f64 {
    let minutes = (metadata.expected_next_fetch - metadata.last_fetch_time.unwrap_or(Utc::now()))
        .num_seconds()
        .max(60) as f64
        / 60.0;
    (24.0 * 60.0) / minutes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(now: DateTime<Utc>) -> UrlMetadata {
        UrlMetadata {
            last_fetch_time: None,
            previous_change_time: None,
            expected_next_fetch: now,
            content_hash: None,
            backoff_multiplier: 1,
            fetch_count: 0,
            change_frequency: 0.0,
            temp_failure_count: 0,
        }
    }

    #[test]
    fn first_crawl_floors_at_minimum_backoff() {
        let now = Utc::now();
        let mut meta = fresh(now);
        apply_after_crawl(&mut meta, "abc", now);
        // delta_hours is ~0, so backoff_hours clamps to the 1-hour floor,
        // giving a 60-minute schedule (above the 15-minute floor).
        let gap = meta.expected_next_fetch - now;
        assert_eq!(gap.num_minutes(), 60);
    }

    #[test]
    fn multiplier_is_always_a_power_of_two_up_to_cap() {
        let now = Utc::now();
        let mut meta = fresh(now);
        apply_after_crawl(&mut meta, "abc", now);
        let mut t = now;
        let mut seen = vec![meta.backoff_multiplier];
        for _ in 0..6 {
            t = t + Duration::hours(48);
            apply_after_crawl(&mut meta, "abc", t);
            seen.push(meta.backoff_multiplier);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 8, 8, 8]);
    }

    #[test]
    fn overdue_priority_grows_with_hours_overdue() {
        let now = Utc::now();
        let mut meta = fresh(now);
        meta.expected_next_fetch = now - Duration::hours(3);
        assert_eq!(priority_for(&meta, now), 1.0 + 3.0);
    }

    #[test]
    fn priority_decays_toward_floor_as_due_time_recedes() {
        let now = Utc::now();
        let mut meta = fresh(now);

        meta.expected_next_fetch = now;
        assert_eq!(priority_for(&meta, now), 1.0);

        meta.expected_next_fetch = now + Duration::hours(12);
        assert!((priority_for(&meta, now) - 0.55).abs() < 1e-9);

        meta.expected_next_fetch = now + Duration::hours(24);
        assert!((priority_for(&meta, now) - 0.1).abs() < 1e-9);

        meta.expected_next_fetch = now + Duration::hours(48);
        assert!((priority_for(&meta, now) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn backoff_minutes_never_exceeds_thirty_days() {
        let now = Utc::now();
        let mut meta = fresh(now);
        meta.backoff_multiplier = 8;
        meta.previous_change_time = Some(now - Duration::days(400));
        apply_after_crawl(&mut meta, "abc", now);
        let gap = meta.expected_next_fetch - now;
        assert!(gap.num_minutes() as f64 <= MAX_BACKOFF_MINUTES);
    }
}

//! Streak derivation from completion history.
//!
//! Streak records are a cache: everything here is a pure function of the
//! set of completed days, and any stored record that disagrees is fixed by
//! recomputing from completions, never the reverse.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};

use crate::model::StreakRecord;

/// Count the live streak ending at or adjacent to `today`.
///
/// A streak is anchored at today or yesterday: a day with no completion
/// only breaks the streak once it is fully in the past. From the anchor it
/// extends backward while consecutive days are present.
pub fn current_streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let yesterday = match today.checked_sub_days(Days::new(1)) {
        Some(day) => day,
        None => return 0,
    };

    let anchor = if days.contains(&today) {
        today
    } else if days.contains(&yesterday) {
        yesterday
    } else {
        return 0;
    };

    let mut streak = 0;
    let mut cursor = anchor;
    while days.contains(&cursor) {
        streak += 1;
        match cursor.checked_sub_days(Days::new(1)) {
            Some(previous) => cursor = previous,
            None => break,
        }
    }

    streak
}

/// Length of the longest run of consecutive completed days.
pub fn longest_streak(days: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0u32;
    let mut run = 0u32;
    let mut previous: Option<NaiveDate> = None;

    for &day in days {
        run = match previous {
            Some(prev) if (day - prev).num_days() == 1 => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(day);
    }

    longest
}

/// Derive the full streak record for a habit.
///
/// `prior_longest` is the previously recorded longest streak: the longest
/// field is a high-water mark and never shrinks when completions are
/// removed.
pub fn compute_record(
    days: &BTreeSet<NaiveDate>,
    today: NaiveDate,
    prior_longest: u32,
) -> StreakRecord {
    StreakRecord {
        current: current_streak(days, today),
        longest: longest_streak(days).max(prior_longest),
        last_completed: days.iter().next_back().copied(),
    }
}

//! Named generation phases derived from percent-complete.
//!
//! The table is static and not job-specific. Ranges are half-open
//! `[low, high)` except the last, which includes 100.

use serde::Serialize;

/// One named phase of a generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub name: &'static str,
    /// Inclusive lower bound.
    pub percent_low: u8,
    /// Exclusive upper bound, except for the final stage.
    pub percent_high: u8,
}

/// Canonical stage table, contiguous and exhaustive over `[0, 100]`.
pub const STAGES: [Stage; 6] = [
    Stage {
        name: "Loading Data",
        percent_low: 0,
        percent_high: 5,
    },
    Stage {
        name: "Assigning Courses",
        percent_low: 5,
        percent_high: 10,
    },
    Stage {
        name: "Scheduling Classes",
        percent_low: 10,
        percent_high: 60,
    },
    Stage {
        name: "Optimizing Schedule",
        percent_low: 60,
        percent_high: 85,
    },
    Stage {
        name: "Resolving Conflicts",
        percent_low: 85,
        percent_high: 95,
    },
    Stage {
        name: "Finalizing Timetable",
        percent_low: 95,
        percent_high: 100,
    },
];

impl Stage {
    fn contains(&self, percent: u8, is_last: bool) -> bool {
        percent >= self.percent_low
            && (percent < self.percent_high || (is_last && percent == self.percent_high))
    }
}

/// Map a percent-complete value to its stage.
///
/// Anything outside the table falls back to the nearest end: below the
/// first lower bound resolves to the first stage, above 100 to the last.
pub fn resolve(percent: u8) -> &'static Stage {
    resolve_in(&STAGES, percent).unwrap_or(&STAGES[0])
}

/// [`resolve`] against an arbitrary table. Returns `None` only when the
/// table is empty.
pub fn resolve_in(table: &'static [Stage], percent: u8) -> Option<&'static Stage> {
    let (first, rest) = table.split_first()?;
    let last = rest.len();
    let found = table
        .iter()
        .enumerate()
        .find(|(i, stage)| stage.contains(percent, *i == last))
        .map(|(_, stage)| stage);

    Some(found.unwrap_or_else(|| {
        if percent < first.percent_low {
            first
        } else {
            &table[last]
        }
    }))
}

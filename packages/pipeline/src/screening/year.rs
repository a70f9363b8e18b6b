//! Publication-year signal.
//!
//! The detected year is the most frequent plausible year in the excerpt,
//! the earliest one on ties.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)] // Static pattern that is guaranteed to be valid
static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(199|20[0-2])[0-9]\b").expect("valid regex"));

/// Most frequent year between 1990 and 2029 in `text`.
pub fn detect_year(text: &str) -> Option<u16> {
    let mut counts: BTreeMap<u16, usize> = BTreeMap::new();
    for m in YEAR.find_iter(text) {
        if let Ok(year) = m.as_str().parse::<u16>() {
            *counts.entry(year).or_default() += 1;
        }
    }

    // Keys are unique, so Reverse(year) breaks count ties toward the earliest.
    counts
        .into_iter()
        .max_by_key(|&(year, count)| (count, std::cmp::Reverse(year)))
        .map(|(year, _)| year)
}

/// Inclusive year bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YearRange {
    pub min: Option<u16>,
    pub max: Option<u16>,
}

impl YearRange {
    pub fn new(min: Option<u16>, max: Option<u16>) -> Self {
        Self { min, max }
    }

    pub fn is_open(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn contains(&self, year: u16) -> bool {
        self.min.is_none_or(|min| year >= min) && self.max.is_none_or(|max| year <= max)
    }
}

impl std::fmt::Display for YearRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bound = |b: Option<u16>| b.map(|y| y.to_string()).unwrap_or_else(|| "*".into());
        write!(f, "{}-{}", bound(self.min), bound(self.max))
    }
}

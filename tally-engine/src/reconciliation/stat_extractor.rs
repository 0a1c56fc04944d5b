//! Casualty statistic extraction
//!
//! Pulls death / injury / missing counts out of Chinese-language news text.
//! Each metric has number-before-keyword and keyword-before-number forms;
//! the largest number matched for a metric wins.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tally_common::Metric;

/// Counts extracted from one document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasualtyStats {
    pub casualties: u64,
    pub injured: u64,
    pub missing: u64,
    /// True when any pattern matched
    pub found: bool,
}

impl CasualtyStats {
    pub fn get(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Casualties => self.casualties,
            Metric::Injured => self.injured,
            Metric::Missing => self.missing,
        }
    }

    /// Metrics with a positive extracted value, in canonical order
    pub fn reported(&self) -> impl Iterator<Item = (Metric, u64)> + '_ {
        Metric::ALL
            .iter()
            .map(move |metric| (*metric, self.get(*metric)))
            .filter(|(_, value)| *value > 0)
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::error!(pattern, error = %e, "Invalid statistic pattern");
                None
            }
        })
        .collect()
}

static DEATH_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"([0-9]+)\s*人\s*死亡",
        r"死亡\s*([0-9]+)\s*人",
        r"([0-9]+)\s*人\s*喪生",
        r"喪生\s*([0-9]+)\s*人",
        r"([0-9]+)\s*人\s*罹難",
        r"罹難\s*([0-9]+)\s*人",
        r"([0-9]+)\s*名\s*死者",
        r"死者\s*([0-9]+)\s*名",
        r"([0-9]+)\s*人\s*不治",
        r"不治\s*([0-9]+)\s*人",
    ])
});

static INJURED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"([0-9]+)\s*人\s*受傷",
        r"受傷\s*([0-9]+)\s*人",
        r"([0-9]+)\s*人\s*送院",
        r"送院\s*([0-9]+)\s*人",
        r"([0-9]+)\s*名\s*傷者",
        r"傷者\s*([0-9]+)\s*名",
        r"([0-9]+)\s*人\s*送醫",
        r"送醫\s*([0-9]+)\s*人",
    ])
});

static MISSING_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"([0-9]+)\s*人\s*失蹤",
        r"失蹤\s*([0-9]+)\s*人",
        r"([0-9]+)\s*人\s*失聯",
        r"失聯\s*([0-9]+)\s*人",
        r"([0-9]+)\s*人\s*下落不明",
        r"下落不明\s*([0-9]+)\s*人",
        r"([0-9]+)\s*名\s*失蹤者",
        r"失蹤者\s*([0-9]+)\s*名",
    ])
});

/// Largest number captured by any pattern, if any matched
fn max_match(patterns: &[Regex], text: &str) -> Option<u64> {
    patterns
        .iter()
        .flat_map(|regex| regex.captures_iter(text))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u64>().ok())
        .max()
}

/// Extract casualty statistics from free text
pub fn extract_casualty_stats(text: &str) -> CasualtyStats {
    let mut stats = CasualtyStats::default();
    if text.trim().is_empty() {
        return stats;
    }

    let text = text.to_lowercase();

    for (target, patterns) in [
        (&mut stats.casualties, &*DEATH_PATTERNS),
        (&mut stats.injured, &*INJURED_PATTERNS),
        (&mut stats.missing, &*MISSING_PATTERNS),
    ] {
        if let Some(value) = max_match(patterns, &text) {
            *target = value;
            stats.found = true;
        }
    }

    if stats.found {
        tracing::debug!(
            casualties = stats.casualties,
            injured = stats.injured,
            missing = stats.missing,
            "Extracted casualty statistics"
        );
    }

    stats
}

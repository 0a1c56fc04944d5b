//! Reconciled numeric metrics

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metric with independent reconciliation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Casualties,
    Injured,
    Missing,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Casualties, Metric::Injured, Metric::Missing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Casualties => "casualties",
            Metric::Injured => "injured",
            Metric::Missing => "missing",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "casualties" => Ok(Metric::Casualties),
            "injured" => Ok(Metric::Injured),
            "missing" => Ok(Metric::Missing),
            other => Err(crate::Error::InvalidInput(format!("Unknown metric: {}", other))),
        }
    }
}

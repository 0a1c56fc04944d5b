//! Closed classification label set
//!
//! Every provider, the arbiter, the keyword fallback and persisted records
//! share this one enum. Adding or removing a label is a compile-time change:
//! each consumer matches exhaustively.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// News category (exactly 10 labels)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    EventUpdate,
    FinancialSupport,
    EmotionalSupport,
    Accommodation,
    MedicalLegal,
    Reconstruction,
    Statistics,
    CommunitySupport,
    GovernmentAnnouncement,
    GeneralNews,
}

/// How a free-text answer was matched against the label set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelMatch {
    /// Answer was exactly the label (after trim + lower-case)
    Exact,
    /// Label appeared somewhere inside a longer answer
    Substring,
}

/// Which branch of the ensemble protocol produced the final category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionPath {
    /// Both providers agreed, or only one of them answered
    Consensus,
    /// Providers disagreed and provider A was above the confidence threshold
    ConfidenceShortcut,
    /// Providers disagreed and the arbiter (or its tie-break default) decided
    Arbitration,
    /// No provider answered; the keyword classifier decided
    Fallback,
}

impl DecisionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionPath::Consensus => "consensus",
            DecisionPath::ConfidenceShortcut => "confidence-shortcut",
            DecisionPath::Arbitration => "arbitration",
            DecisionPath::Fallback => "fallback",
        }
    }
}

impl fmt::Display for DecisionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Category {
    /// All labels, in canonical order
    pub const ALL: [Category; 10] = [
        Category::EventUpdate,
        Category::FinancialSupport,
        Category::EmotionalSupport,
        Category::Accommodation,
        Category::MedicalLegal,
        Category::Reconstruction,
        Category::Statistics,
        Category::CommunitySupport,
        Category::GovernmentAnnouncement,
        Category::GeneralNews,
    ];

    /// Wire label (kebab-case)
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::EventUpdate => "event-update",
            Category::FinancialSupport => "financial-support",
            Category::EmotionalSupport => "emotional-support",
            Category::Accommodation => "accommodation",
            Category::MedicalLegal => "medical-legal",
            Category::Reconstruction => "reconstruction",
            Category::Statistics => "statistics",
            Category::CommunitySupport => "community-support",
            Category::GovernmentAnnouncement => "government-announcement",
            Category::GeneralNews => "general-news",
        }
    }

    /// Human description used when prompting language models
    pub fn description(&self) -> &'static str {
        match self {
            Category::EventUpdate => {
                "Event updates: fire progress, rescue operations, on-site conditions, containment"
            }
            Category::FinancialSupport => {
                "Financial support: grants, subsidies, allowances, compensation, funds, donations, cash aid"
            }
            Category::EmotionalSupport => {
                "Emotional support: counselling, social workers, support hotlines, trauma and grief care"
            }
            Category::Accommodation => {
                "Accommodation: shelters, temporary housing, transitional housing, rest stations, community halls"
            }
            Category::MedicalLegal => {
                "Medical/legal support: medical services, legal advice, legal aid, medical stations, free clinics"
            }
            Category::Reconstruction => {
                "Reconstruction: rebuilding progress, timetables, resources, plans, recovery work"
            }
            Category::Statistics => {
                "Statistics: death toll, missing persons, injured counts, incident figures"
            }
            Category::CommunitySupport => {
                "Community support: volunteers, supply collection, community activities, NGO support"
            }
            Category::GovernmentAnnouncement => {
                "Government announcements: formal notices, policies, measures, arrangements from departments"
            }
            Category::GeneralNews => {
                "General news: related news that fits none of the other categories"
            }
        }
    }

    /// Validate a free-text model answer against the closed label set
    ///
    /// The answer is trimmed and lower-cased, then matched exactly; failing
    /// that, the first label (in canonical order) contained in the answer wins.
    pub fn match_answer(raw: &str) -> Option<(Category, LabelMatch)> {
        let answer = raw.trim().to_lowercase();
        if answer.is_empty() {
            return None;
        }

        if let Some(category) = Category::ALL.iter().find(|c| c.as_str() == answer) {
            return Some((*category, LabelMatch::Exact));
        }

        Category::ALL
            .iter()
            .find(|c| answer.contains(c.as_str()))
            .map(|c| (*c, LabelMatch::Substring))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = crate::Error;

    /// Strict parse: case-insensitive exact label only
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| crate::Error::InvalidInput(format!("Unknown category: {}", s)))
    }
}

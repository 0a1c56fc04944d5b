//! Prompt construction for chat-completion backends

use tally_common::Category;

use super::Vote;

/// System + user message pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const CLASSIFIER_SYSTEM: &str =
    "You are a careful news classification assistant. Assign each article to exactly one of the given categories.";

const JUDGE_SYSTEM: &str =
    "You are a senior news editor acting as referee. Two assistants disagree on a category; give the final ruling.";

/// Labels that trip up the two voters, with the intended reading
const JUDGE_HINTS: &[&str] = &[
    "Requests for supplies or money for victims are financial-support.",
    "Road closures and bus diversions are event-update.",
    "Death, injury and missing-person counts are statistics.",
    "Formal notices issued by government departments are government-announcement.",
];

/// Truncate `title + "\n\n" + content` to at most `max_chars` characters
pub fn truncate_input(title: &str, content: &str, max_chars: usize) -> String {
    let text = format!("{}\n\n{}", title, content);
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text,
    }
}

fn label_list() -> String {
    Category::ALL
        .iter()
        .map(|category| format!("- {}: {}", category.as_str(), category.description()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt asking for a single category label
pub fn classification_prompt(text: &str) -> Prompt {
    let user = format!(
        "Read the article below and classify it into one of these categories:\n\
         {labels}\n\n\
         Article:\n{text}\n\n\
         Answer with the category label only (for example: statistics). No explanation.",
        labels = label_list(),
        text = text,
    );
    Prompt {
        system: CLASSIFIER_SYSTEM.to_string(),
        user,
    }
}

/// Prompt asking the arbiter to settle a disagreement between two votes
pub fn judge_prompt(text: &str, vote_a: &Vote, vote_b: &Vote) -> Prompt {
    let hints = JUDGE_HINTS
        .iter()
        .map(|hint| format!("- {}", hint))
        .collect::<Vec<_>>()
        .join("\n");

    let user = format!(
        "Article:\n{text}\n\n\
         Assistant A ({a_id}) says: {a_label} (confidence {a_conf:.2})\n\
         Assistant B ({b_id}) says: {b_label} (confidence {b_conf:.2})\n\n\
         Categories:\n{labels}\n\n\
         Guidance:\n{hints}\n\n\
         Reply with the single correct category label only. No explanation.",
        text = text,
        a_id = vote_a.provider_id,
        a_label = vote_a.category,
        a_conf = vote_a.confidence,
        b_id = vote_b.provider_id,
        b_label = vote_b.category,
        b_conf = vote_b.confidence,
        labels = label_list(),
        hints = hints,
    );
    Prompt {
        system: JUDGE_SYSTEM.to_string(),
        user,
    }
}

//! Keyword fallback classifier
//!
//! Used only when every provider failed. Pure and synchronous: the first rule
//! with a keyword present in the lower-cased `title + content` wins.

use tally_common::Category;

/// Ordered (keywords, category) rules; earlier rules take priority
const RULES: &[(&[&str], Category)] = &[
    (&["死亡", "受傷", "失蹤", "統計", "人數"], Category::Statistics),
    (
        &["火勢", "救援", "現場", "進展", "控制", "撲救"],
        Category::EventUpdate,
    ),
    (
        &["資助", "補助", "津貼", "賠償", "基金", "捐款", "財政", "經濟", "現金"],
        Category::FinancialSupport,
    ),
    (
        &["心理", "輔導", "情緒", "社工", "精神健康", "創傷", "哀傷"],
        Category::EmotionalSupport,
    ),
    (
        &["庇護", "住宿", "臨時", "過渡性房屋", "休息站", "社區會堂"],
        Category::Accommodation,
    ),
    (
        &["醫療", "法律", "諮詢", "義診", "醫療站"],
        Category::MedicalLegal,
    ),
    (&["重建", "恢復", "修復", "時間表"], Category::Reconstruction),
    (
        &["義工", "物資", "社區", "志願", "民間"],
        Category::CommunitySupport,
    ),
    (
        &["政府", "民政", "社會福利署", "消防處", "官方"],
        Category::GovernmentAnnouncement,
    ),
];

const DEFAULT_CATEGORY: Category = Category::GeneralNews;

/// Classify by keyword rules; always returns a category
pub fn fallback_classify(title: &str, content: &str) -> Category {
    let text = format!("{} {}", title, content).to_lowercase();

    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|keyword| text.contains(keyword)))
        .map(|(_, category)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}

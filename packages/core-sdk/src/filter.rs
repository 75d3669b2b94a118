use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    fallback::DEBUG_MARKER,
    models::{CanonicalItem, McqRecord, StructureKind},
};

/** \brief 条目名称的最大字符数，超出直接丢弃而不截断。 */
pub const MAX_NAME_LEN: usize = 200;

/**
 * \brief 只允许 1-12 年级的中小学教育委员会，以下关键词视为非中小学机构。
 */
const NON_SCHOOL_BOARD_KEYWORDS: &[&str] = &[
    "university",
    "joint entrance",
    "council of higher education",
    "technical education",
    "medical",
    "engineering",
    "college",
    "polytechnic",
    "distance education",
    "open university",
    "deemed",
    "affiliated",
];

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(board|subject|chapter|class)\s+\w{1,2}$").expect("placeholder pattern")
});

// 只匹配 "University 3" 这类泛化名称；按 "university " 子串匹配会误删 "University of Kerala"
static UNIVERSITY_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^university\s+\w{1,2}$").expect("university pattern"));

/**
 * \brief 按领域规则过滤条目：保序、只删不改、幂等。
 */
pub fn filter(items: Vec<CanonicalItem>, kind: &StructureKind) -> Vec<CanonicalItem> {
    items
        .into_iter()
        .filter(|item| is_valid_name(&item.name, kind))
        .collect()
}

/**
 * \brief 单个名称是否可以入库。
 */
pub fn is_valid_name(name: &str, kind: &StructureKind) -> bool {
    if !is_plausible_text(name) {
        return false;
    }
    let lower = name.to_lowercase();
    match kind {
        StructureKind::Boards => !NON_SCHOOL_BOARD_KEYWORDS
            .iter()
            .any(|keyword| lower.contains(keyword)),
        StructureKind::Universities => !UNIVERSITY_PLACEHOLDER.is_match(name.trim()),
        _ => true,
    }
}

fn is_plausible_text(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty()
        && text.chars().count() <= MAX_NAME_LEN
        && !PLACEHOLDER.is_match(trimmed)
        && !text.to_lowercase().contains("placeholder")
        && !trimmed.starts_with(DEBUG_MARKER)
}

/**
 * \brief 过滤单选题：题干与选项需为真实文本，兜底生成的诊断题一律丢弃。
 */
pub fn filter_mcqs(records: Vec<McqRecord>) -> Vec<McqRecord> {
    records
        .into_iter()
        .filter(|r| {
            !r.question.trim().is_empty()
                && !r.question.to_lowercase().contains("placeholder")
                && !r.question.trim().starts_with(DEBUG_MARKER)
                && !r.explanation.trim().starts_with(DEBUG_MARKER)
                && r.options.iter().all(|o| !o.trim().is_empty())
                && r.correct_option < 4
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(names: &[&str]) -> Vec<CanonicalItem> {
        names.iter().map(|n| CanonicalItem::new(*n)).collect()
    }

    fn names(items: &[CanonicalItem]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn test_school_board_filter() {
        let kept = filter(
            items(&["CBSE", "Delhi University", "ICSE"]),
            &StructureKind::Boards,
        );
        assert_eq!(names(&kept), vec!["CBSE", "ICSE"]);
    }

    #[test]
    fn test_board_keywords_are_case_insensitive() {
        let kept = filter(
            items(&[
                "Board of Technical Education, Kerala",
                "Kerala Medical Council",
                "JOINT ENTRANCE Examination Board",
                "Kerala Board of Public Examinations",
            ]),
            &StructureKind::Boards,
        );
        assert_eq!(names(&kept), vec!["Kerala Board of Public Examinations"]);
    }

    #[test]
    fn test_board_keywords_only_apply_to_boards() {
        let kept = filter(items(&["Medical Physics"]), &StructureKind::Subjects);
        assert_eq!(names(&kept), vec!["Medical Physics"]);
    }

    #[test]
    fn test_placeholder_names_rejected() {
        let kept = filter(
            items(&[
                "Board 1",
                "class a",
                "Chapter 12",
                "SUBJECT x",
                "Placeholder topic",
                "Chapter 1: Real Numbers",
                "Class Structure of Society",
            ]),
            &StructureKind::Chapters,
        );
        assert_eq!(
            names(&kept),
            vec!["Chapter 1: Real Numbers", "Class Structure of Society"]
        );
    }

    #[test]
    fn test_empty_long_and_debug_names_rejected() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        let exact = "y".repeat(MAX_NAME_LEN);
        let debug = format!("{} provider error", DEBUG_MARKER);
        let kept = filter(
            items(&["", "   ", long.as_str(), exact.as_str(), debug.as_str()]),
            &StructureKind::Streams,
        );
        assert_eq!(names(&kept), vec![exact.as_str()]);
    }

    #[test]
    fn test_university_placeholder() {
        let kept = filter(
            items(&["University 3", "university B", "University of Kerala", "Anna University"]),
            &StructureKind::Universities,
        );
        assert_eq!(names(&kept), vec!["University of Kerala", "Anna University"]);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let kinds = [
            StructureKind::Boards,
            StructureKind::Universities,
            StructureKind::Chapters,
        ];
        let raw = items(&[
            "CBSE",
            "Board 2",
            "Delhi University",
            "University 9",
            "placeholder",
            "Light - Reflection and Refraction",
            "",
        ]);
        for kind in &kinds {
            let once = filter(raw.clone(), kind);
            let twice = filter(once.clone(), kind);
            assert_eq!(once, twice, "{}", kind);
        }
    }

    #[test]
    fn test_filter_mcqs_drops_diagnostics() {
        let good = McqRecord {
            question: "What is 2 + 2?".to_string(),
            options: ["3".into(), "4".into(), "5".into(), "6".into()],
            correct_option: 1,
            explanation: "Addition".to_string(),
            subject: "Maths".to_string(),
            chapter: "Numbers".to_string(),
        };
        let mut diagnostic = good.clone();
        diagnostic.explanation = format!("{} no active provider", DEBUG_MARKER);
        let mut placeholder = good.clone();
        placeholder.question = "Placeholder question 1".to_string();

        let kept = filter_mcqs(vec![good.clone(), diagnostic, placeholder]);
        assert_eq!(kept, vec![good]);
    }
}

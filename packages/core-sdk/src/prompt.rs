use crate::models::StructureKind;

/**
 * \brief 所有提示词的统一结尾，与响应解析步骤约定只返回 JSON。
 */
pub const JSON_ONLY: &str =
    "Return ONLY valid JSON. Do not wrap it in markdown code fences and do not add any commentary.";

/**
 * \brief 构造结构化条目的提示词。
 * \param kind    条目类别
 * \param context 自由文本上下文，如 "State: Kerala" 或 "Subject: Physics, Board: CBSE, Class: 11"
 * \param count   期望条目数量
 */
pub fn build_prompt(kind: &StructureKind, context: &str, count: usize) -> String {
    let context = context.trim();
    let body = match kind {
        StructureKind::Boards => format!(
            "List exactly {count} school education boards that govern Class 1 to Class 12 schooling in {context}.\n\
             Include national boards that operate there (for example \"Central Board of Secondary Education (CBSE)\") \
             and the state's own school board (for example \"Kerala Board of Public Examinations\").\n\
             Do NOT include universities, joint entrance or examination councils, councils of higher education, \
             technical education boards, medical or engineering bodies, colleges, polytechnics, \
             distance education or open universities.\n\
             Respond with a JSON array of strings holding the official board names."
        ),
        StructureKind::Subjects => format!(
            "List exactly {count} compulsory subjects from the official syllabus for: {context}.\n\
             Use the subject names exactly as the board publishes them. Exclude optional and elective subjects.\n\
             Respond with a JSON array of strings holding the subject names."
        ),
        StructureKind::Chapters => format!(
            "List the chapters of the official prescribed textbook for: {context}.\n\
             Return at most {count} chapters in textbook order, using the real chapter titles.\n\
             Never use generic placeholders such as \"Chapter 1\" or \"Unit 2\".\n\
             Respond with a JSON array of strings holding the chapter titles."
        ),
        other => format!(
            "List exactly {count} real {label} for: {context}.\n\
             Use official, currently valid names only.\n\
             Respond with a JSON array of strings.",
            label = other.label()
        ),
    };
    format!("{}\n{}", body, JSON_ONLY)
}

/**
 * \brief 构造单选题生成提示词。
 */
pub fn build_mcq_prompt(topic: &str, count: usize) -> String {
    format!(
        "Write exactly {count} multiple choice questions about: {topic}.\n\
         Respond with a JSON array of objects. Each object must have these fields:\n\
         \"question\" (string), \"options\" (array of exactly 4 strings), \
         \"correct_option\" (zero-based index 0-3 of the correct option), \
         \"explanation\" (string), \"subject\" (string), \"chapter\" (string).\n\
         {JSON_ONLY}",
        topic = topic.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_prompt_ends_with_json_instruction() {
        let kinds = [
            StructureKind::Boards,
            StructureKind::Universities,
            StructureKind::Subjects,
            StructureKind::Chapters,
            StructureKind::Streams,
            StructureKind::Custom("entrance exams".to_string()),
        ];
        for kind in &kinds {
            assert!(build_prompt(kind, "ctx", 10).ends_with(JSON_ONLY), "{}", kind);
        }
        assert!(build_mcq_prompt("Optics", 5).ends_with(JSON_ONLY));
    }

    #[test]
    fn test_boards_prompt_excludes_higher_education() {
        let prompt = build_prompt(&StructureKind::Boards, "State: Kerala", 4);
        assert!(prompt.contains("exactly 4 school education boards"));
        assert!(prompt.contains("in State: Kerala"));
        assert!(prompt.contains("Do NOT include universities"));
        assert!(prompt.contains("CBSE"));
    }

    #[test]
    fn test_chapters_prompt_forbids_placeholders() {
        let prompt = build_prompt(
            &StructureKind::Chapters,
            "Subject: Trigonometry, Board: CBSE, Class: 10",
            8,
        );
        assert!(prompt.contains("\"Chapter 1\""));
        assert!(prompt.contains("Subject: Trigonometry, Board: CBSE, Class: 10"));
    }

    #[test]
    fn test_generic_prompt_uses_label() {
        let prompt = build_prompt(&StructureKind::Custom("entrance exams".into()), " India ", 3);
        assert!(prompt.starts_with("List exactly 3 real entrance exams for: India."));
        assert!(prompt.contains("JSON array of strings"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let a = build_prompt(&StructureKind::Subjects, "Board: ICSE, Class: 9", 6);
        let b = build_prompt(&StructureKind::Subjects, "Board: ICSE, Class: 9", 6);
        assert_eq!(a, b);
    }

    #[test]
    fn test_mcq_prompt_lists_fields() {
        let prompt = build_mcq_prompt("Photosynthesis", 5);
        for field in ["question", "options", "correct_option", "explanation", "subject", "chapter"] {
            assert!(prompt.contains(&format!("\"{}\"", field)));
        }
    }
}

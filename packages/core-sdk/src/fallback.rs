use crate::models::{CanonicalItem, McqRecord, StructureKind};

/**
 * \brief 兜底数据中诊断条目的前缀，过滤器据此保证其不会入库。
 */
pub const DEBUG_MARKER: &str = "DEBUG_ERROR:";

const SAMPLE_ENTRIES: usize = 2;

/**
 * \brief 生成结构化条目的兜底数据。
 * \details 首个条目携带失败原因，其后为带类别与上下文标注的示例条目；总数不超过 max(count, 1)。
 */
pub fn mock_structures(
    kind: &StructureKind,
    context: &str,
    count: usize,
    reason: &str,
) -> Vec<CanonicalItem> {
    let context = context.trim();
    let mut items = vec![CanonicalItem::new(format!("{} {}", DEBUG_MARKER, reason))];
    items.extend((1..=SAMPLE_ENTRIES).map(|n| {
        if context.is_empty() {
            CanonicalItem::new(format!("Sample {} {}", kind.singular(), n))
        } else {
            CanonicalItem::new(format!("Sample {} {} ({})", kind.singular(), n, context))
        }
    }));
    items.truncate(count.max(1));
    items
}

/**
 * \brief 生成 count 道结构一致的兜底单选题，正确答案固定为 0。
 */
pub fn mock_mcqs(topic: &str, count: usize, reason: &str) -> Vec<McqRecord> {
    let topic = topic.trim();
    (1..=count)
        .map(|n| McqRecord {
            question: format!("Sample question {} about {}", n, topic),
            options: [
                "Option A".to_string(),
                "Option B".to_string(),
                "Option C".to_string(),
                "Option D".to_string(),
            ],
            correct_option: 0,
            explanation: format!("{} generated without a provider response: {}", DEBUG_MARKER, reason),
            subject: topic.to_string(),
            chapter: "General".to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_structures_lead_with_marker() {
        let items = mock_structures(&StructureKind::Boards, "State of X", 10, "no active provider");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].name, "DEBUG_ERROR: no active provider");
        assert_eq!(items[1].name, "Sample Board 1 (State of X)");
        assert_eq!(items[2].name, "Sample Board 2 (State of X)");
    }

    #[test]
    fn test_mock_structures_respect_small_counts() {
        assert_eq!(mock_structures(&StructureKind::Streams, "", 0, "r").len(), 1);
        let two = mock_structures(&StructureKind::Streams, "", 2, "r");
        assert_eq!(two[1].name, "Sample Stream 1");
        assert_eq!(two.len(), 2);
    }

    #[test]
    fn test_mock_is_deterministic() {
        let kind = StructureKind::Custom("Entrance Exams".to_string());
        assert_eq!(
            mock_structures(&kind, "India", 5, "timeout"),
            mock_structures(&kind, "India", 5, "timeout")
        );
    }

    #[test]
    fn test_mock_mcqs_shape() {
        let mcqs = mock_mcqs("Optics", 4, "provider error: 500");
        assert_eq!(mcqs.len(), 4);
        for (i, mcq) in mcqs.iter().enumerate() {
            assert_eq!(mcq.question, format!("Sample question {} about Optics", i + 1));
            assert_eq!(mcq.options.len(), 4);
            assert_eq!(mcq.correct_option, 0);
            assert!(mcq.explanation.contains("provider error: 500"));
        }
        assert!(mock_mcqs("Optics", 0, "r").is_empty());
    }
}

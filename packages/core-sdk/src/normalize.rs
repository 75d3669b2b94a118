use serde_json::{Map, Value};

use crate::{
    error::FetchError,
    models::{CanonicalItem, McqRecord},
};

/** \brief 优先识别的包装字段，按顺序匹配。 */
const WRAPPER_KEYS: &[&str] = &["mcqs", "questions", "items"];
/** \brief 对象条目取名字段，按顺序匹配。 */
const NAME_KEYS: &[&str] = &["name", "title", "label"];
const CORRECT_KEYS: &[&str] = &["correct_option", "correctOption", "correct_answer", "answer"];

/**
 * \brief 解析后 JSON 的形态。
 * \details 不同 Provider 可能返回裸数组或包装对象，包装字段名也不统一，
 *          由此统一识别后调用方只处理 `Vec<CanonicalItem>` / `Vec<McqRecord>`。
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseShape<'a> {
    /** \brief 顶层即数组。 */
    Array(&'a [Value]),
    /** \brief 对象中存在 mcqs / questions / items 数组字段。 */
    KeyedObject {
        key: &'static str,
        elements: &'a [Value],
    },
    /** \brief 对象中恰好只有一个数组类型的字段。 */
    SingleArrayField { key: &'a str, elements: &'a [Value] },
    Unrecognized,
}

impl<'a> ResponseShape<'a> {
    pub fn detect(value: &'a Value) -> Self {
        let map = match value {
            Value::Array(elements) => return ResponseShape::Array(elements),
            Value::Object(map) => map,
            _ => return ResponseShape::Unrecognized,
        };
        for key in WRAPPER_KEYS {
            if let Some(Value::Array(elements)) = map.get(*key) {
                return ResponseShape::KeyedObject {
                    key: *key,
                    elements,
                };
            }
        }
        let mut arrays = map
            .iter()
            .filter_map(|(key, v)| v.as_array().map(|a| (key.as_str(), a.as_slice())));
        match (arrays.next(), arrays.next()) {
            (Some((key, elements)), None) => ResponseShape::SingleArrayField { key, elements },
            _ => ResponseShape::Unrecognized,
        }
    }

    pub fn elements(&self) -> &'a [Value] {
        match *self {
            ResponseShape::Array(elements)
            | ResponseShape::KeyedObject { elements, .. }
            | ResponseShape::SingleArrayField { elements, .. } => elements,
            ResponseShape::Unrecognized => &[],
        }
    }
}

/**
 * \brief 去除首尾的 ```json / ``` 代码块标记及空白，正文中的反引号保持不变。
 */
pub fn strip_fences(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // 开头标记行可能带语言名，如 ```json
        text = match rest.split_once('\n') {
            Some((lang, body)) if lang.trim().chars().all(|c| c.is_ascii_alphanumeric()) => body,
            _ => rest,
        };
    }
    if let Some(body) = text.trim_end().strip_suffix("```") {
        text = body;
    }
    text.trim().to_string()
}

/**
 * \brief 去除代码块标记后解析 JSON；整体解析失败时尝试截取正文中的首个 JSON 片段。
 */
pub fn parse_payload(raw: &str) -> Result<Value, FetchError> {
    let cleaned = strip_fences(raw);
    match serde_json::from_str(&cleaned) {
        Ok(value) => Ok(value),
        Err(err) => {
            embedded_json(&cleaned).ok_or_else(|| FetchError::MalformedResponse(err.to_string()))
        }
    }
}

fn embedded_json(text: &str) -> Option<Value> {
    let start = text.find(|c: char| c == '[' || c == '{')?;
    let end = text.rfind(|c: char| c == ']' || c == '}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/**
 * \brief 将 Provider 文本转换为结构化条目序列。
 * \details 无法识别的形态返回空序列；仅 JSON 解析失败时返回错误。
 */
pub fn normalize(raw: &str) -> Result<Vec<CanonicalItem>, FetchError> {
    let value = parse_payload(raw)?;
    Ok(ResponseShape::detect(&value)
        .elements()
        .iter()
        .map(|element| CanonicalItem::new(item_name(element)))
        .collect())
}

fn item_name(value: &Value) -> String {
    match value {
        Value::Object(map) => first_text(map, NAME_KEYS)
            .or_else(|| map.values().next().map(scalar_text))
            .unwrap_or_default(),
        other => scalar_text(other),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/**
 * \brief 将 Provider 文本转换为单选题序列，修复可识别的变体，丢弃不满足 4 选项 / 0-3 下标的记录。
 * \param topic 记录缺少 subject 字段时的默认值
 */
pub fn normalize_mcqs(raw: &str, topic: &str) -> Result<Vec<McqRecord>, FetchError> {
    let value = parse_payload(raw)?;
    Ok(ResponseShape::detect(&value)
        .elements()
        .iter()
        .filter_map(|element| mcq_from_value(element, topic))
        .collect())
}

fn mcq_from_value(value: &Value, topic: &str) -> Option<McqRecord> {
    let obj = value.as_object()?;
    let question = first_text(obj, &["question", "q", "prompt"])?;
    let options = parse_options(obj.get("options").or_else(|| obj.get("choices"))?)?;
    let correct_option = CORRECT_KEYS
        .iter()
        .find_map(|key| obj.get(*key))
        .and_then(|v| resolve_correct(v, &options))?;
    Some(McqRecord {
        question,
        options,
        correct_option,
        explanation: first_text(obj, &["explanation"]).unwrap_or_default(),
        subject: first_text(obj, &["subject"]).unwrap_or_else(|| topic.trim().to_string()),
        chapter: first_text(obj, &["chapter"]).unwrap_or_default(),
    })
}

fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .map(scalar_text)
        .find(|text| !text.is_empty())
}

fn parse_options(value: &Value) -> Option<[String; 4]> {
    let texts: Vec<String> = match value {
        Value::Array(items) => items.iter().map(scalar_text).collect(),
        Value::Object(map) => ["a", "b", "c", "d"]
            .iter()
            .map(|letter| {
                map.iter()
                    .find(|(key, _)| key.trim().eq_ignore_ascii_case(letter))
                    .map(|(_, v)| scalar_text(v))
            })
            .collect::<Option<Vec<_>>>()?,
        _ => return None,
    };
    if texts.iter().any(|text| text.is_empty()) {
        return None;
    }
    texts.try_into().ok()
}

fn resolve_correct(value: &Value, options: &[String; 4]) -> Option<u8> {
    let index = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => {
            let s = s.trim();
            let mut chars = s.chars();
            if let Ok(n) = s.parse::<u64>() {
                n
            } else if let (Some(c), None) = (chars.next(), chars.next()) {
                let c = c.to_ascii_lowercase();
                if !('a'..='d').contains(&c) {
                    return None;
                }
                (c as u8 - b'a') as u64
            } else {
                options.iter().position(|o| o.eq_ignore_ascii_case(s))? as u64
            }
        }
        _ => return None,
    };
    (index < 4).then_some(index as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(items: &[CanonicalItem]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn test_detect_shapes_in_priority_order() {
        let bare = json!(["a"]);
        assert!(matches!(ResponseShape::detect(&bare), ResponseShape::Array(e) if e.len() == 1));

        // wrapper keys win over a lone array field with another name
        let keyed = json!({"items": ["a", "b"], "meta": {"n": 2}});
        assert!(matches!(
            ResponseShape::detect(&keyed),
            ResponseShape::KeyedObject { key: "items", .. }
        ));
        let both = json!({"questions": [1], "mcqs": [1, 2]});
        assert!(matches!(
            ResponseShape::detect(&both),
            ResponseShape::KeyedObject { key: "mcqs", .. }
        ));

        let single = json!({"boards": ["CBSE"], "state": "Kerala"});
        assert!(matches!(
            ResponseShape::detect(&single),
            ResponseShape::SingleArrayField { key: "boards", .. }
        ));

        let two_arrays = json!({"boards": ["CBSE"], "others": ["x"]});
        assert_eq!(ResponseShape::detect(&two_arrays), ResponseShape::Unrecognized);
        assert_eq!(ResponseShape::detect(&json!("text")), ResponseShape::Unrecognized);
        assert_eq!(ResponseShape::detect(&json!({"items": "x"})), ResponseShape::Unrecognized);
    }

    #[test]
    fn test_unrecognized_shape_is_empty_not_error() {
        assert!(normalize(r#"{"a": 1, "b": "two"}"#).unwrap().is_empty());
        assert!(normalize("42").unwrap().is_empty());
        assert!(normalize(r#"{"x": [1], "y": [2]}"#).unwrap().is_empty());
    }

    #[test]
    fn test_fenced_text_parses_like_plain_text() {
        let plain = r#"{"items": [{"name": "CBSE"}, "ICSE"]}"#;
        let fenced = format!("```json\n{}\n```", plain);
        assert_eq!(normalize(&fenced).unwrap(), normalize(plain).unwrap());
        assert_eq!(names(&normalize(&fenced).unwrap()), vec!["CBSE", "ICSE"]);
        assert_eq!(strip_fences("  ```\n[1]\n```  "), "[1]");
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(matches!(
            normalize("Sorry, I cannot help with that."),
            Err(FetchError::MalformedResponse(_))
        ));
        assert!(matches!(normalize("```json\n```"), Err(FetchError::MalformedResponse(_))));
    }

    #[test]
    fn test_json_embedded_in_prose_is_recovered() {
        let raw = "Here are the boards:\n[\"CBSE\", \"ICSE\"]\nHope this helps!";
        assert_eq!(names(&normalize(raw).unwrap()), vec!["CBSE", "ICSE"]);
    }

    #[test]
    fn test_element_mapping() {
        let raw = r#"[
            "  Physics ",
            {"title": "Chemistry", "code": 43},
            {"label": "Biology"},
            {"code": "ENG", "long": "English"},
            {"name": "Mathematics", "title": "ignored"},
            7,
            null,
            {}
        ]"#;
        assert_eq!(
            names(&normalize(raw).unwrap()),
            vec!["Physics", "Chemistry", "Biology", "ENG", "Mathematics", "7", "", ""]
        );
    }

    #[test]
    fn test_empty_name_key_falls_through_to_next() {
        let raw = r#"[
            {"name": null, "title": "Physics"},
            {"name": "  ", "title": "", "label": "Chemistry"},
            {"code": "BIO", "name": null}
        ]"#;
        assert_eq!(
            names(&normalize(raw).unwrap()),
            vec!["Physics", "Chemistry", "BIO"]
        );
    }

    #[test]
    fn test_backticks_inside_values_are_kept() {
        let raw = "```json\n[\"Use ``` blocks\"]\n```";
        assert_eq!(names(&normalize(raw).unwrap()), vec!["Use ``` blocks"]);
        assert_eq!(names(&normalize(r#"["a ``` b"]"#).unwrap()), vec!["a ``` b"]);
        assert_eq!(strip_fences("```[\"CBSE\"]```"), "[\"CBSE\"]");
    }

    #[test]
    fn test_mcq_repairs_known_variants() {
        let raw = r#"{"questions": [
            {"question": "sin 90?", "options": ["1", "0", "-1", "2"], "correct_option": 0,
             "explanation": "unit circle", "subject": "Maths", "chapter": "Trigonometry"},
            {"question": "cos 0?", "options": {"A": "0", "B": "1", "C": "-1", "D": "2"}, "answer": "B"},
            {"question": "tan 45?", "options": ["0", "1", "2", "3"], "correctOption": "1"},
            {"question": "sec 0?", "options": ["0", "2", "1", "3"], "correct_answer": "1 "}
        ]}"#;
        let mcqs = normalize_mcqs(raw, "Trigonometry basics").unwrap();
        assert_eq!(mcqs.len(), 4);
        assert_eq!(mcqs[0].correct_option, 0);
        assert_eq!(mcqs[0].subject, "Maths");
        assert_eq!(mcqs[1].correct_option, 1);
        assert_eq!(mcqs[1].options[1], "1");
        assert_eq!(mcqs[1].subject, "Trigonometry basics");
        assert_eq!(mcqs[1].explanation, "");
        assert_eq!(mcqs[2].correct_option, 1);
        // "1 " parses as an index before it is tried as option text
        assert_eq!(mcqs[3].correct_option, 1);
    }

    #[test]
    fn test_mcq_invalid_records_are_dropped() {
        let raw = r#"[
            {"question": "three options", "options": ["a", "b", "c"], "correct_option": 0},
            {"question": "five options", "options": ["a", "b", "c", "d", "e"], "correct_option": 0},
            {"question": "out of range", "options": ["a", "b", "c", "d"], "correct_option": 4},
            {"question": "bad letter", "options": ["a", "b", "c", "d"], "correct_option": "E"},
            {"question": "", "options": ["a", "b", "c", "d"], "correct_option": 1},
            {"question": "blank option", "options": ["a", " ", "c", "d"], "correct_option": 1},
            {"question": "no answer", "options": ["a", "b", "c", "d"]},
            "not an object",
            {"question": "valid", "options": ["a", "b", "c", "d"], "correct_option": "c"}
        ]"#;
        let mcqs = normalize_mcqs(raw, "topic").unwrap();
        assert_eq!(mcqs.len(), 1);
        assert_eq!(mcqs[0].question, "valid");
        assert_eq!(mcqs[0].correct_option, 2);
    }

    #[test]
    fn test_mcq_answer_by_option_text() {
        let raw = r#"[{"question": "Capital of France?", "options": ["Berlin", "Paris", "Rome", "Madrid"], "answer": "paris"}]"#;
        let mcqs = normalize_mcqs(raw, "Geography").unwrap();
        assert_eq!(mcqs[0].correct_option, 1);
    }
}

use std::{fmt, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/**
 * \brief 已知使用 generateContent 协议的服务域名。
 */
const GENERATE_CONTENT_HOSTS: &[&str] = &[
    "generativelanguage.googleapis.com",
    "aiplatform.googleapis.com",
];

/**
 * \brief Provider 接口协议。
 * \details 在配置阶段确定并落库，调用时不再根据地址推断。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    /** \brief OpenAI 风格：POST {base}/chat/completions */
    ChatCompletions,
    /** \brief Gemini 风格：POST {base}/{model}:generateContent */
    GenerateContent,
}

impl Dialect {
    /**
     * \brief 根据 API 基地址推断协议，仅在未显式指定时使用。
     */
    pub fn detect(api_base: &str) -> Self {
        let lower = api_base.to_ascii_lowercase();
        if GENERATE_CONTENT_HOSTS.iter().any(|host| lower.contains(host)) {
            Dialect::GenerateContent
        } else {
            Dialect::ChatCompletions
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::ChatCompletions => "chat-completions",
            Dialect::GenerateContent => "generate-content",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat-completions" | "chat" | "openai" => Ok(Dialect::ChatCompletions),
            "generate-content" | "gemini" | "google" => Ok(Dialect::GenerateContent),
            other => Err(anyhow!("unknown dialect: {}", other)),
        }
    }
}

/**
 * \brief Provider 配置模型，对核心流程只读。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    /** \brief 自增主键 */
    pub id: i64,
    /** \brief 显示名称 */
    pub name: String,
    /** \brief API 基地址 */
    pub api_base: String,
    /** \brief API Key */
    pub api_key: String,
    /** \brief 模型名 */
    pub model: String,
    /** \brief 接口协议 */
    pub dialect: Dialect,
    /** \brief 是否为当前启用的 Provider（全局至多一个） */
    pub is_active: bool,
}

impl Provider {
    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/**
 * \brief 结构化条目类别。
 */
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StructureKind {
    Boards,
    Universities,
    Subjects,
    Chapters,
    Streams,
    /** \brief 任意条目类型，携带调用方给出的类型标签。 */
    Custom(String),
}

impl StructureKind {
    /**
     * \brief 用于提示词的复数标签。
     */
    pub fn label(&self) -> &str {
        match self {
            StructureKind::Boards => "boards",
            StructureKind::Universities => "universities",
            StructureKind::Subjects => "subjects",
            StructureKind::Chapters => "chapters",
            StructureKind::Streams => "streams",
            StructureKind::Custom(label) => label,
        }
    }

    /**
     * \brief 用于示例数据的单数名称。
     */
    pub fn singular(&self) -> &str {
        match self {
            StructureKind::Boards => "Board",
            StructureKind::Universities => "University",
            StructureKind::Subjects => "Subject",
            StructureKind::Chapters => "Chapter",
            StructureKind::Streams => "Stream",
            StructureKind::Custom(label) => label,
        }
    }

    /**
     * \brief 持久化时使用的类别键。
     */
    pub fn key(&self) -> String {
        match self {
            StructureKind::Custom(label) => format!("structure:{}", label),
            other => other.label().to_string(),
        }
    }
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for StructureKind {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        let kind = match lower.as_str() {
            "boards" | "board" => StructureKind::Boards,
            "universities" | "university" => StructureKind::Universities,
            "subjects" | "subject" => StructureKind::Subjects,
            "chapters" | "chapter" => StructureKind::Chapters,
            "streams" | "stream" => StructureKind::Streams,
            _ => {
                let label = trimmed
                    .split_once(':')
                    .filter(|(prefix, _)| {
                        let prefix = prefix.trim().to_ascii_lowercase();
                        prefix == "structure" || prefix == "generic-structure"
                    })
                    .map(|(_, label)| label.trim())
                    .filter(|label| !label.is_empty())
                    .ok_or_else(|| FetchError::InvalidKind(trimmed.to_string()))?;
                StructureKind::Custom(label.to_string())
            }
        };
        Ok(kind)
    }
}

/**
 * \brief 标准化后的结构化条目。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalItem {
    pub name: String,
}

impl CanonicalItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/**
 * \brief 单选题记录。
 * \details 选项固定为 4 个，`correct_option` 为 0-3 的下标。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqRecord {
    pub question: String,
    pub options: [String; 4],
    pub correct_option: u8,
    pub explanation: String,
    pub subject: String,
    pub chapter: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_detect_by_host() {
        assert_eq!(
            Dialect::detect("https://generativelanguage.googleapis.com/v1beta/models"),
            Dialect::GenerateContent
        );
        assert_eq!(
            Dialect::detect("https://api.openai.com/v1"),
            Dialect::ChatCompletions
        );
        assert_eq!(
            Dialect::detect("http://localhost:11434/v1"),
            Dialect::ChatCompletions
        );
    }

    #[test]
    fn test_dialect_round_trips_through_str() {
        for dialect in [Dialect::ChatCompletions, Dialect::GenerateContent] {
            assert_eq!(dialect.as_str().parse::<Dialect>().unwrap(), dialect);
        }
        assert_eq!("Gemini".parse::<Dialect>().unwrap(), Dialect::GenerateContent);
        assert!("soap".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_structure_kind_parse() {
        assert_eq!("Boards".parse::<StructureKind>().unwrap(), StructureKind::Boards);
        assert_eq!(" chapter ".parse::<StructureKind>().unwrap(), StructureKind::Chapters);
        assert_eq!(
            "structure:Entrance Exams".parse::<StructureKind>().unwrap(),
            StructureKind::Custom("Entrance Exams".to_string())
        );
        assert_eq!(
            "Structure: Exams: Entrance".parse::<StructureKind>().unwrap(),
            StructureKind::Custom("Exams: Entrance".to_string())
        );
        assert_eq!(
            "generic-structure:streams of study"
                .parse::<StructureKind>()
                .unwrap()
                .key(),
            "structure:streams of study"
        );
    }

    #[test]
    fn test_structure_kind_rejects_unknown() {
        assert!(matches!(
            "planets".parse::<StructureKind>(),
            Err(FetchError::InvalidKind(k)) if k == "planets"
        ));
        assert!("structure:  ".parse::<StructureKind>().is_err());
        assert!("chapter:Optics".parse::<StructureKind>().is_err());
    }
}

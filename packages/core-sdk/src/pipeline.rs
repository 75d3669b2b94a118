use serde::Serialize;

use crate::{
    config::FetchConfig,
    error::FetchError,
    fallback, filter, llm, normalize,
    models::{CanonicalItem, McqRecord, Provider, StructureKind},
    prompt, telemetry,
};

/**
 * \brief 结构化条目抓取结果。
 */
#[derive(Debug, Clone, Serialize)]
pub struct StructureFetch {
    pub items: Vec<CanonicalItem>,
    /** \brief 走兜底数据时的原因；为 Some 时 items 为兜底数据。 */
    pub fallback: Option<String>,
}

/**
 * \brief 单选题生成结果。
 */
#[derive(Debug, Clone, Serialize)]
pub struct McqFetch {
    pub questions: Vec<McqRecord>,
    pub fallback: Option<String>,
}

/**
 * \brief 抓取结构化条目：构造提示词 → 调用 Provider → 标准化 → 过滤 → 截取 count 条。
 * \details 任何 Provider / 网络 / 解析失败都替换为兜底数据，不向调用方返回错误。
 * \param provider 当前启用的 Provider，None 表示未配置
 */
pub async fn fetch_structure(
    provider: Option<&Provider>,
    kind: &StructureKind,
    context: &str,
    count: usize,
    config: &FetchConfig,
) -> StructureFetch {
    match try_fetch_structure(provider, kind, context, count, config).await {
        Ok(items) => {
            telemetry::log_event(
                "pipeline.fetch",
                &format!("kind={} context={} items={}", kind, context, items.len()),
            );
            StructureFetch {
                items,
                fallback: None,
            }
        }
        Err(err) => {
            let reason = err.to_string();
            telemetry::log_warn(
                "pipeline.fetch",
                &format!("kind={} context={} fallback: {}", kind, context, reason),
            );
            StructureFetch {
                items: fallback::mock_structures(kind, context, count, &reason),
                fallback: Some(reason),
            }
        }
    }
}

async fn try_fetch_structure(
    provider: Option<&Provider>,
    kind: &StructureKind,
    context: &str,
    count: usize,
    config: &FetchConfig,
) -> Result<Vec<CanonicalItem>, FetchError> {
    let provider = provider.ok_or(FetchError::NoActiveProvider)?;
    let prompt = prompt::build_prompt(kind, context, count);
    let raw = llm::invoke(provider, &prompt, config).await?;
    structures_from_response(&raw, kind, count)
}

/**
 * \brief 将原始响应转换为最终条目：标准化、过滤后保序截取前 count 条。
 */
pub fn structures_from_response(
    raw: &str,
    kind: &StructureKind,
    count: usize,
) -> Result<Vec<CanonicalItem>, FetchError> {
    let mut items = filter::filter(normalize::normalize(raw)?, kind);
    items.truncate(count);
    Ok(items)
}

/**
 * \brief 生成单选题；失败时返回 count 道兜底题。
 */
pub async fn generate_mcqs(
    provider: Option<&Provider>,
    topic: &str,
    count: usize,
    config: &FetchConfig,
) -> McqFetch {
    let attempt = async {
        let provider = provider.ok_or(FetchError::NoActiveProvider)?;
        let raw = llm::invoke(provider, &prompt::build_mcq_prompt(topic, count), config).await?;
        mcqs_from_response(&raw, topic, count)
    };
    match attempt.await {
        Ok(questions) => {
            telemetry::log_event(
                "pipeline.mcq",
                &format!("topic={} questions={}", topic, questions.len()),
            );
            McqFetch {
                questions,
                fallback: None,
            }
        }
        Err(err) => {
            let reason = err.to_string();
            telemetry::log_warn("pipeline.mcq", &format!("topic={} fallback: {}", topic, reason));
            McqFetch {
                questions: fallback::mock_mcqs(topic, count, &reason),
                fallback: Some(reason),
            }
        }
    }
}

pub fn mcqs_from_response(
    raw: &str,
    topic: &str,
    count: usize,
) -> Result<Vec<McqRecord>, FetchError> {
    let mut questions = filter::filter_mcqs(normalize::normalize_mcqs(raw, topic)?);
    questions.truncate(count);
    Ok(questions)
}

/**
 * \brief 可入库的条目：兜底数据一律不入库，实时结果再过滤一次。
 */
pub fn persistable_structures(kind: &StructureKind, fetch: &StructureFetch) -> Vec<CanonicalItem> {
    if fetch.fallback.is_some() {
        return Vec::new();
    }
    filter::filter(fetch.items.clone(), kind)
}

pub fn persistable_mcqs(fetch: &McqFetch) -> Vec<McqRecord> {
    if fetch.fallback.is_some() {
        return Vec::new();
    }
    filter::filter_mcqs(fetch.questions.clone())
}

use thiserror::Error;

/**
 * \brief 抓取流程的错误分类。
 * \details 除 `InvalidKind` 外均在流程内部以兜底数据恢复，不会抛给调用方。
 */
#[derive(Debug, Error)]
pub enum FetchError {
    /** \brief 未配置启用的 Provider 或缺少密钥。 */
    #[error("no active provider")]
    NoActiveProvider,
    /** \brief 网络失败、非 2xx 响应或空响应。 */
    #[error("provider error: {0}")]
    Provider(String),
    /** \brief 去除代码块标记后仍无法解析为 JSON。 */
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /** \brief 调用方传入未知的条目类别。 */
    #[error("invalid item kind: {0}")]
    InvalidKind(String),
}

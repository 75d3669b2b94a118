use std::{str::FromStr, time::Duration};

const DEFAULT_DB_PATH: &str = "curricula.db";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 1;
const DEFAULT_COUNT: usize = 10;

/**
 * \brief 抓取流程的运行参数。
 */
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /** \brief 单次 HTTP 请求超时 */
    pub timeout: Duration,
    /** \brief 网络失败 / 429 / 5xx 时的重试次数 */
    pub retries: u32,
    /** \brief 结构化条目默认数量 */
    pub default_count: usize,
    /** \brief 单选题默认数量 */
    pub mcq_default_count: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
            default_count: DEFAULT_COUNT,
            mcq_default_count: DEFAULT_COUNT,
        }
    }
}

impl FetchConfig {
    /**
     * \brief 以默认值为基础，读取环境变量覆盖。
     */
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: Duration::from_secs(env_or(
                "CURRICULA_FETCH_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )),
            retries: env_or("CURRICULA_FETCH_RETRIES", defaults.retries),
            default_count: env_or("CURRICULA_DEFAULT_COUNT", defaults.default_count),
            mcq_default_count: env_or("CURRICULA_MCQ_COUNT", defaults.mcq_default_count),
        }
    }

    /**
     * \brief 将 0 视为“未指定”，返回结构化条目的实际数量。
     */
    pub fn structure_count(&self, requested: Option<usize>) -> usize {
        requested.filter(|n| *n > 0).unwrap_or(self.default_count)
    }

    pub fn mcq_count(&self, requested: Option<usize>) -> usize {
        requested.filter(|n| *n > 0).unwrap_or(self.mcq_default_count)
    }
}

/**
 * \brief 数据库文件路径，可通过 CURRICULA_DB 覆盖。
 */
pub fn database_path() -> String {
    std::env::var("CURRICULA_DB").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string())
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    parse_or(std::env::var(key).ok().as_deref(), default)
}

fn parse_or<T: FromStr>(raw: Option<&str>, default: T) -> T {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_falls_back_on_garbage() {
        assert_eq!(parse_or::<u64>(Some(" 45 "), 30), 45);
        assert_eq!(parse_or::<u64>(Some("soon"), 30), 30);
        assert_eq!(parse_or::<u32>(None, 1), 1);
    }

    #[test]
    fn test_zero_count_means_default() {
        let config = FetchConfig::default();
        assert_eq!(config.structure_count(Some(0)), 10);
        assert_eq!(config.structure_count(Some(5)), 5);
        assert_eq!(config.mcq_count(None), 10);
    }
}

use std::{fs::OpenOptions, io::Write, path::PathBuf};

use anyhow::Result;
use once_cell::sync::Lazy;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

static TELEMETRY_ENABLED: Lazy<std::sync::RwLock<bool>> =
    Lazy::new(|| std::sync::RwLock::new(false));

static LOG_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("CURRICULA_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("logs"))
});

/**
 * \brief 更新运维日志开关。
 */
pub fn set_enabled(enabled: bool) {
    if let Ok(mut guard) = TELEMETRY_ENABLED.write() {
        *guard = enabled;
    }
}

pub fn is_enabled() -> bool {
    TELEMETRY_ENABLED.read().map(|g| *g).unwrap_or(false)
}

/**
 * \brief 记录常规事件，如抓取成功、Provider 变更。
 */
pub fn log_event(category: &str, message: &str) {
    log_line("INFO", category, message);
}

/**
 * \brief 记录可恢复的异常，如走兜底数据的原因。
 */
pub fn log_warn(category: &str, message: &str) {
    log_line("WARN", category, message);
}

pub fn log_error(category: &str, message: &str) {
    log_line("ERROR", category, message);
}

fn log_line(level: &str, category: &str, message: &str) {
    if !is_enabled() {
        return;
    }
    if let Err(err) = write_line(level, category, message) {
        eprintln!("telemetry write failed: {}", err);
    }
}

fn write_line(level: &str, category: &str, message: &str) -> Result<()> {
    if !LOG_DIR.exists() {
        std::fs::create_dir_all(LOG_DIR.as_path())?;
    }
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(LOG_DIR.join("curricula.log"))?;
    writeln!(
        file,
        "{} [{}] {} - {}",
        timestamp,
        level,
        category,
        message.replace('\n', " ")
    )?;
    Ok(())
}

use anyhow::{bail, Result};
use rusqlite::{params, types::Type, Connection, ErrorCode, OptionalExtension, Row};
use std::{thread, time::Duration};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::config;
use crate::models::{CanonicalItem, Dialect, McqRecord, Provider};

const PROVIDER_COLUMNS: &str = "id, name, api_base, api_key, model, dialect, is_active";

/**
 * \brief 已入库的结构化条目。
 */
#[derive(Debug, Clone)]
pub struct StoredStructure {
    pub id: i64,
    /** \brief 类别键，见 `StructureKind::key` */
    pub kind: String,
    /** \brief 上级条目名称，顶层为空串 */
    pub parent: String,
    pub name: String,
}

/**
 * \brief 抓取尝试记录。
 */
#[derive(Debug, Clone)]
pub struct FetchLog {
    pub id: i64,
    pub kind: String,
    pub context: String,
    pub provider_id: Option<i64>,
    pub item_count: i64,
    /** \brief 走兜底数据时的原因，成功时为 None */
    pub fallback_reason: Option<String>,
    pub created_at: String,
}

/**
 * \brief 打开默认数据库文件（CURRICULA_DB，默认 curricula.db）。
 */
pub fn open_default_db() -> Result<Connection> {
    let conn = Connection::open(config::database_path())?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/**
 * \brief 运行数据库迁移，创建必要表结构。
 */
pub fn migrate(conn: &Connection) -> Result<()> {
    retry_on_locked(|| {
        conn.execute_batch(
            r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS providers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            api_base TEXT NOT NULL,
            api_key  TEXT NOT NULL,
            model    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS app_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS structures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            parent TEXT NOT NULL DEFAULT '',
            name TEXT NOT NULL,
            UNIQUE(kind, parent, name)
        );

        CREATE TABLE IF NOT EXISTS mcqs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            question TEXT NOT NULL UNIQUE,
            options TEXT NOT NULL,
            correct_option INTEGER NOT NULL CHECK (correct_option BETWEEN 0 AND 3),
            explanation TEXT NOT NULL,
            subject TEXT NOT NULL,
            chapter TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS fetch_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            context TEXT NOT NULL,
            provider_id INTEGER,
            item_count INTEGER NOT NULL,
            fallback_reason TEXT,
            created_at TEXT NOT NULL
        );
        "#,
        )
    })?;

    ensure_column(
        conn,
        "providers",
        "dialect",
        "ALTER TABLE providers ADD COLUMN dialect TEXT NOT NULL DEFAULT 'chat-completions'",
    )?;
    ensure_column(
        conn,
        "providers",
        "is_active",
        "ALTER TABLE providers ADD COLUMN is_active INTEGER NOT NULL DEFAULT 0",
    )?;
    retry_on_locked(|| {
        conn.execute_batch(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_providers_single_active
                ON providers(is_active) WHERE is_active = 1;",
        )
    })?;
    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, column: &str, ddl: &str) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(());
        }
    }
    retry_on_locked(|| conn.execute(ddl, []))?;
    Ok(())
}

fn set_bool_config(conn: &Connection, key: &str, value: bool) -> Result<()> {
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO app_config (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, if value { "1" } else { "0" }],
        )
    })?;
    Ok(())
}

fn get_bool_config(conn: &Connection, key: &str, default: bool) -> Result<bool> {
    let val = conn
        .query_row(
            "SELECT value FROM app_config WHERE key=?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(val.map(|s| s == "1").unwrap_or(default))
}

fn provider_from_row(row: &Row<'_>) -> rusqlite::Result<Provider> {
    let dialect: String = row.get(5)?;
    let dialect = dialect.parse::<Dialect>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into())
    })?;
    Ok(Provider {
        id: row.get(0)?,
        name: row.get(1)?,
        api_base: row.get(2)?,
        api_key: row.get(3)?,
        model: row.get(4)?,
        dialect,
        is_active: row.get::<_, i64>(6)? != 0,
    })
}

/**
 * \brief 新增 Provider（默认不启用）。
 * \param dialect 为 None 时根据 api_base 推断一次并落库。
 */
pub fn insert_provider(
    conn: &Connection,
    name: &str,
    api_base: &str,
    api_key: &str,
    model: &str,
    dialect: Option<Dialect>,
) -> Result<i64> {
    let dialect = dialect.unwrap_or_else(|| Dialect::detect(api_base));
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO providers (name, api_base, api_key, model, dialect, is_active) VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![name, api_base, api_key, model, dialect.as_str()],
        )
    })?;
    Ok(conn.last_insert_rowid())
}

/**
 * \brief 更新 Provider，不改变启用状态。
 */
pub fn update_provider(
    conn: &Connection,
    id: i64,
    name: &str,
    api_base: &str,
    api_key: &str,
    model: &str,
    dialect: Option<Dialect>,
) -> Result<()> {
    let dialect = dialect.unwrap_or_else(|| Dialect::detect(api_base));
    let rows = retry_on_locked(|| {
        conn.execute(
            "UPDATE providers SET name=?1, api_base=?2, api_key=?3, model=?4, dialect=?5 WHERE id=?6",
            params![name, api_base, api_key, model, dialect.as_str(), id],
        )
    })?;
    if rows == 0 {
        bail!("provider id {} not found", id);
    }
    Ok(())
}

pub fn delete_provider(conn: &Connection, id: i64) -> Result<()> {
    retry_on_locked(|| conn.execute("DELETE FROM providers WHERE id=?1", params![id]))?;
    Ok(())
}

/**
 * \brief 列出所有 Provider。
 */
pub fn list_providers(conn: &Connection) -> Result<Vec<Provider>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM providers ORDER BY id ASC",
        PROVIDER_COLUMNS
    ))?;
    let rows = stmt
        .query_map([], provider_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_provider_by_id(conn: &Connection, id: i64) -> Result<Option<Provider>> {
    conn.query_row(
        &format!("SELECT {} FROM providers WHERE id=?1", PROVIDER_COLUMNS),
        params![id],
        provider_from_row,
    )
    .optional()
    .map_err(Into::into)
}

/**
 * \brief 读取当前启用的 Provider（若无，返回 None）。
 */
pub fn get_active_provider(conn: &Connection) -> Result<Option<Provider>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM providers WHERE is_active=1 ORDER BY id ASC LIMIT 1",
            PROVIDER_COLUMNS
        ),
        [],
        provider_from_row,
    )
    .optional()
    .map_err(Into::into)
}

/**
 * \brief 启用指定 Provider，同一事务内停用其余所有 Provider。
 */
pub fn activate_provider(conn: &Connection, id: i64) -> Result<()> {
    if get_provider_by_id(conn, id)?.is_none() {
        bail!("provider id {} not found", id);
    }
    retry_on_locked(|| {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE providers SET is_active=0 WHERE is_active=1 AND id<>?1",
            params![id],
        )?;
        tx.execute("UPDATE providers SET is_active=1 WHERE id=?1", params![id])?;
        tx.commit()
    })?;
    Ok(())
}

pub fn deactivate_providers(conn: &Connection) -> Result<()> {
    retry_on_locked(|| conn.execute("UPDATE providers SET is_active=0 WHERE is_active=1", []))?;
    Ok(())
}

/**
 * \brief 读取运维日志开关。
 */
pub fn get_telemetry_enabled(conn: &Connection) -> Result<bool> {
    get_bool_config(conn, "telemetry_enabled", false)
}

pub fn set_telemetry_enabled(conn: &Connection, enabled: bool) -> Result<()> {
    set_bool_config(conn, "telemetry_enabled", enabled)
}

/**
 * \brief 写入结构化条目，(kind, parent, name) 冲突时跳过。
 * \return 实际新增的行数。
 */
pub fn upsert_structures(
    conn: &Connection,
    kind: &str,
    parent: &str,
    items: &[CanonicalItem],
) -> Result<usize> {
    let inserted = retry_on_locked(|| {
        let tx = conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO structures (kind, parent, name) VALUES (?1, ?2, ?3)
             ON CONFLICT(kind, parent, name) DO NOTHING",
            )?;
            for item in items {
                inserted += stmt.execute(params![kind, parent, item.name])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    })?;
    Ok(inserted)
}

/**
 * \brief 列出结构化条目，parent 为 None 时不按上级过滤。
 */
pub fn list_structures(
    conn: &Connection,
    kind: &str,
    parent: Option<&str>,
) -> Result<Vec<StoredStructure>> {
    fn map_row(row: &Row<'_>) -> rusqlite::Result<StoredStructure> {
        Ok(StoredStructure {
            id: row.get(0)?,
            kind: row.get(1)?,
            parent: row.get(2)?,
            name: row.get(3)?,
        })
    }

    let rows = if let Some(parent) = parent {
        let mut stmt = conn.prepare(
            "SELECT id, kind, parent, name FROM structures WHERE kind=?1 AND parent=?2 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![kind, parent], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    } else {
        let mut stmt = conn.prepare(
            "SELECT id, kind, parent, name FROM structures WHERE kind=?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![kind], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };
    Ok(rows)
}

/**
 * \brief 写入单选题，题干重复时跳过。
 */
pub fn upsert_mcqs(conn: &Connection, records: &[McqRecord]) -> Result<usize> {
    let encoded = records
        .iter()
        .map(|r| serde_json::to_string(&r.options).map(|options| (r, options)))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let inserted = retry_on_locked(|| {
        let tx = conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO mcqs (question, options, correct_option, explanation, subject, chapter)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(question) DO NOTHING",
            )?;
            for (record, options) in &encoded {
                inserted += stmt.execute(params![
                    record.question,
                    options,
                    record.correct_option,
                    record.explanation,
                    record.subject,
                    record.chapter
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    })?;
    Ok(inserted)
}

pub fn list_mcqs(conn: &Connection, subject: Option<&str>) -> Result<Vec<McqRecord>> {
    fn map_row(row: &Row<'_>) -> rusqlite::Result<McqRecord> {
        let options: String = row.get(1)?;
        let options = serde_json::from_str::<[String; 4]>(&options)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into()))?;
        Ok(McqRecord {
            question: row.get(0)?,
            options,
            correct_option: row.get(2)?,
            explanation: row.get(3)?,
            subject: row.get(4)?,
            chapter: row.get(5)?,
        })
    }

    let sql = "SELECT question, options, correct_option, explanation, subject, chapter FROM mcqs";
    let mut stmt;
    let rows = match subject {
        Some(subject) => {
            stmt = conn.prepare(&format!("{} WHERE subject=?1 ORDER BY id ASC", sql))?;
            stmt.query_map(params![subject], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
        None => {
            stmt = conn.prepare(&format!("{} ORDER BY id ASC", sql))?;
            stmt.query_map([], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };
    Ok(rows)
}

/**
 * \brief 记录一次抓取尝试。
 */
pub fn record_fetch(
    conn: &Connection,
    kind: &str,
    context: &str,
    provider_id: Option<i64>,
    item_count: usize,
    fallback_reason: Option<&str>,
) -> Result<i64> {
    let created_at = OffsetDateTime::now_utc().format(&Rfc3339)?;
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO fetch_logs (kind, context, provider_id, item_count, fallback_reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                kind,
                context,
                provider_id,
                item_count as i64,
                fallback_reason,
                created_at
            ],
        )
    })?;
    Ok(conn.last_insert_rowid())
}

/**
 * \brief 按时间倒序读取最近的抓取记录。
 */
pub fn list_fetch_logs(conn: &Connection, limit: usize) -> Result<Vec<FetchLog>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, context, provider_id, item_count, fallback_reason, created_at
         FROM fetch_logs ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok(FetchLog {
                id: row.get(0)?,
                kind: row.get(1)?,
                context: row.get(2)?,
                provider_id: row.get(3)?,
                item_count: row.get(4)?,
                fallback_reason: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/**
 * \brief 针对 SQLite 锁冲突的重试助手。
 * \details 捕获 busy/locked 错误并线性退避，最多尝试 6 次。
 */
fn retry_on_locked<T, F>(mut action: F) -> Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    const MAX_RETRIES: usize = 5;
    let mut attempt = 0;
    loop {
        match action() {
            Ok(value) => return Ok(value),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) && attempt < MAX_RETRIES =>
            {
                attempt += 1;
                thread::sleep(Duration::from_millis(200 * attempt as u64));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

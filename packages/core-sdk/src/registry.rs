use rusqlite::Connection;

use crate::{db, models::Provider, telemetry};

/**
 * \brief 返回当前唯一启用且带密钥的 Provider。
 * \details 查询失败、无启用项或缺少密钥都视为正常结果 None，由上层走兜底数据。
 */
pub fn active_provider(conn: &Connection) -> Option<Provider> {
    match db::get_active_provider(conn) {
        Ok(Some(provider)) if provider.has_credential() => Some(provider),
        Ok(Some(provider)) => {
            telemetry::log_warn(
                "registry",
                &format!(
                    "active provider id={} name={} has no credential",
                    provider.id, provider.name
                ),
            );
            None
        }
        Ok(None) => None,
        Err(err) => {
            telemetry::log_error("registry", &format!("active provider lookup failed: {}", err));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::migrate(&conn).expect("migrate");
        conn
    }

    #[test]
    fn test_none_without_active_provider() {
        let conn = mem_conn();
        db::insert_provider(&conn, "idle", "https://api.openai.com/v1", "sk", "gpt", None)
            .expect("insert");
        assert!(active_provider(&conn).is_none());
    }

    #[test]
    fn test_returns_active_provider() {
        let conn = mem_conn();
        let id = db::insert_provider(&conn, "live", "https://api.openai.com/v1", "sk", "gpt", None)
            .expect("insert");
        db::activate_provider(&conn, id).expect("activate");
        let provider = active_provider(&conn).expect("active provider");
        assert_eq!(provider.id, id);
        assert!(provider.is_active);
    }

    #[test]
    fn test_active_provider_without_credential_is_ignored() {
        let conn = mem_conn();
        let id = db::insert_provider(&conn, "keyless", "https://api.openai.com/v1", "  ", "gpt", None)
            .expect("insert");
        db::activate_provider(&conn, id).expect("activate");
        assert!(active_provider(&conn).is_none());
    }

    #[test]
    fn test_lookup_failure_is_not_surfaced() {
        // no migration: the providers table does not exist
        let conn = Connection::open_in_memory().expect("open in-memory db");
        assert!(active_provider(&conn).is_none());
    }
}

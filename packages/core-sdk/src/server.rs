use anyhow::Result;
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{
    config::FetchConfig,
    db,
    models::{CanonicalItem, Dialect, McqRecord, StructureKind},
    pipeline, registry, telemetry,
};

static FETCH_CONFIG: Lazy<FetchConfig> = Lazy::new(FetchConfig::from_env);

/**
 * \brief 启动本地管理 API 服务。
 * \param addr 监听地址，如 "127.0.0.1:5173"
 */
pub async fn run(addr: &str) -> Result<()> {
    let conn = db::open_default_db()?;
    db::migrate(&conn)?;
    telemetry::set_enabled(db::get_telemetry_enabled(&conn)?);
    drop(conn);

    let app = Router::new()
        .route("/api/config", get(get_config).post(set_config))
        .route("/api/providers", get(get_providers).post(create_provider))
        .route(
            "/api/providers/{id}",
            put(update_provider).delete(delete_provider),
        )
        .route("/api/providers/{id}/activate", post(activate_provider))
        .route("/api/structures", get(list_structures))
        .route("/api/structures/fetch", post(fetch_structures))
        .route("/api/mcqs", get(list_mcqs))
        .route("/api/mcqs/generate", post(generate_mcqs))
        .route("/api/fetch-logs", get(list_fetch_logs))
        .route("/api/health", get(health_check));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

#[derive(Deserialize, Debug)]
struct ProviderRequest {
    name: String,
    api_base: String,
    api_key: String,
    model: String,
    /** \brief 为空时根据 api_base 推断 */
    #[serde(default)]
    dialect: Option<String>,
    #[serde(default)]
    activate: Option<bool>,
}

#[derive(Serialize, Debug)]
struct ProviderItem {
    id: i64,
    name: String,
    api_base: String,
    model: String,
    dialect: Dialect,
    has_credential: bool,
    is_active: bool,
}

#[derive(Serialize, Debug)]
struct ProvidersState {
    providers: Vec<ProviderItem>,
    active_provider_id: Option<i64>,
    telemetry_enabled: bool,
}

#[derive(Deserialize, Debug)]
struct ConfigInput {
    telemetry_enabled: bool,
}

#[derive(Deserialize, Debug)]
struct FetchRequest {
    /** \brief boards / universities / subjects / chapters / streams / structure:<label> */
    kind: String,
    context: String,
    #[serde(default)]
    count: Option<usize>,
    /** \brief 入库时的上级条目名称 */
    #[serde(default)]
    parent: Option<String>,
    /** \brief 是否写入数据库（默认 true） */
    #[serde(default)]
    persist: Option<bool>,
}

#[derive(Serialize, Debug)]
struct FetchResponse {
    kind: String,
    items: Vec<CanonicalItem>,
    fallback: Option<String>,
    inserted: usize,
}

#[derive(Deserialize, Debug)]
struct StructureQuery {
    kind: String,
    parent: Option<String>,
}

#[derive(Serialize, Debug)]
struct StructureDto {
    id: i64,
    kind: String,
    parent: String,
    name: String,
}

#[derive(Deserialize, Debug)]
struct McqRequest {
    topic: String,
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    persist: Option<bool>,
}

#[derive(Serialize, Debug)]
struct McqResponse {
    questions: Vec<McqRecord>,
    fallback: Option<String>,
    inserted: usize,
}

#[derive(Deserialize, Debug)]
struct McqQuery {
    subject: Option<String>,
}

#[derive(Deserialize, Debug)]
struct FetchLogQuery {
    limit: Option<usize>,
}

#[derive(Serialize, Debug)]
struct FetchLogDto {
    id: i64,
    kind: String,
    context: String,
    provider_id: Option<i64>,
    item_count: i64,
    fallback_reason: Option<String>,
    created_at: String,
}

fn build_provider_state(conn: &rusqlite::Connection) -> Result<ProvidersState> {
    let providers = db::list_providers(conn)?;
    let telemetry_enabled = db::get_telemetry_enabled(conn)?;
    let active_provider_id = providers.iter().find(|p| p.is_active).map(|p| p.id);
    let items = providers
        .into_iter()
        .map(|p| ProviderItem {
            has_credential: p.has_credential(),
            id: p.id,
            name: p.name,
            api_base: p.api_base,
            model: p.model,
            dialect: p.dialect,
            is_active: p.is_active,
        })
        .collect();
    telemetry::set_enabled(telemetry_enabled);
    Ok(ProvidersState {
        providers: items,
        active_provider_id,
        telemetry_enabled,
    })
}

fn parse_dialect(raw: Option<&str>) -> Result<Option<Dialect>, (StatusCode, String)> {
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<Dialect>())
        .transpose()
        .map_err(bad_request)
}

async fn get_config() -> ApiResult<ProvidersState> {
    let conn = db::open_default_db().map_err(internal_err)?;
    let state = build_provider_state(&conn).map_err(internal_err)?;
    Ok(Json(state))
}

/**
 * \brief 更新运维日志开关。
 */
async fn set_config(Json(input): Json<ConfigInput>) -> ApiResult<ProvidersState> {
    let conn = db::open_default_db().map_err(internal_err)?;
    db::set_telemetry_enabled(&conn, input.telemetry_enabled).map_err(internal_err)?;
    telemetry::set_enabled(input.telemetry_enabled);
    let state = build_provider_state(&conn).map_err(internal_err)?;
    Ok(Json(state))
}

async fn get_providers() -> ApiResult<ProvidersState> {
    let conn = db::open_default_db().map_err(internal_err)?;
    let state = build_provider_state(&conn).map_err(internal_err)?;
    Ok(Json(state))
}

/**
 * \brief 新增 Provider，可选立即启用。
 */
async fn create_provider(Json(payload): Json<ProviderRequest>) -> ApiResult<ProvidersState> {
    let dialect = parse_dialect(payload.dialect.as_deref())?;
    let conn = db::open_default_db().map_err(internal_err)?;
    let id = db::insert_provider(
        &conn,
        &payload.name,
        &payload.api_base,
        &payload.api_key,
        &payload.model,
        dialect,
    )
    .map_err(internal_err)?;
    if payload.activate.unwrap_or(false) {
        db::activate_provider(&conn, id).map_err(internal_err)?;
    }
    telemetry::log_event(
        "server.provider",
        &format!("create id={} name={}", id, payload.name),
    );
    let state = build_provider_state(&conn).map_err(internal_err)?;
    Ok(Json(state))
}

async fn update_provider(
    Path(id): Path<i64>,
    Json(payload): Json<ProviderRequest>,
) -> ApiResult<ProvidersState> {
    let dialect = parse_dialect(payload.dialect.as_deref())?;
    let conn = db::open_default_db().map_err(internal_err)?;
    db::update_provider(
        &conn,
        id,
        &payload.name,
        &payload.api_base,
        &payload.api_key,
        &payload.model,
        dialect,
    )
    .map_err(internal_err)?;
    if payload.activate.unwrap_or(false) {
        db::activate_provider(&conn, id).map_err(internal_err)?;
    }
    telemetry::log_event(
        "server.provider",
        &format!("update id={} name={}", id, payload.name),
    );
    let state = build_provider_state(&conn).map_err(internal_err)?;
    Ok(Json(state))
}

async fn delete_provider(Path(id): Path<i64>) -> ApiResult<ProvidersState> {
    let conn = db::open_default_db().map_err(internal_err)?;
    db::delete_provider(&conn, id).map_err(internal_err)?;
    telemetry::log_event("server.provider", &format!("delete id={}", id));
    let state = build_provider_state(&conn).map_err(internal_err)?;
    Ok(Json(state))
}

/**
 * \brief 启用指定 Provider，其余自动停用。
 */
async fn activate_provider(Path(id): Path<i64>) -> ApiResult<ProvidersState> {
    let conn = db::open_default_db().map_err(internal_err)?;
    db::activate_provider(&conn, id).map_err(internal_err)?;
    telemetry::log_event("server.provider", &format!("activate id={}", id));
    let state = build_provider_state(&conn).map_err(internal_err)?;
    Ok(Json(state))
}

/**
 * \brief 通过 AI 抓取结构化条目并（默认）写入数据库。
 * \details 兜底数据只返回给调用方，不入库。
 */
async fn fetch_structures(Json(req): Json<FetchRequest>) -> ApiResult<FetchResponse> {
    let kind: StructureKind = req.kind.parse().map_err(bad_request)?;
    let count = FETCH_CONFIG.structure_count(req.count);
    let conn = db::open_default_db().map_err(internal_err)?;
    let provider = registry::active_provider(&conn);

    let fetch =
        pipeline::fetch_structure(provider.as_ref(), &kind, &req.context, count, &FETCH_CONFIG)
            .await;

    let parent = req.parent.unwrap_or_default();
    let inserted = if req.persist.unwrap_or(true) {
        let items = pipeline::persistable_structures(&kind, &fetch);
        db::upsert_structures(&conn, &kind.key(), parent.trim(), &items).map_err(internal_err)?
    } else {
        0
    };
    db::record_fetch(
        &conn,
        &kind.key(),
        &req.context,
        provider.as_ref().map(|p| p.id),
        fetch.items.len(),
        fetch.fallback.as_deref(),
    )
    .map_err(internal_err)?;
    telemetry::log_event(
        "server.fetch",
        &format!(
            "kind={} parent={} items={} inserted={}",
            kind,
            parent,
            fetch.items.len(),
            inserted
        ),
    );

    Ok(Json(FetchResponse {
        kind: kind.key(),
        items: fetch.items,
        fallback: fetch.fallback,
        inserted,
    }))
}

async fn list_structures(Query(q): Query<StructureQuery>) -> ApiResult<Vec<StructureDto>> {
    let kind: StructureKind = q.kind.parse().map_err(bad_request)?;
    let conn = db::open_default_db().map_err(internal_err)?;
    let rows =
        db::list_structures(&conn, &kind.key(), q.parent.as_deref()).map_err(internal_err)?;
    Ok(Json(
        rows.into_iter()
            .map(|s| StructureDto {
                id: s.id,
                kind: s.kind,
                parent: s.parent,
                name: s.name,
            })
            .collect(),
    ))
}

/**
 * \brief 生成单选题并（默认）写入题库。
 */
async fn generate_mcqs(Json(req): Json<McqRequest>) -> ApiResult<McqResponse> {
    if req.topic.trim().is_empty() {
        return Err(bad_request("topic must not be empty"));
    }
    let count = FETCH_CONFIG.mcq_count(req.count);
    let conn = db::open_default_db().map_err(internal_err)?;
    let provider = registry::active_provider(&conn);

    let fetch = pipeline::generate_mcqs(provider.as_ref(), &req.topic, count, &FETCH_CONFIG).await;

    let inserted = if req.persist.unwrap_or(true) {
        db::upsert_mcqs(&conn, &pipeline::persistable_mcqs(&fetch)).map_err(internal_err)?
    } else {
        0
    };
    db::record_fetch(
        &conn,
        "mcq",
        &req.topic,
        provider.as_ref().map(|p| p.id),
        fetch.questions.len(),
        fetch.fallback.as_deref(),
    )
    .map_err(internal_err)?;

    Ok(Json(McqResponse {
        questions: fetch.questions,
        fallback: fetch.fallback,
        inserted,
    }))
}

async fn list_mcqs(Query(q): Query<McqQuery>) -> ApiResult<Vec<McqRecord>> {
    let conn = db::open_default_db().map_err(internal_err)?;
    let rows = db::list_mcqs(&conn, q.subject.as_deref()).map_err(internal_err)?;
    Ok(Json(rows))
}

async fn list_fetch_logs(Query(q): Query<FetchLogQuery>) -> ApiResult<Vec<FetchLogDto>> {
    let conn = db::open_default_db().map_err(internal_err)?;
    let logs = db::list_fetch_logs(&conn, q.limit.unwrap_or(50)).map_err(internal_err)?;
    Ok(Json(
        logs.into_iter()
            .map(|l| FetchLogDto {
                id: l.id,
                kind: l.kind,
                context: l.context,
                provider_id: l.provider_id,
                item_count: l.item_count,
                fallback_reason: l.fallback_reason,
                created_at: l.created_at,
            })
            .collect(),
    ))
}

/**
 * \brief 健康检查：返回数据库可用性与当前启用的 Provider。
 */
async fn health_check() -> ApiResult<serde_json::Value> {
    let conn = db::open_default_db().map_err(internal_err)?;
    let provider = registry::active_provider(&conn);
    Ok(Json(serde_json::json!({
        "ok": true,
        "active_provider": provider.map(|p| serde_json::json!({
            "id": p.id,
            "name": p.name,
            "dialect": p.dialect,
            "model": p.model,
        })),
    })))
}

fn internal_err<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn bad_request<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}

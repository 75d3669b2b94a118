use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use curricula_core_sdk::{
    config::FetchConfig,
    db,
    models::{Dialect, StructureKind},
    pipeline, registry, server, telemetry,
};

/**
 * \brief 管理端 CLI：配置 Provider、抓取结构化条目、生成题目、启动 API 服务。
 */
#[derive(Parser, Debug)]
#[command(name = "curricula", version, about = "AI-assisted curriculum taxonomy admin")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 新增 Provider 并设为启用。
     */
    Init {
        #[arg(long, default_value = "default")]
        name: String,
        #[arg(long)]
        api_base: String,
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        model: String,
        /// chat-completions | generate-content; inferred from --api-base when omitted
        #[arg(long)]
        dialect: Option<Dialect>,
        #[arg(long, default_value_t = false)]
        enable_telemetry: bool,
    },

    /**
     * \brief 列出已配置的 Provider。
     */
    Providers,

    /**
     * \brief 启用指定 Provider。
     */
    Activate {
        #[arg(long)]
        id: i64,
    },

    /**
     * \brief 抓取结构化条目，默认写入数据库。
     */
    Fetch {
        /// boards | universities | subjects | chapters | streams | structure:<label>
        #[arg(long)]
        kind: String,
        #[arg(long)]
        context: String,
        #[arg(long)]
        count: Option<usize>,
        #[arg(long, default_value = "")]
        parent: String,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /**
     * \brief 生成单选题，默认写入题库。
     */
    Mcq {
        #[arg(long)]
        topic: String,
        #[arg(long)]
        count: Option<usize>,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /**
     * \brief 启动本地管理 API 服务。
     */
    Serve {
        #[arg(long, default_value = "127.0.0.1:5173")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let conn = db::open_default_db().context("open database failed")?;
    db::migrate(&conn).context("apply migrations failed")?;
    let telemetry_enabled = db::get_telemetry_enabled(&conn).unwrap_or(false);
    telemetry::set_enabled(telemetry_enabled);
    let config = FetchConfig::from_env();

    match cli.command {
        Commands::Init {
            name,
            api_base,
            api_key,
            model,
            dialect,
            enable_telemetry,
        } => {
            let provider_id = db::insert_provider(&conn, &name, &api_base, &api_key, &model, dialect)
                .context("save provider failed")?;
            db::activate_provider(&conn, provider_id).context("activate provider failed")?;
            db::set_telemetry_enabled(&conn, enable_telemetry).context("save telemetry failed")?;
            telemetry::set_enabled(enable_telemetry);
            let provider = db::get_provider_by_id(&conn, provider_id)?
                .context("provider vanished after insert")?;
            println!(
                "Saved provider id={} (name={} | {} | {} | {})",
                provider.id, provider.name, provider.dialect, provider.api_base, provider.model
            );
        }
        Commands::Providers => {
            for p in db::list_providers(&conn).context("list providers failed")? {
                println!(
                    "{}{:>4}  {:<16} {:<17} {:<24} {}",
                    if p.is_active { "*" } else { " " },
                    p.id,
                    p.name,
                    p.dialect,
                    p.model,
                    p.api_base
                );
            }
        }
        Commands::Activate { id } => {
            db::activate_provider(&conn, id).context("activate provider failed")?;
            println!("Activated provider id={}", id);
        }
        Commands::Fetch {
            kind,
            context,
            count,
            parent,
            dry_run,
        } => {
            let kind: StructureKind = kind.parse()?;
            let count = config.structure_count(count);
            let provider = registry::active_provider(&conn);

            let fetch =
                pipeline::fetch_structure(provider.as_ref(), &kind, &context, count, &config).await;
            if let Some(reason) = &fetch.fallback {
                eprintln!("provider unavailable, showing fallback data: {}", reason);
            }
            for item in &fetch.items {
                println!("{}", item.name);
            }

            if !dry_run {
                let items = pipeline::persistable_structures(&kind, &fetch);
                let inserted = db::upsert_structures(&conn, &kind.key(), parent.trim(), &items)
                    .context("save items failed")?;
                eprintln!("inserted {} new {}", inserted, kind.label());
            }
            db::record_fetch(
                &conn,
                &kind.key(),
                &context,
                provider.as_ref().map(|p| p.id),
                fetch.items.len(),
                fetch.fallback.as_deref(),
            )
            .context("record fetch failed")?;
            telemetry::log_event(
                "cli.fetch",
                &format!("kind={} items={} dry_run={}", kind, fetch.items.len(), dry_run),
            );
        }
        Commands::Mcq {
            topic,
            count,
            dry_run,
        } => {
            let count = config.mcq_count(count);
            let provider = registry::active_provider(&conn);

            let fetch = pipeline::generate_mcqs(provider.as_ref(), &topic, count, &config).await;
            if let Some(reason) = &fetch.fallback {
                eprintln!("provider unavailable, showing fallback data: {}", reason);
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&fetch.questions).context("encode questions failed")?
            );

            if !dry_run {
                let inserted = db::upsert_mcqs(&conn, &pipeline::persistable_mcqs(&fetch))
                    .context("save questions failed")?;
                eprintln!("inserted {} new questions", inserted);
            }
            db::record_fetch(
                &conn,
                "mcq",
                &topic,
                provider.as_ref().map(|p| p.id),
                fetch.questions.len(),
                fetch.fallback.as_deref(),
            )
            .context("record fetch failed")?;
        }
        Commands::Serve { addr } => {
            drop(conn);
            server::run(&addr).await?;
        }
    }

    Ok(())
}

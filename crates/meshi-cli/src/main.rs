//! meshi - compute unit のエントリポイント
//!
//! 1 回の起動で 1 つのことをして終わるコマンド（`run`, `notify-new`, `tick`, ...）と、
//! 常駐するコマンド（`scheduler`, `serve`）があります。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use meshi_core::app::{SchedulerLoop, Services, Target};
use meshi_core::config::AppConfig;
use meshi_core::domain::TaskKind;
use meshi_core::observability::init_tracing;
use meshi_core::repo::{MasterRow, MasterTable};
use serde_json::json;

#[derive(Parser)]
#[command(name = "meshi", version, about = "Restaurant listing scraper and geo search API")]
struct Cli {
    /// TOML 設定ファイル（省略時は既定値）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// ログを JSON で出す
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 単一ファイル DB を作り、スキーマを流す
    InitDb,
    /// 指定 kind の driver を 1 回だけ動かす
    Run {
        /// RegisterPages | ScrapingAbstract | ScrapingDetail
        kind: TaskKind,
    },
    /// 新着店舗を通知する
    NotifyNew,
    /// 期限の来たスケジュールを 1 回だけ発火させる
    Tick,
    /// `tick` を一定間隔で回し続ける（Ctrl-C で停止）
    Scheduler,
    /// 読み取り API を起動する
    Serve {
        /// 設定の `api.bind` を上書きする
        #[arg(long)]
        bind: Option<String>,
    },
    /// task を投入する
    Enqueue {
        #[command(subcommand)]
        what: EnqueueCommand,
    },
    /// マスタデータ（`[{code, name, parent_code}]` の JSON）を取り込む
    ImportReference { table: MasterTable, file: PathBuf },
}

#[derive(Subcommand)]
enum EnqueueCommand {
    /// 小エリアごとに RegisterPages を投入する
    RegisterPages {
        #[arg(required = true)]
        small_area_codes: Vec<String>,
        /// 1 件ずつ 1 分刻みの one-shot スケジュールで起こす
        #[arg(long)]
        fan_out: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = AppConfig::load(cli.config.as_deref()).context("loading config")?;
    let services = Services::from_config(config).context("wiring services")?;

    match cli.command {
        Command::InitDb => {
            services.init_db().await?;
            tracing::info!("database initialised");
        }
        Command::Run { kind } => {
            let target = services.driver_target(kind)?;
            let envelope = target.invoke(json!({ "source": "cli", "kind": kind })).await;
            println!("{}", serde_json::to_string(&envelope)?);
        }
        Command::NotifyNew => {
            let envelope = services.notify_target().invoke(json!({ "source": "cli" })).await;
            println!("{}", serde_json::to_string(&envelope)?);
        }
        Command::Tick => {
            let report = services.runner()?.tick(services.clock.now()).await?;
            println!(
                "{}",
                json!({ "fired": report.fired, "unknown": report.unknown, "removed": report.removed })
            );
        }
        Command::Scheduler => {
            let every = Duration::from_secs(services.config.scheduler.tick_secs.max(1));
            let runner = Arc::new(services.runner()?);
            let handle = SchedulerLoop::spawn(runner, services.clock.clone(), every);
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            tracing::info!("stopping scheduler");
            handle.shutdown_and_join().await;
        }
        Command::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| services.config.api.bind.clone());
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            meshi_core::api::serve(listener, services.api_state(), async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        }
        Command::Enqueue {
            what: EnqueueCommand::RegisterPages {
                small_area_codes,
                fan_out,
            },
        } => {
            let enqueued = services
                .enqueue_register_pages(&small_area_codes, fan_out)
                .await?;
            println!(
                "{}",
                json!({
                    "keys": enqueued.keys,
                    "inserted": enqueued.inserted,
                    "scheduled": enqueued.fan_out.as_ref().map(|f| f.created + f.existing),
                    "first_at": enqueued.fan_out.and_then(|f| f.first_at),
                })
            );
        }
        Command::ImportReference { table, file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let rows: Vec<MasterRow> = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", file.display()))?;
            let affected = services.import_reference(table, &rows).await?;
            println!("{}", json!({ "table": table.as_str(), "rows": rows.len(), "affected": affected }));
        }
    }
    Ok(())
}

pub mod cache;
pub mod cli;
pub mod clients;
pub mod config;
pub mod constants;
pub mod db;
pub mod entities;
pub mod matching;
pub mod models;
pub mod state;
pub mod strategy;
pub mod sync;
pub mod timecode;
pub mod video;
pub mod workers;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands, LoopArgs, PolicyArg};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

pub use config::Config;
use db::PartFilters;
use state::AppContext;
use workers::LoopOptions;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    run_with_config(config).await
}

pub async fn run_with_config(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let cli = Cli::parse();

    let stage_dir = stage_dir_for(&config, cli.command.as_ref());
    let _log_guard = init_logging(&config, stage_dir)?;

    execute_command(cli, config).await
}

/// Worker commands log to their own directory under `workers/`; one-shot
/// commands only log to stderr.
fn stage_dir_for(config: &Config, command: Option<&Commands>) -> Option<PathBuf> {
    let stage = match command? {
        Commands::Find { .. } => "source/find".to_string(),
        Commands::Download { platform, .. } => format!("source/download/{platform}"),
        Commands::TorrentStatus { .. } => workers::download::torrent::STAGE.to_string(),
        Commands::Timing { .. } => "timing".to_string(),
        Commands::Difficulty { .. } => "difficulty".to_string(),
        Commands::Quizpart { .. } => "quizpart".to_string(),
        _ => return None,
    };
    Some(
        config
            .resources_dir()
            .join(constants::WORKERS_DIR)
            .join(stage),
    )
}

/// Brief output to stderr, precise output to the worker's rotating log
/// file. External libraries are capped below our own level in both.
fn init_logging(
    config: &Config,
    stage_dir: Option<PathBuf>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let mut log_level = config.general.log_level.clone();
    log_level.push_str(",sqlx=warn,sea_orm=warn,hyper_util=warn,reqwest=warn");
    if config.general.suppress_connection_errors {
        log_level.push_str(",reqwest::retry=off");
    }

    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let registry = tracing_subscriber::registry().with(stderr_layer);

    if let Some(dir) = stage_dir {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating log dir {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(&dir, ".log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file_filter =
            EnvFilter::new("debug,sqlx=info,sea_orm=info,hyper_util=info,reqwest=info");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_filter(file_filter);
        registry.with(file_layer).init();
        Ok(Some(guard))
    } else {
        registry.init();
        Ok(None)
    }
}

fn loop_options(config: &Config, args: LoopArgs) -> LoopOptions {
    let w = &config.workers;
    LoopOptions {
        interval: Duration::from_secs(args.interval.unwrap_or(w.interval_seconds)),
        wait: Duration::from_secs(args.wait.unwrap_or(w.wait_seconds)),
        ban_duration: Duration::from_secs(
            args.ban_duration
                .unwrap_or(config.downloads.ban_duration_seconds),
        ),
        startup_delay: Duration::from_secs(args.startup_delay.unwrap_or(w.startup_delay_seconds)),
    }
}

/// Run a worker loop until it fails or SIGINT arrives; SIGINT is a clean
/// exit. In-flight external work (queued torrents especially) survives and
/// is picked up again on restart.
async fn run_until_shutdown<F>(worker: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = anyhow::Result<()>>,
{
    tokio::select! {
        result = worker => result,
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    }
}

async fn execute_command(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }

        Some(Commands::Find { loop_args }) => {
            let opts = loop_options(&config, loop_args);
            let ctx = Arc::new(AppContext::new(config).await?);
            run_until_shutdown(workers::find::run(ctx, opts)).await
        }

        Some(Commands::Download {
            platform,
            loop_args,
        }) => {
            let opts = loop_options(&config, loop_args);
            let ctx = Arc::new(AppContext::new(config).await?);
            run_until_shutdown(workers::download::run(ctx, &platform, opts)).await
        }

        Some(Commands::TorrentStatus { interval }) => {
            let ctx = Arc::new(AppContext::new(config).await?);
            run_until_shutdown(workers::torrent_status::run(
                ctx,
                Duration::from_secs(interval),
            ))
            .await
        }

        Some(Commands::Timing { loop_args }) => {
            let opts = loop_options(&config, loop_args);
            let ctx = Arc::new(AppContext::new(config).await?);
            run_until_shutdown(workers::timing::run(ctx, opts)).await
        }

        Some(Commands::Difficulty { loop_args }) => {
            let opts = loop_options(&config, loop_args);
            let ctx = Arc::new(AppContext::new(config).await?);
            run_until_shutdown(workers::difficulty::run(ctx, opts)).await
        }

        Some(Commands::Quizpart {
            loop_args,
            filters,
            style,
            keep_demoted,
        }) => {
            let opts = loop_options(&config, loop_args);
            let maker = video::maker_for(&style, &config.static_dir())
                .with_context(|| format!("unknown style {style:?}"))?;
            let ctx = Arc::new(AppContext::new(config).await?);
            let worker = workers::quizpart::QuizPartWorker {
                maker,
                filters: PartFilters {
                    category: filters.category,
                    anime_ids: filters.anime_ids,
                    source_strategies: filters.source_strategies,
                    styles: vec![style],
                },
                keep_demoted,
            };
            run_until_shutdown(workers::quizpart::run(ctx, worker, opts)).await
        }

        Some(Commands::Assemble {
            filters,
            timing_strategies,
            difficulty_strategies,
            styles,
            count,
            output,
            policy,
            memory,
        }) => {
            for style in &styles {
                anyhow::ensure!(
                    video::known_styles().contains(&style.as_str()),
                    "unknown style {style:?}"
                );
            }
            let ctx = AppContext::new(config).await?;
            let part_filters = PartFilters {
                category: filters.category,
                anime_ids: filters.anime_ids,
                source_strategies: filters.source_strategies,
                styles,
            };
            let policy = match policy {
                PolicyArg::Simple => workers::quiz::RandomPolicy::Simple,
                PolicyArg::Memory => workers::quiz::RandomPolicy::Memory(memory),
            };
            workers::quiz::assemble(
                &ctx,
                &part_filters,
                &timing_strategies,
                &difficulty_strategies,
                count,
                policy,
                &output,
            )
            .await?;
            Ok(())
        }

        Some(Commands::Cleanup) => {
            let ctx = AppContext::new(config).await?;
            workers::cleanup::run(&ctx).await
        }

        Some(Commands::AodUpdate) => {
            let ctx = AppContext::new(config).await?;
            clients::offline_db::update(&ctx.store).await?;
            Ok(())
        }

        Some(Commands::Init) => {
            if Config::create_default_if_missing()? {
                println!("Config file created. Edit config.toml and run again.");
            } else {
                println!("config.toml already exists.");
            }
            Ok(())
        }
    }
}

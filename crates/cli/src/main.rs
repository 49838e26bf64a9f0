mod config_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    batchcast_config::{BatchcastConfig, Severity},
    batchcast_pipeline::{PipelineSettings, YtDlpFetcher},
    clap::{Parser, Subcommand},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "batchcast", about = "batchcast: batch video publisher for Telegram channels")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (skips discovery of ./batchcast.toml and ~/.config/batchcast/).
    #[arg(long, global = true, env = "BATCHCAST_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot (default when no subcommand is provided).
    Run,
    /// Validate the configuration file and report errors/warnings.
    CheckConfig {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load the explicit `--config` file, or discover one; then apply env overrides.
fn load_config(cli: &Cli) -> anyhow::Result<(BatchcastConfig, Option<PathBuf>)> {
    let (mut config, path) = match &cli.config {
        Some(path) => {
            let config = batchcast_config::load_config(path)
                .with_context(|| format!("loading {}", path.display()))?;
            (config, Some(path.clone()))
        },
        None => (
            batchcast_config::discover_and_load(),
            batchcast_config::find_config_file(),
        ),
    };
    batchcast_config::apply_env_overrides(&mut config);
    Ok((config, path))
}

async fn run(config: BatchcastConfig) -> anyhow::Result<()> {
    let result = batchcast_config::validate(&config);
    for d in &result.diagnostics {
        match d.severity {
            Severity::Error => error!("{d}"),
            Severity::Warning => warn!("{d}"),
            Severity::Info => debug!("{d}"),
        }
    }
    if result.has_errors() {
        anyhow::bail!(
            "configuration has {} error(s); run `batchcast check-config` for details",
            result.count(Severity::Error)
        );
    }

    let fetcher = YtDlpFetcher::new(config.fetcher.clone());
    if !fetcher.is_available().await {
        warn!(
            command = %config.fetcher.command,
            "fetch tool not found; every item will fail until it is installed"
        );
    }

    let settings = PipelineSettings::from_config(&config);
    info!(
        allowlist = settings.allowlist.len(),
        work_dir = %settings.work_dir.display(),
        policy = ?settings.rate_limit_policy,
        "pipeline configured"
    );

    let shutdown = CancellationToken::new();
    let poller = batchcast_telegram::start_polling(
        &config.telegram,
        settings,
        Arc::new(fetcher),
        shutdown.clone(),
    )
    .await
    .context("starting telegram bot")?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown requested");
            shutdown.cancel();
        },
        _ = shutdown.cancelled() => {},
    }

    poller.await.context("polling task failed")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "batchcast starting");

    let (config, path) = load_config(&cli)?;

    match cli.command {
        None | Some(Commands::Run) => run(config).await,
        Some(Commands::CheckConfig { verbose }) => {
            config_commands::check(&config, path.as_deref(), verbose)
        },
    }
}

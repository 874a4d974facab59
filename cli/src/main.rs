use clap::Parser;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use tether_cli::commands::{cli, inspect, script, simulate};
use tether_cli::error::CliError;
use tether_core::api::{self as core_api, MemoryStore, SharedStore, SystemClock, TrackerConfig};
use tether_plugins::factory;

const EVENTS_OUT_GRACE: Duration = Duration::from_secs(5);

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = match args.config.as_deref() {
        Some(path) => core_api::load_explicit(&expand_home(path))
            .map_err(|e| CliError::Config(e.to_string()))?,
        None => core_api::load_default().map_err(|e| CliError::Config(e.to_string()))?,
    };
    init_tracing(&cfg.logging).map_err(CliError::Command)?;

    dispatch(args.command, cfg).await
}

async fn dispatch(cmd: cli::Commands, cfg: TrackerConfig) -> Result<i32, CliError> {
    match cmd {
        cli::Commands::Simulate(sim_args) => {
            let text = if sim_args.script == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                std::fs::read_to_string(&sim_args.script)?
            };
            let steps = script::parse_script(&text)?;

            let store: SharedStore = if sim_args.ephemeral {
                Arc::new(MemoryStore::new())
            } else {
                factory::build_store(&cfg).await?
            };
            let (forward, events_out) = factory::build_sink(&cfg).await?;

            // run_steps consumes the only other sender, so the writer can drain.
            let records = simulate::run_steps(cfg, store, Some(forward), &steps).await?;
            if let Some(events_out) = events_out {
                events_out.close(EVENTS_OUT_GRACE).await;
            }
            let mut stdout = std::io::stdout().lock();
            for record in records {
                writeln!(stdout, "{record}")?;
            }
            Ok(0)
        }
        cli::Commands::Inspect(inspect_args) => {
            let store = factory::build_store(&cfg).await?;
            let report = inspect::inspect_store(store.as_ref(), &SystemClock).await?;
            let rendered = if inspect_args.json {
                serde_json::to_string(&report)
            } else {
                serde_json::to_string_pretty(&report)
            }
            .map_err(|e| CliError::Command(e.to_string()))?;
            println!("{rendered}");
            Ok(0)
        }
        cli::Commands::Clear(clear_args) => {
            let store = factory::build_store(&cfg).await?;
            let removed = inspect::clear_store(store.as_ref(), clear_args.key.as_deref()).await?;
            println!("cleared {}", removed.join(", "));
            Ok(0)
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

fn init_tracing(logging: &core_api::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("tether"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("tether.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    // stdout carries command output, so console logs go to stderr.
    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

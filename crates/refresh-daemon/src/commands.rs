//! Command implementations for the refresh daemon.
//!
//! Handles:
//! - start: load config, build components, schedule the refresh job, wait for a signal
//! - run-once: one cycle with a per-repository summary
//! - config: print the effective configuration

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use refresh_embeddings::{CandleEmbedder, EmbeddingModel, ModelCache};
use refresh_indexing::{CodeIndexer, IndexerConfig};
use refresh_pipeline::{CycleReport, FanOutScheduler, RepositoryPipeline};
use refresh_scheduler::{create_refresh_job, RefreshJobConfig, SchedulerConfig, SchedulerService};
use refresh_types::Settings;
use refresh_vector::VectorStore;
use refresh_workspace::{GitWorkspaceConfig, GitWorkspaceProvider};

use crate::cli::RunOnceArgs;

/// CLI values applied on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub log_level: Option<String>,
    pub repositories: Vec<String>,
    pub collection_name: Option<String>,
    pub persist_directory: Option<String>,
    pub max_concurrency: Option<usize>,
}

impl SettingsOverrides {
    fn from_run_once(log_level: Option<&str>, args: &RunOnceArgs) -> Self {
        Self {
            log_level: log_level.map(str::to_string),
            repositories: args.repos.clone(),
            collection_name: args.collection.clone(),
            persist_directory: args.persist_dir.clone(),
            max_concurrency: args.max_concurrency,
        }
    }

    fn apply(&self, settings: &mut Settings) {
        if let Some(level) = &self.log_level {
            settings.log_level = level.clone();
        }
        if !self.repositories.is_empty() {
            settings.repositories = self.repositories.clone();
        }
        if let Some(name) = &self.collection_name {
            settings.collection_name = name.clone();
        }
        if let Some(dir) = &self.persist_directory {
            settings.persist_directory = dir.clone();
        }
        if let Some(n) = self.max_concurrency {
            settings.max_concurrency = n;
        }
    }
}

/// Load layered settings, apply CLI overrides, and validate.
pub fn load_settings(config_path: Option<&str>, overrides: &SettingsOverrides) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    overrides.apply(&mut settings);
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

fn init_logging(level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Build the provider, indexer, pipeline and fan-out pool.
async fn build_fanout(settings: &Settings) -> Result<Arc<FanOutScheduler>> {
    let workspace_root = settings.expanded_workspace_root();
    std::fs::create_dir_all(&workspace_root)
        .with_context(|| format!("Failed to create workspace root {:?}", workspace_root))?;
    let provider = Arc::new(GitWorkspaceProvider::new(GitWorkspaceConfig::from_settings(
        settings,
    )));

    let cache = ModelCache::for_model(
        settings.embeddings.model.clone(),
        settings.expanded_model_cache_dir(),
    );
    info!(model = %settings.embeddings.model, "Loading embedding model");
    let embedder = tokio::task::spawn_blocking(move || CandleEmbedder::load(&cache))
        .await
        .context("Embedding model loader panicked")?
        .context("Failed to load embedding model")?;
    let embedder: Arc<dyn EmbeddingModel> = Arc::new(embedder);

    let store = Arc::new(VectorStore::from_settings(&settings.vector_store));
    let indexer = Arc::new(CodeIndexer::new(
        embedder,
        store,
        IndexerConfig::from_settings(settings),
    ));

    let pipeline = RepositoryPipeline::new(provider, indexer).with_retry_settings(&settings.retry);
    Ok(Arc::new(FanOutScheduler::new(
        Arc::new(pipeline),
        settings.max_concurrency,
    )))
}

fn log_settings(settings: &Settings) {
    info!("Configuration:");
    info!("  Repositories: {}", settings.repositories.len());
    info!("  Collection: {}", settings.collection_target());
    info!("  Workspace root: {:?}", settings.expanded_workspace_root());
    info!("  Max concurrency: {}", settings.max_concurrency);
    info!("  Vector backend: {:?}", settings.vector_store.backend);
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Run the scheduler until a shutdown signal arrives.
pub async fn start_daemon(config_path: Option<&str>, log_level: Option<&str>) -> Result<()> {
    let overrides = SettingsOverrides {
        log_level: log_level.map(str::to_string),
        ..Default::default()
    };
    let settings = load_settings(config_path, &overrides)?;
    init_logging(&settings.log_level)?;

    info!("Refresh daemon starting...");
    log_settings(&settings);

    let fanout = build_fanout(&settings).await?;

    let config = SchedulerConfig::from_trigger(&settings.trigger)?;
    let mut scheduler = SchedulerService::new(config)
        .await
        .context("Failed to create scheduler")?;
    let job_name = create_refresh_job(&scheduler, fanout, RefreshJobConfig::from_settings(&settings))
        .await
        .context("Failed to register refresh job")?;

    scheduler.start().await.context("Failed to start scheduler")?;

    if settings.trigger.run_on_start {
        info!(job = %job_name, "Running initial cycle");
        scheduler.trigger(&job_name)?;
    }

    shutdown_signal().await;

    scheduler
        .shutdown()
        .await
        .context("Scheduler shutdown failed")?;

    if let Some(status) = scheduler.registry().get_status(&job_name) {
        info!(
            job = %job_name,
            runs = status.run_count,
            errors = status.error_count,
            skipped = status.skip_count,
            "Refresh daemon stopped"
        );
    }
    Ok(())
}

/// Run one cycle and print a summary.
///
/// Fails only for setup errors, or with `--fail-on-error` when a repository failed.
pub async fn run_once(
    config_path: Option<&str>,
    log_level: Option<&str>,
    args: RunOnceArgs,
) -> Result<()> {
    let overrides = SettingsOverrides::from_run_once(log_level, &args);
    let settings = load_settings(config_path, &overrides)?;
    init_logging(&settings.log_level)?;
    log_settings(&settings);

    let fanout = build_fanout(&settings).await?;

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        })
    };

    let cycle = fanout
        .run_all(&settings.references(), &settings.collection_target(), &cancel)
        .await;
    watcher.abort();

    print!("{}", format_summary(&cycle));

    if args.fail_on_error && !cycle.is_clean() {
        anyhow::bail!(
            "{} of {} repositories failed",
            cycle.failed(),
            cycle.len()
        );
    }
    Ok(())
}

/// Print the effective configuration as TOML.
pub fn print_config(config_path: Option<&str>, log_level: Option<&str>) -> Result<()> {
    let overrides = SettingsOverrides {
        log_level: log_level.map(str::to_string),
        ..Default::default()
    };
    let settings = load_settings(config_path, &overrides)?;
    let rendered = toml::to_string_pretty(&settings).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}

fn format_summary(cycle: &CycleReport) -> String {
    let mut out = format!(
        "Cycle {}: {} succeeded, {} failed ({} ms)\n",
        cycle.cycle_id,
        cycle.succeeded(),
        cycle.failed(),
        cycle.duration_ms
    );
    for report in &cycle.reports {
        let detail = match &report.ingest {
            Some(ingest) => format!(
                " [{} files, {} chunks upserted, {} unchanged, {} removed]",
                ingest.files_indexed,
                ingest.chunks_upserted,
                ingest.chunks_unchanged,
                ingest.chunks_removed
            ),
            None => String::new(),
        };
        out.push_str(&format!(
            "  {:<60} {}{}\n",
            report.reference.as_str(),
            report.outcome,
            detail
        ));
    }
    out
}

// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod filters;
pub mod handler;
pub mod jobs;
pub mod logging;
pub mod report;
pub mod storage;
pub mod types;
pub mod worker;

use std::sync::Arc;

use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::errors::{ChangewatchError, Result};
use crate::filters::{BuiltinFilters, FilterSpec};
use crate::jobs::{Job, JobRegistry};
use crate::report::{FinishedReport, Report, Reporter, StdoutReporter};
use crate::storage::{CacheBackend, CacheLocation, GcReport};
use crate::worker::{SimilarityPolicy, WorkerPool};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and job construction
/// - the cache backend (opened once, closed once)
/// - one of: dry-run, job listing, cache gc, cache migration, or a full run
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;
    let registry = JobRegistry::with_builtins();
    let jobs = registry.build_jobs(&cfg)?;

    if args.dry_run {
        print_dry_run(&cfg, &jobs);
        return Ok(());
    }
    if args.list {
        print_jobs(&jobs);
        return Ok(());
    }

    let cache_spec = args.cache.as_deref().unwrap_or(&cfg.config.cache);
    let cache = CacheLocation::parse(cache_spec).open().await?;

    let result = run_with_cache(&args, &cfg, &registry, jobs, &cache).await;
    let closed = cache.close().await;
    result?;
    closed
}

async fn run_with_cache(
    args: &CliArgs,
    cfg: &ConfigFile,
    registry: &JobRegistry,
    jobs: Vec<Job>,
    cache: &CacheBackend,
) -> Result<()> {
    if let Some(source) = args.migrate_from.as_deref() {
        let copied = migrate(source, cache).await?;
        println!("migrated {copied} jobs from {source}");
        return Ok(());
    }

    if let Some(retain) = args.gc_cache {
        let retain = retain.unwrap_or(cfg.config.retain).max(1);
        let known = registry.known_guids(cfg)?;
        let report = cache.writer()?.gc(&known, retain).await?;
        print_gc_report(&report);
        return Ok(());
    }

    let width = args.workers.unwrap_or(cfg.config.workers);
    let finished = run_jobs(cfg, jobs, cache, width).await?;
    let shown = finished.filtered(&cfg.display);

    let reporters: Vec<Box<dyn Reporter>> = vec![Box::new(StdoutReporter::new(cfg.report.clone()))];
    report::submit_all(&reporters, &shown).await
}

/// Run `jobs` once against `cache` and return the finished report.
pub async fn run_jobs(
    cfg: &ConfigFile,
    jobs: Vec<Job>,
    cache: &CacheBackend,
    width: usize,
) -> Result<FinishedReport> {
    let storage = cache.writer()?;
    let auto = FilterSpec::parse_all(&cfg.config.auto_filters)
        .map_err(|e| ChangewatchError::ConfigError(format!("[config].auto_filters: {e}")))?;
    let filters = Arc::new(BuiltinFilters::with_auto_filters(auto));
    let policy = SimilarityPolicy::from(cfg.similarity);

    let pool = WorkerPool::new(width);
    let mut report = Report::new();
    pool.run_jobs(jobs, storage, filters, &policy, &mut report)
        .await?;

    let finished = report.finish().await;
    info!(
        jobs = finished.entries.len(),
        seconds = finished.duration.as_secs_f64(),
        "run complete"
    );
    Ok(finished)
}

/// Copy every guid of `source` into `target`, full history included.
pub async fn migrate(source: &str, target: &CacheBackend) -> Result<usize> {
    let source = CacheLocation::parse(source).open().await?;
    let writer = target.writer()?;
    let from = source.reader().backend_name();

    let entries = source.reader().backup().await;
    let closed = source.close().await;
    let entries = entries?;
    closed?;

    let count = entries.len();
    info!(
        from,
        to = writer.backend_name(),
        count,
        "migrating cache"
    );
    writer.restore(entries).await?;
    Ok(count)
}

fn print_gc_report(report: &GcReport) {
    for guid in &report.removed {
        println!("removed stale job {guid}");
    }
    for (guid, count) in &report.cleaned {
        println!("removed {count} old snapshots of {guid}");
    }
    if report.removed.is_empty() && report.cleaned.is_empty() {
        println!("cache is clean");
    }
}

fn print_jobs(jobs: &[Job]) {
    for job in jobs {
        println!("{:3}: {} [{}] {}", job.index + 1, job.pretty_name(), job.kind, job.guid);
    }
}

/// Simple dry-run output: print settings and jobs.
fn print_dry_run(cfg: &ConfigFile, jobs: &[Job]) {
    println!("changewatch dry-run");
    println!("  config.workers = {}", cfg.config.workers);
    println!("  config.cache = {}", cfg.config.cache);
    if !cfg.config.auto_filters.is_empty() {
        println!("  config.auto_filters = {:?}", cfg.config.auto_filters);
    }
    println!();

    println!("jobs ({} enabled of {}):", jobs.len(), cfg.job.len());
    for job in jobs {
        println!("  - {}", job.pretty_name());
        println!("      kind: {}", job.kind);
        println!("      location: {}", job.location);
        println!("      guid: {}", job.guid);
        if !job.filter.is_empty() {
            let specs: Vec<&str> = job.filter.iter().map(|f| f.as_str()).collect();
            println!("      filter: {specs:?}");
        }
        if !job.diff_filter.is_empty() {
            let specs: Vec<&str> = job.diff_filter.iter().map(|f| f.as_str()).collect();
            println!("      diff_filter: {specs:?}");
        }
        if let Some(ref tool) = job.diff_tool {
            println!("      diff_tool: {tool}");
        }
        if job.max_tries > 0 {
            println!("      max_tries: {}", job.max_tries);
        }
        if job.compared_versions > 1 {
            println!("      compared_versions: {}", job.compared_versions);
        }
    }

    debug!("dry-run complete (nothing fetched)");
}

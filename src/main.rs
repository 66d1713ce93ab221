// src/main.rs
// =============================================================================
// Entry point.
//
// 1. Parse the command line
// 2. Set up logging (RUST_LOG, or info / debug with --verbose)
// 3. Dispatch to the subcommand
// 4. Exit with 0 = success, 1 = crawl aborted, 2 = error
// =============================================================================

mod cache;
mod cli;
mod config;
mod crawl;
mod error;
mod extract;
mod normalize;
mod proxy;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, CrawlArgs, GatewayArgs};
use config::{CrawlSettings, GatewaySettings};
use crawl::{CacheReport, CrawlSummary, HarvestReport, ImportantLinks, SeedSources};
use proxy::Gateway;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Serve {
            gateway,
            listen,
            local_base,
            live_fallback,
        } => handle_serve(gateway, listen, &local_base, live_fallback).await,

        // The viewer is the same gateway with the network switched off
        Commands::View {
            gateway,
            listen,
            local_base,
        } => handle_serve(gateway, listen, &local_base, false).await,

        Commands::Crawl {
            crawl,
            seed,
            start_page,
            end_page,
            extra_urls,
            json_file,
            json_start_index,
            json_end_index,
            delay_ms,
            follow_depth,
            no_auto_pagination,
            json,
        } => {
            let mut settings = crawl_settings(&crawl)?;
            settings.delay = Duration::from_millis(delay_ms);
            settings.max_depth = follow_depth;
            settings.auto_pagination = !no_auto_pagination;

            let sources = SeedSources {
                template: seed,
                start_page,
                end_page,
                extra: extra_urls,
                json_file,
                json_start: json_start_index,
                json_end: json_end_index,
            };
            handle_crawl(settings, &sources, json).await
        }

        Commands::Extract {
            crawl,
            urls,
            json_file,
            no_append,
            json,
            no_cache,
            cache_concurrency,
        } => {
            let options = ExtractOptions {
                no_append,
                json,
                cache_concurrency: (!no_cache).then_some(cache_concurrency),
            };
            handle_extract(crawl_settings(&crawl)?, urls, json_file, options).await
        }
    }
}

async fn handle_serve(
    args: GatewayArgs,
    listen: SocketAddr,
    local_base: &str,
    live_fallback: bool,
) -> Result<i32> {
    let settings = GatewaySettings::new(
        &args.origin,
        args.allowed_host.as_deref(),
        local_base,
        &args.cache_dir,
        live_fallback,
    )
    .context("invalid gateway settings")?
    .with_timeout(Duration::from_secs(args.timeout_secs))
    .with_also_rewrite(args.also_rewrite);

    info!(
        "{} {} -> {} (cache {}, live fallback {})",
        if live_fallback { "proxying" } else { "viewing" },
        settings.origin,
        settings.local_base,
        settings.cache_dir.display(),
        if live_fallback { "on" } else { "off" }
    );

    let gateway = Gateway::new(settings).context("cannot open the cache")?;
    proxy::serve(Arc::new(gateway), listen).await?;
    Ok(0)
}

fn crawl_settings(args: &CrawlArgs) -> Result<CrawlSettings> {
    let mut settings =
        CrawlSettings::new(&args.origin, &args.proxy_base).context("invalid crawl settings")?;
    settings.concurrency = args.concurrency;
    settings.max_retries = args.max_retries;
    settings.default_max_page = args.default_max_page;
    settings.important_file = args.important_file.clone();
    settings.cache_dir = Some(args.cache_dir.clone());
    settings.validate().context("invalid crawl settings")?;
    Ok(settings)
}

async fn handle_crawl(settings: CrawlSettings, sources: &SeedSources, json: bool) -> Result<i32> {
    println!("🚀 Crawling {} via {}", settings.origin, settings.proxy_base);
    println!(
        "📊 Depth {}, concurrency {}, delay {:?}, max retries {}",
        settings.max_depth, settings.concurrency, settings.delay, settings.max_retries
    );

    let summary = crawl::run_crawl(settings, sources).await?;
    print_summary(&summary, json)?;

    Ok(if summary.aborted { 1 } else { 0 })
}

struct ExtractOptions {
    no_append: bool,
    json: bool,
    // None skips the cache pass
    cache_concurrency: Option<usize>,
}

async fn handle_extract(
    settings: CrawlSettings,
    mut urls: Vec<String>,
    json_file: Option<PathBuf>,
    options: ExtractOptions,
) -> Result<i32> {
    if json_file.is_some() {
        let sources = SeedSources {
            json_file,
            ..Default::default()
        };
        urls.extend(sources.collect(&settings.origin)?);
    }
    if urls.is_empty() {
        anyhow::bail!("no pages to harvest: pass URLs or --json-file");
    }

    let report = crawl::run_harvest(&settings, &urls).await?;

    let file = ImportantLinks::open(&settings.important_file)
        .with_context(|| format!("cannot read {}", settings.important_file.display()))?;
    let fresh: Vec<String> = if options.no_append {
        file.replace(&report.important).await?;
        report.important.iter().cloned().collect()
    } else {
        file.merge(&report.important).await?.into_iter().collect()
    };

    print_harvest(&report, fresh.len(), &settings.important_file, options.json)?;

    if let Some(concurrency) = options.cache_concurrency {
        if !fresh.is_empty() {
            let cached = crawl::run_cache_pass(&settings, &fresh, concurrency).await?;
            print_cache_pass(&cached, fresh.len(), options.json)?;
        }
    }
    Ok(0)
}

fn print_summary(summary: &CrawlSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!();
    println!("{}", "=".repeat(60));
    if summary.aborted {
        println!("⚠️  Crawl aborted: {}", summary.abort_reason.as_deref().unwrap_or("unknown"));
    } else {
        println!("✅ Crawl finished");
    }
    println!("   Already cached:  {}", summary.cached);
    println!("   Newly fetched:   {}", summary.fetched);
    println!("   Errors:          {}", summary.errors);
    println!("   URLs seen:       {}", summary.seen);
    if summary.important_added > 0 {
        println!("   Important added: {}", summary.important_added);
    }
    println!("{}", "=".repeat(60));
    Ok(())
}

fn print_harvest(report: &HarvestReport, added: usize, file: &std::path::Path, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    println!("📄 Pages harvested: {} ({} failed)", report.pages, report.failed);
    println!("🔗 Important links found: {}", report.important.len());
    println!("📝 {} written to {}", added, file.display());
    Ok(())
}

fn print_cache_pass(report: &CacheReport, total: usize, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("📦 Cached {} of {} new links ({} failed)", report.cached, total, report.failed);
    Ok(())
}

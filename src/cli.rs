// src/cli.rs
// =============================================================================
// Command-line interface, parsed with clap's derive API.
//
//   site-archiver serve    caching reverse proxy with live fallback
//   site-archiver view     read-only viewer over the same cache
//   site-archiver crawl    crawl the site through a running proxy
//   site-archiver extract  harvest docId/page links from given pages
//
// Flags that name an address or a directory can also come from the
// environment (ORIGIN, LOCAL_BASE, CACHE_DIR) so the proxy, the viewer and
// the crawler agree without repeating them.
// =============================================================================

use crate::config::{DEFAULT_ORIGIN, DEFAULT_PROXY_BASE, DEFAULT_VIEWER_BASE};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "site-archiver",
    version = "0.1.0",
    about = "Archive a single website through a caching proxy and browse it offline",
    long_about = "site-archiver mirrors one website into an on-disk cache. Run `serve` as a caching \
                  reverse proxy, point `crawl` at it to fill the cache, then browse the result \
                  with `view` without touching the network."
)]
pub struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the caching reverse proxy
    ///
    /// Example: site-archiver serve --origin https://example.com --listen 0.0.0.0:5002
    Serve {
        #[command(flatten)]
        gateway: GatewayArgs,

        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:5002")]
        listen: SocketAddr,

        /// Base URL clients use to reach this proxy; origin links are rewritten to it
        #[arg(long, env = "LOCAL_BASE", default_value = DEFAULT_PROXY_BASE)]
        local_base: String,

        /// Fetch from the origin on a cache miss (`--live-fallback false` to disable)
        #[arg(long, env = "LIVE_FALLBACK", default_value_t = true, action = clap::ArgAction::Set)]
        live_fallback: bool,
    },

    /// Serve the archive read-only, never touching the network
    ///
    /// Example: site-archiver view --also-rewrite http://localhost:5002
    View {
        #[command(flatten)]
        gateway: GatewayArgs,

        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:5003")]
        listen: SocketAddr,

        /// Base URL clients use to reach this viewer
        #[arg(long, default_value = DEFAULT_VIEWER_BASE)]
        local_base: String,
    },

    /// Crawl the site through a running proxy
    ///
    /// Example: site-archiver crawl --seed 'https://example.com/?mode=list&page=' --start-page 1 --end-page 20
    Crawl {
        #[command(flatten)]
        crawl: CrawlArgs,

        /// Paged seed template; the page number is appended to it
        #[arg(long)]
        seed: Option<String>,

        /// First page appended to --seed
        #[arg(long, default_value_t = 1)]
        start_page: u32,

        /// Last page appended to --seed (inclusive)
        #[arg(long, default_value_t = 1)]
        end_page: u32,

        /// Additional seed URLs
        #[arg(long, num_args = 1..)]
        extra_urls: Vec<String>,

        /// JSON file with seed URLs (array, or {"urls": [...]})
        #[arg(long)]
        json_file: Option<PathBuf>,

        /// First index taken from --json-file
        #[arg(long, default_value_t = 0)]
        json_start_index: usize,

        /// Index after the last one taken from --json-file
        #[arg(long)]
        json_end_index: Option<usize>,

        /// Pause before each request, in milliseconds
        #[arg(long, default_value_t = 500)]
        delay_ms: u64,

        /// How many link levels to follow from the seeds (0 = seeds only)
        #[arg(long, default_value_t = 3)]
        follow_depth: usize,

        /// Do not enqueue every page of a detected pagination
        #[arg(long)]
        no_auto_pagination: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Collect docId/page links from the given pages into the important-link file
    ///
    /// Example: site-archiver extract 'https://example.com/?mode=ETM&model=9923'
    Extract {
        #[command(flatten)]
        crawl: CrawlArgs,

        /// Pages to harvest
        urls: Vec<String>,

        /// JSON file with more pages to harvest
        #[arg(long)]
        json_file: Option<PathBuf>,

        /// Overwrite the important-link file instead of merging into it
        #[arg(long)]
        no_append: bool,

        /// Print the harvested links as JSON
        #[arg(long)]
        json: bool,

        /// Do not request the newly found links through the proxy
        #[arg(long)]
        no_cache: bool,

        /// Parallel requests while caching the new links
        #[arg(long, default_value_t = 10)]
        cache_concurrency: usize,
    },
}

/// Options shared by `serve` and `view`.
#[derive(Args, Debug)]
pub struct GatewayArgs {
    /// The website being archived
    #[arg(long, env = "ORIGIN", default_value = DEFAULT_ORIGIN)]
    pub origin: String,

    /// Host (and its subdomains) allowed through; defaults to the origin's host
    #[arg(long)]
    pub allowed_host: Option<String>,

    /// Directory holding the cached responses
    #[arg(long, env = "CACHE_DIR", default_value = "cache")]
    pub cache_dir: PathBuf,

    /// Upstream request timeout in seconds
    #[arg(long, default_value_t = 25)]
    pub timeout_secs: u64,

    /// Other base URLs to rewrite to the local base (e.g. the crawl proxy)
    #[arg(long, num_args = 1..)]
    pub also_rewrite: Vec<String>,
}

/// Options shared by `crawl` and `extract`.
#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// The website being archived
    #[arg(long, env = "ORIGIN", default_value = DEFAULT_ORIGIN)]
    pub origin: String,

    /// Base URL of the running proxy
    #[arg(long, env = "LOCAL_BASE", default_value = DEFAULT_PROXY_BASE)]
    pub proxy_base: String,

    /// Proxy cache directory, used to count already-archived pages
    #[arg(long, env = "CACHE_DIR", default_value = "cache")]
    pub cache_dir: PathBuf,

    /// Simultaneous requests to the proxy
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Attempts per URL before it counts as an error
    #[arg(long, default_value_t = 10)]
    pub max_retries: u32,

    /// Where discovered docId/page links are collected
    #[arg(long, default_value = "important_links.json")]
    pub important_file: PathBuf,

    /// Pages assumed per document when no pagination is found
    #[arg(long, default_value_t = 10)]
    pub default_max_page: u32,
}

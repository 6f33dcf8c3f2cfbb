mod config;
mod crawler;
mod dataset;
mod db;
mod error;
mod extract;
mod fetch;
mod record;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::CrawlTarget;
use crate::crawler::Crawler;
use crate::fetch::{DelayPolicy, Fetcher};

const DEFAULT_KEYWORD: &str = "cell+phone+cases";

#[derive(Parser)]
#[command(
    name = "amazon_scraper",
    about = "Amazon listing scraper with dynamic-schema SQLite loading"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one target's listing pages and write the JSON snapshot
    Crawl {
        /// Built-in target: by-category or by-keyword
        #[arg(short, long, conflicts_with = "config")]
        target: Option<String>,
        /// Custom crawl target described by a JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Max listing pages to fetch
        #[arg(short = 'n', long, default_value = "1")]
        pages: u32,
        /// Override the target's snapshot path
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Load a JSON snapshot into the products table
    Load {
        path: PathBuf,
    },
    /// Crawl both built-in targets and load their snapshots
    Run {
        /// Max listing pages per target
        #[arg(short = 'n', long, default_value = "1")]
        pages: u32,
    },
    /// Products table summary
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Crawl {
            target,
            config,
            pages,
            out,
        } => {
            let mut target = resolve_target(target.as_deref(), config.as_deref())?;
            target.page_limit = pages;
            if let Some(out) = out {
                target.data_path = out;
            }
            crawl_one(&target).await
        }
        Commands::Load { path } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            db::add_data_to_table(&conn, db::PRODUCTS_TABLE, &path)?;
            print_stats(&conn)
        }
        Commands::Run { pages } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            for mut target in [config::by_category(), config::by_keyword(DEFAULT_KEYWORD)] {
                target.page_limit = pages;
                crawl_one(&target).await?;
                db::add_data_to_table(&conn, db::PRODUCTS_TABLE, &target.data_path)?;
            }
            print_stats(&conn)
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn, db::PRODUCTS_TABLE)?;
            println!("Rows:    {}", s.rows);
            println!("Columns: {}", s.columns.join(", "));
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn crawl_one(target: &CrawlTarget) -> Result<()> {
    println!(
        "Crawling '{}' (up to {} pages)...",
        target.name, target.page_limit
    );
    let mut crawler = Crawler::new(Fetcher::new()?, DelayPolicy::default());
    let batch = crawler.products_scrape(target).await?;
    dataset::write_snapshot(&batch, &target.data_path)?;
    println!(
        "Saved {} products to {}",
        batch.len(),
        target.data_path.display()
    );
    Ok(())
}

fn print_stats(conn: &rusqlite::Connection) -> Result<()> {
    let s = db::get_stats(conn, db::PRODUCTS_TABLE)?;
    println!("{} rows in products ({} columns)", s.rows, s.columns.len());
    Ok(())
}

fn resolve_target(name: Option<&str>, config_path: Option<&Path>) -> Result<CrawlTarget> {
    match (name, config_path) {
        (_, Some(path)) => config::from_json_file(path),
        (Some("by-category") | None, None) => Ok(config::by_category()),
        (Some("by-keyword"), None) => Ok(config::by_keyword(DEFAULT_KEYWORD)),
        (Some(other), None) => anyhow::bail!(
            "unknown target '{}' (expected by-category or by-keyword)",
            other
        ),
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

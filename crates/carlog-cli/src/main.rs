use std::path::PathBuf;

use anyhow::Result;
use carlog_sync::{render_dashboard_with, Pipeline, PipelineConfig};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "carlog-cli")]
#[command(about = "Daily car listings log: scrape, merge, dashboard")]
struct Cli {
    /// YAML config file; `carlog.yaml` in the working directory is used when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape today's listings into the snapshot file.
    Scrape {
        #[arg(long)]
        pages: Option<usize>,
        #[arg(long)]
        max_workers: Option<usize>,
    },
    /// Merge the snapshot into the historical log.
    Merge,
    /// Regenerate the static dashboard from the historical log.
    Dashboard {
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Scrape, merge and render in one go.
    Run,
    /// Serve the rendered dashboard on localhost.
    Serve {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Scrape { pages, max_workers } => {
            if let Some(pages) = pages {
                config.scrape.pages = pages;
            }
            if let Some(max_workers) = max_workers {
                config.scrape.max_workers = max_workers;
            }
            let pipeline = Pipeline::new(config)?;
            let report = pipeline.scrape(Utc::now()).await?;
            println!(
                "scrape complete: scrape_date={} pages={} links={} rows={} failed={} snapshot={}",
                report.scrape_date,
                report.pages_fetched,
                report.links_found,
                report.details_ok,
                report.details_failed,
                pipeline.config().paths.snapshot.display()
            );
        }
        Commands::Merge => {
            let summary = carlog_sync::merge_files(&config.paths.history, &config.paths.snapshot)?;
            println!(
                "merge complete: before={} snapshot={} added={} duplicates={} after={}",
                summary.history_rows_before,
                summary.snapshot_rows,
                summary.rows_added,
                summary.duplicates_dropped,
                summary.history_rows_after
            );
        }
        Commands::Dashboard { out_dir } => {
            let out_dir = out_dir.unwrap_or_else(|| config.paths.output_dir.clone());
            let summary = render_dashboard_with(&config, &out_dir, Utc::now())?;
            println!(
                "dashboard complete: rows={} clean={} outliers={} price_range={:?}..={:?} assets={} out={}",
                summary.history_rows,
                summary.clean_rows,
                summary.outlier_rows,
                summary.price_lower,
                summary.price_upper,
                summary.assets,
                summary.output_dir
            );
        }
        Commands::Run => {
            let summary = Pipeline::new(config)?.run_once().await?;
            println!(
                "run complete: run_id={} scraped={} added={} history={} assets={} out={}",
                summary.run_id,
                summary.scrape.details_ok,
                summary.merge.rows_added,
                summary.merge.history_rows_after,
                summary.dashboard.assets,
                summary.dashboard.output_dir
            );
        }
        Commands::Serve { port, dir } => {
            let port = port.unwrap_or(config.preview_port);
            let dir = dir.unwrap_or_else(|| config.paths.output_dir.clone());
            carlog_web::serve_preview(dir, port).await?;
        }
    }

    Ok(())
}

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tally_core::{CancelToken, Categorization, Categorizer, Transaction};
use tally_finance::{
    CategorizationSummary, Period, apply_cost_or_income, period_overview, render_overview,
    write_keyword_stats_csv, write_labeled_csv, write_overview_csv,
};
use tally_ingest::read_statements;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod state;

use config::Config;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TALLY_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(name = "tally", version = VERSION, about = "Categorize bank statements by fuzzy keyword matching")]
struct Cli {
    /// Config file (default: ~/.tally/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a commented default config
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Categorize statements and write categorized.csv and keywords.csv
    Categorize {
        #[command(flatten)]
        run: RunArgs,

        /// Output directory (default: report.output_dir)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Per-category totals by period
    Overview {
        /// weekly, monthly, quarterly or yearly (default: report.overviews)
        #[arg(long)]
        period: Option<Period>,

        /// Add a leading Totals column
        #[arg(long)]
        totals: bool,

        #[command(flatten)]
        run: RunArgs,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Best score reached by every keyword, weakest first
    Keywords {
        #[command(flatten)]
        run: RunArgs,

        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
struct RunArgs {
    /// Statement files or directories (default: general.file_location)
    #[arg(long = "input", short = 'i')]
    inputs: Vec<PathBuf>,

    /// Minimum match score, 0-100
    #[arg(long)]
    threshold: Option<f64>,

    /// Worker threads, 0 = one per core
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Init { force } => {
            let p = config::init_config(config_path, force)?;
            println!("Wrote {}", p.display());
        }

        Command::Categorize { run, output, json } => {
            let cfg = config::load_config(config_path)?;
            let (result, fields) = categorize(&cfg, &run).await?;
            let threshold = run.threshold.unwrap_or(cfg.general.categorization_threshold);
            let summary = CategorizationSummary::new(&result, threshold);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{summary}");
            }

            let dir = output_dir(&cfg, output)?;
            write_labeled_csv(dir.join("categorized.csv"), &result.labeled, &fields)?;
            write_keyword_stats_csv(dir.join("keywords.csv"), &result.keyword_stats)?;
            if !json {
                println!("Wrote {}", dir.display());
            }
        }

        Command::Overview {
            period,
            totals,
            run,
            output,
        } => {
            let cfg = config::load_config(config_path)?;
            let periods = match period {
                Some(p) => vec![p],
                None => cfg.overview_periods()?,
            };
            let (result, _) = categorize(&cfg, &run).await?;
            let categories = cfg.rules()?.names();
            let include_totals = totals || cfg.report.include_totals;
            let dir = output_dir(&cfg, output)?;

            for period in periods {
                let overview = period_overview(
                    &result.labeled,
                    period,
                    &categories,
                    &cfg.general.category_exclusions,
                    include_totals,
                );
                println!("{}", render_overview(&overview));
                write_overview_csv(dir.join(format!("{period}_overview.csv")), &overview)?;
            }
        }

        Command::Keywords { run, json } => {
            let cfg = config::load_config(config_path)?;
            let (result, _) = categorize(&cfg, &run).await?;
            let stats = result.keyword_stats.sorted();
            if json {
                let map: Vec<_> = stats
                    .iter()
                    .map(|(k, s)| serde_json::json!({ "keyword": k, "best_score": s }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                for (keyword, score) in stats {
                    println!("{score:>3}  {keyword}");
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Read statements, apply the cost/income indicator and run the categorizer
/// on a blocking thread. Ctrl-C cancels the run.
async fn categorize(cfg: &Config, run: &RunArgs) -> Result<(Categorization, Vec<String>)> {
    let locations = if run.inputs.is_empty() {
        cfg.general.file_location.clone()
    } else {
        run.inputs.clone()
    };
    if locations.is_empty() {
        bail!("no statements given: pass --input or set general.file_location");
    }

    let layout = cfg.layout()?;
    let adjust = cfg.general.adjust_duplicates;
    let txns = tokio::task::spawn_blocking(move || {
        read_statements(locations.as_slice(), &layout, adjust)
    })
    .await
    .context("statement reader panicked")??;
    let txns = match cfg.cost_or_income() {
        Some(indicator) => apply_cost_or_income(&txns, &indicator),
        None => txns,
    };

    let fields = present_fields(&cfg.description_fields(), &txns);
    let threshold = run.threshold.unwrap_or(cfg.general.categorization_threshold);
    let workers = run.workers.unwrap_or(cfg.general.workers);

    let cancel = CancelToken::new();
    let categorizer = Categorizer::new(cfg.rules()?, &fields, threshold)?
        .with_workers(workers)
        .with_cancel_token(cancel.clone())
        .with_observer(progress_logger());
    debug!(?categorizer, "starting categorization");

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling categorization");
            cancel.cancel();
        }
    });
    let result = tokio::task::spawn_blocking(move || categorizer.run(&txns))
        .await
        .context("categorization task panicked")?;
    interrupt.abort();

    Ok((result?, fields))
}

/// Configured description fields that at least one transaction carries.
/// Falls back to the full list so the categorizer reports the problem.
fn present_fields(configured: &[String], txns: &[Transaction]) -> Vec<String> {
    let present: Vec<String> = configured
        .iter()
        .filter(|f| txns.iter().any(|t| t.has_field(f)))
        .cloned()
        .collect();
    if present.is_empty() {
        configured.to_vec()
    } else {
        present
    }
}

fn progress_logger() -> impl Fn(usize, usize) + Send + Sync + 'static {
    |done, total| {
        let step = (total / 10).max(1);
        if done % step == 0 || done == total {
            info!(done, total, "categorizing ({}%)", done * 100 / total.max(1));
        }
    }
}

fn output_dir(cfg: &Config, output: Option<PathBuf>) -> Result<PathBuf> {
    let dir = output.unwrap_or_else(|| cfg.report.output_dir.clone());
    ensure_dir(&dir)?;
    Ok(dir)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))
}

//! Command-line entry point for the risk scoring pipeline
//!
//! Usage:
//!   risk_pipeline run --store data --seed 42
//!   risk_pipeline questionnaire --answers answers.json
//!   risk_pipeline show --store data --user 5512345678
//!   risk_pipeline satisfaction --store data --user 5512345678 --rating "Satisfecho"

use access_risk_scoring::{
    data::{QuestionAnswer, UserId},
    pipeline::{PipelineContext, RiskPipeline, RunSummary},
    risk::{assess_questionnaire, RiskTier},
    store::{DocumentStore, RiskStore},
    utils::{load_config, setup_logging, PipelineConfig},
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "risk_pipeline")]
#[command(version, about = "Access-pattern risk scoring", long_about = None)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every user and upsert their risk records
    Run {
        /// Configuration file (TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Store directory, overrides the configuration
        #[arg(short, long)]
        store: Option<String>,

        /// Random seed, overrides the configuration
        #[arg(long)]
        seed: Option<u64>,

        /// Expected anomaly fraction, overrides the configuration
        #[arg(long)]
        contamination: Option<f64>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Tier an ordered questionnaire answer list
    Questionnaire {
        /// JSON file with `[{"question": ..., "answer": ...}, ...]`
        #[arg(short, long)]
        answers: PathBuf,
    },

    /// Print stored risk records
    Show {
        #[arg(short, long, default_value = "data")]
        store: PathBuf,

        /// Only this user
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Record a satisfaction rating on a user's profile
    Satisfaction {
        #[arg(short, long, default_value = "data")]
        store: PathBuf,

        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        rating: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            store,
            seed,
            contamination,
            json,
        } => {
            let mut config = match &config {
                Some(path) => load_config(path)
                    .with_context(|| format!("loading configuration from {}", path.display()))?,
                None => PipelineConfig::default(),
            }
            .apply_env_overrides()?;

            if let Some(path) = store {
                config.store.path = path;
            }
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(c) = contamination {
                config.detector.contamination = c;
            }

            setup_logging(log_level(cli.verbose, &config.logging.level));
            config.validate()?;

            run(config, json)
        }
        Commands::Questionnaire { answers } => {
            setup_logging(log_level(cli.verbose, "warn"));
            questionnaire(&answers)
        }
        Commands::Show { store, user } => {
            setup_logging(log_level(cli.verbose, "warn"));
            show(&store, user)
        }
        Commands::Satisfaction {
            store,
            user,
            rating,
        } => {
            setup_logging(log_level(cli.verbose, "info"));
            let store = DocumentStore::open(&store)
                .with_context(|| format!("opening store {}", store.display()))?;
            store.set_satisfaction(&UserId::new(user.as_str()), &rating)?;
            println!("Satisfaction recorded for {}", user.cyan());
            Ok(())
        }
    }
}

fn log_level(verbose: u8, configured: &str) -> &str {
    match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    }
}

fn run(config: PipelineConfig, json: bool) -> Result<()> {
    let store = DocumentStore::open(&config.store.path)
        .with_context(|| format!("opening store {}", config.store.path))?;
    info!(path = %config.store.path, seed = config.seed, "Configuration loaded");

    let ctx = PipelineContext::now(config.seed);
    let pipeline = RiskPipeline::new(&store, config);
    let summary = pipeline.run(&ctx).context("risk scoring run failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
        print_records(&store.records()?);
    }

    summary.into_result()?;
    Ok(())
}

fn questionnaire(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let answers: Vec<QuestionAnswer> = serde_json::from_str(&content)
        .context("answers must be a JSON list of question/answer pairs")?;

    let assessment = assess_questionnaire(&answers)?;
    let (code, label, color) = assessment.triple();

    println!("{}", "=== Questionnaire Risk ===".bold());
    println!("Affirmative answers: {}", assessment.affirmative);
    println!(
        "Tier: {} ({}, code {}, {})",
        tier_colored(assessment.tier),
        label,
        code,
        color
    );
    Ok(())
}

fn show(store: &Path, user: Option<String>) -> Result<()> {
    let store =
        DocumentStore::open(store).with_context(|| format!("opening store {}", store.display()))?;

    match user {
        Some(user) => {
            let user_id = UserId::new(user.as_str());
            match store.get_record(&user_id)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => bail!("no risk record for user {}", user_id),
            }
        }
        None => println!("{}", serde_json::to_string_pretty(&store.records()?)?),
    }
    Ok(())
}

fn tier_colored(tier: RiskTier) -> ColoredString {
    match tier {
        RiskTier::Low => tier.as_str().green(),
        RiskTier::Medium => tier.as_str().yellow(),
        RiskTier::High => tier.as_str().red().bold(),
    }
}

fn print_summary(summary: &RunSummary) {
    println!("{}", "=== Risk Scoring Run ===".bold());
    println!("Seed: {}", summary.seed);
    println!(
        "Events: {} ingested, {} rejected",
        summary.events_ingested, summary.events_rejected
    );
    if summary.legacy_flag_events > 0 {
        println!(
            "{}",
            format!(
                "{} events carry a misspelled simulated-anomaly field (ignored)",
                summary.legacy_flag_events
            )
            .yellow()
        );
    }
    println!("Anomalies flagged: {}", summary.anomalies_flagged);
    println!(
        "Users scored: {} ({} inserted, {} updated, {} unchanged)",
        summary.users_scored, summary.inserted, summary.updated, summary.unchanged
    );

    if let Some(eval) = &summary.evaluation {
        println!("\n{}", "Simulated vs detected:".bold());
        println!("{}", eval);
    }

    if !summary.forecast_failures.is_empty() {
        println!("\n{}", "No future-risk forecast:".bold());
        for (user_id, reason) in &summary.forecast_failures {
            println!("  {}: {}", user_id, reason);
        }
    }

    if !summary.unclassifiable.is_empty() {
        println!("\n{}", "Unclassifiable (no events, incomplete questionnaire):".yellow());
        for user_id in &summary.unclassifiable {
            println!("  {}", user_id);
        }
    }

    for (user_id, reason) in &summary.persistence_failures {
        println!("{} {}: {}", "Not persisted".red().bold(), user_id, reason);
    }
}

fn print_records(records: &[access_risk_scoring::fusion::RiskRecord]) {
    if records.is_empty() {
        return;
    }

    println!("\n{}", "=== Risk Records ===".bold());
    println!(
        "{:<16} {:>9}  {:<8} {:<14} {:<8}",
        "User", "Anomalies", "Current", "Source", "Future"
    );
    println!("{}", "-".repeat(60));

    for record in records {
        let future = record
            .future_risk_tier
            .map(tier_colored)
            .unwrap_or_else(|| "-".dimmed());
        println!(
            "{:<16} {:>9}  {:<8} {:<14} {:<8}",
            record.user_id.as_str(),
            record.anomaly_count,
            tier_colored(record.current_risk_tier),
            record.current_risk_source.to_string(),
            future
        );
    }
}

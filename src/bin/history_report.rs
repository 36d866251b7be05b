use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::Parser;
use live_appraisal::adapters::JsonlArchive;
use live_appraisal::core::HistoryArchive;
use live_appraisal::utils::logger;

#[derive(Parser)]
#[command(name = "history-report")]
#[command(about = "Print archived appraisal rounds")]
struct Args {
    /// Path to the JSON-lines archive
    #[arg(short, long, default_value = "./data/archive.jsonl")]
    archive: String,

    /// First day to include (YYYY-MM-DD), defaults to today
    #[arg(short, long)]
    since: Option<NaiveDate>,

    /// Print the rounds as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    let since = args.since.unwrap_or_else(|| Local::now().date_naive());
    tracing::debug!("📁 Reading {} since {}", args.archive, since);

    let archive = JsonlArchive::new(&args.archive);
    let rounds = archive
        .list_archived_rounds(since)
        .await
        .with_context(|| format!("reading archive {}", args.archive))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rounds)?);
        return Ok(());
    }

    if rounds.is_empty() {
        println!("No rounds archived since {}", since);
        return Ok(());
    }

    println!(
        "{:<10}  {:<6}  {:<30}  {:<12}  {:>6}  {:>14}",
        "date", "round", "item", "category", "count", "average"
    );
    for round in &rounds {
        println!(
            "{:<10}  {:<6}  {:<30}  {:<12}  {:>6}  {:>14.2}",
            round.session_date,
            round.round_id.0,
            round.item_name,
            round.category,
            round.submissions.len(),
            round.average
        );
    }
    println!("📊 {} round(s) since {}", rounds.len(), since);

    Ok(())
}

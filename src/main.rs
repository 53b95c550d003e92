//! Wayfarer 命令行入口
//!
//! - `wayfarer plan`：生成行程并打印（--json 输出完整响应）
//! - `wayfarer status <run_id>`：查询已结束的运行（需要 sqlite 存储）
//! - `wayfarer schema`：打印请求 / 响应的 JSON Schema

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use wayfarer::core::{create_planner_builder, PlanRequest, PlannerError, PreferenceValue};
use wayfarer::output::{narrate, request_schema_json, response_schema_json, ItineraryResponse};
use wayfarer::retrieval::InMemoryRetriever;

#[derive(Parser)]
#[command(name = "wayfarer")]
#[command(author, version, about = "Multi-stage travel itinerary planner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (defaults to config/default.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a trip
    Plan(PlanArgs),

    /// Look up a finished run by id
    Status { run_id: String },

    /// Print JSON Schema for request and response
    Schema,

    /// List the registered tools and their parameters
    Tools,
}

#[derive(Parser)]
struct PlanArgs {
    #[arg(long)]
    city: String,

    #[arg(long)]
    country: String,

    #[arg(long, default_value_t = 3)]
    days: u32,

    #[arg(long)]
    budget: Option<f64>,

    /// Preference, as key or key=value (repeatable)
    #[arg(long = "pref")]
    prefs: Vec<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    currency: Option<String>,

    /// Knowledge file: JSON array of {scope, snippet, source, metadata}
    #[arg(long, env = "WAYFARER_KNOWLEDGE")]
    knowledge: Option<PathBuf>,

    /// Print the full response as JSON
    #[arg(long)]
    json: bool,

    /// Stream a narrated walkthrough after planning
    #[arg(long)]
    narrate: bool,
}

fn parse_pref(raw: &str) -> (String, PreferenceValue) {
    match raw.split_once('=') {
        None => (raw.trim().to_string(), PreferenceValue::Flag(true)),
        Some((k, v)) => {
            let v = v.trim();
            let value = if let Ok(b) = v.parse::<bool>() {
                PreferenceValue::Flag(b)
            } else if let Ok(n) = v.parse::<f64>() {
                PreferenceValue::Number(n)
            } else {
                PreferenceValue::Text(v.to_string())
            };
            (k.trim().to_string(), value)
        }
    }
}

fn print_summary(resp: &ItineraryResponse) {
    println!("{} [{}]", resp.tour.title, resp.run_id);
    println!("{}\n", resp.tour.description);
    for day in &resp.tour.daily_plans {
        println!("Day {}: {} (walking {})", day.day, day.theme, day.estimated_walking);
        for item in &day.plan {
            println!(
                "  {}  {:<40} {:>8}  {:.2} {}",
                item.time, item.activity, item.duration, item.estimated_cost, resp.cost.currency
            );
        }
        println!("  tip: {}", day.tips);
    }
    println!(
        "\nTotal: {:.2} {}{}",
        resp.cost.total,
        resp.cost.currency,
        if resp.cost.within_budget { "" } else { " (over budget)" }
    );
    for notice in &resp.tour.notices {
        println!("[{:?}] {}", notice.severity, notice.message);
    }
}

async fn plan(config: Option<PathBuf>, args: PlanArgs) -> anyhow::Result<()> {
    let mut builder = create_planner_builder(config);
    if let Some(path) = &args.knowledge {
        let retriever = InMemoryRetriever::load_json(path)
            .with_context(|| format!("Failed to load knowledge file {}", path.display()))?;
        tracing::info!(documents = retriever.len(), "knowledge loaded");
        builder = builder.with_retriever(Arc::new(retriever));
    }
    let planner = builder.build().context("Failed to build planner")?;

    let mut request = PlanRequest::new(args.city, args.country, args.days);
    request.budget = args.budget;
    request.user_id = args.user;
    request.currency = args.currency;
    for raw in &args.prefs {
        let (k, v) = parse_pref(raw);
        request = request.with_preference(k, v);
    }

    let resp = match planner.generate_itinerary(request).await {
        Ok(r) => r,
        Err(PlannerError::RunFailed(failure)) => {
            eprintln!("Run {} failed: {}", failure.run_id, failure.reason);
            for rec in &failure.stage_history {
                eprintln!("  {} {} {:?}", rec.at.format("%H:%M:%S"), rec.stage, rec.outcome);
            }
            bail!("planning failed: {}", failure.reason);
        }
        Err(e) => return Err(e.into()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
    } else {
        print_summary(&resp);
    }

    if args.narrate {
        let llm = planner.llm();
        let mut stream = narrate(llm.as_ref(), &resp)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        println!();
        while let Some(fragment) = stream.next().await {
            match fragment {
                Ok(text) => print!("{}", text),
                Err(e) => {
                    tracing::warn!("narration stopped: {}", e);
                    break;
                }
            }
        }
        println!();
    }

    let (prompt, completion, total) = planner.llm().token_usage();
    if total > 0 {
        tracing::info!(prompt, completion, total, "llm token usage");
    }
    Ok(())
}

async fn status(config: Option<PathBuf>, run_id: &str) -> anyhow::Result<()> {
    let planner = create_planner_builder(config)
        .build()
        .context("Failed to build planner")?;
    let report = planner.get_run_status(run_id).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    wayfarer::observability::init(cli.verbose);

    match cli.command {
        Commands::Plan(args) => plan(cli.config, args).await,
        Commands::Status { run_id } => status(cli.config, &run_id).await,
        Commands::Schema => {
            println!("{}", request_schema_json());
            println!("{}", response_schema_json());
            Ok(())
        }
        Commands::Tools => {
            let builder = create_planner_builder(cli.config);
            println!("{}", builder.build_tool_registry().to_schema_json());
            Ok(())
        }
    }
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use summx::config::{default_config_path, write_default_config, Config, LogFormat, LoggingConfig};
use summx::llm::build_llm;
use summx::mcp::McpClient;
use summx::models::{ProcessingOutcome, SearchPlan, SortType, SummaryDepth};
use summx::pipeline::{PlanExecutor, QueryPlanner, ResearchAgent};
use summx::sources::ArxivToolGateway;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// SummX - search arXiv and summarize papers with an LLM
#[derive(Parser, Debug)]
#[command(name = "summx")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Search arXiv through an MCP tool server and summarize papers", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v debug, -vv trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Result ordering
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SortArg {
    /// Newest first
    Recent,
    /// Best match first
    Relevance,
}

/// How much of each paper the summarizer reads
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DepthArg {
    /// Abstract only
    Abstract,
    /// Abstract, introduction and conclusion
    IntroConclusion,
    /// Full text
    Full,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Plan a natural-language query with the planner model, then run it
    Ask {
        /// The request, e.g. "five most recent papers on hyper graphs"
        query: String,

        /// Return metadata only
        #[arg(long)]
        no_summary: bool,
    },

    /// Run a search described by flags
    #[command(alias = "s")]
    Search {
        /// Topic to search for
        #[arg(long, short)]
        topic: Option<String>,

        /// Author to search for
        #[arg(long, short)]
        author: Option<String>,

        /// Maximum number of papers
        #[arg(long, short, default_value_t = 5)]
        limit: usize,

        /// Result ordering
        #[arg(long, value_enum, default_value_t = SortArg::Recent)]
        sort: SortArg,

        /// Summarization depth
        #[arg(long, value_enum)]
        depth: Option<DepthArg>,

        /// Approximate token budget of the text sent to the summarizer
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Earliest publication date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Latest publication date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Return metadata only
        #[arg(long)]
        no_summary: bool,
    },

    /// Write a configuration file with default values
    InitConfig {
        /// Destination (default: the user config directory)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// What to run once the tool server is up
enum Job {
    Ask { query: String, no_summary: bool },
    Plan(SearchPlan),
}

fn init_logging(cli: &Cli, logging: &LoggingConfig) {
    let level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => logging.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("summx={}", level)),
    );
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

#[allow(clippy::too_many_arguments)]
fn search_plan(
    topic: Option<String>,
    author: Option<String>,
    limit: usize,
    sort: SortArg,
    depth: Option<DepthArg>,
    max_tokens: Option<u32>,
    date_range: (Option<String>, Option<String>),
    no_summary: bool,
) -> Result<SearchPlan> {
    if topic.is_none() && author.is_none() {
        bail!("search needs --topic or --author");
    }
    if limit == 0 {
        bail!("--limit must be at least 1");
    }

    let mut raw_query = [topic.as_deref(), author.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" by ");
    if raw_query.is_empty() {
        raw_query = "search".to_string();
    }

    let mut plan = SearchPlan::new(raw_query).limit(limit).sort(match sort {
        SortArg::Recent => SortType::MostRecent,
        SortArg::Relevance => SortType::Relevance,
    });
    plan.filters.topic = topic;
    plan.filters.author = author;
    (plan.filters.date_from, plan.filters.date_to) = date_range;
    if let Some(depth) = depth {
        plan = plan.depth(match depth {
            DepthArg::Abstract => SummaryDepth::Abstract,
            DepthArg::IntroConclusion => SummaryDepth::AbstractIntroConclusion,
            DepthArg::Full => SummaryDepth::Full,
        });
    }
    plan.summarization.max_tokens = max_tokens;
    if no_summary {
        plan = plan.without_summaries();
    }
    Ok(plan)
}

async fn run(config: &Config, job: Job) -> Result<(SearchPlan, Vec<ProcessingOutcome>)> {
    let client = Arc::new(McpClient::from_config(config.server.clone()));
    let source = Arc::new(ArxivToolGateway::new(client.clone()));
    let summarizer = build_llm(
        config.llm.summarizer_provider,
        &config.llm,
        &config.llm.summarizer_model,
    )
    .context("failed to set up the summarizer")?;
    let executor =
        PlanExecutor::new(source, summarizer).with_max_concurrency(config.pipeline.worker_limit());

    let work = execute(config, job, executor);

    tokio::select! {
        result = client.scoped(work) => result,
        _ = tokio::signal::ctrl_c() => bail!("interrupted"),
    }
}

async fn execute(
    config: &Config,
    job: Job,
    executor: PlanExecutor,
) -> Result<(SearchPlan, Vec<ProcessingOutcome>)> {
    match job {
        Job::Ask { query, no_summary } => {
            let planner_llm = build_llm(
                config.llm.planner_provider,
                &config.llm,
                &config.llm.planner_model,
            )
            .context("failed to set up the planner")?;
            let agent = ResearchAgent::new(QueryPlanner::new(planner_llm), executor);
            let result = agent
                .run_with(&query, |plan| {
                    if no_summary {
                        plan.summarization.enabled = false;
                    }
                })
                .await?;
            Ok(result)
        }
        Job::Plan(plan) => {
            let outcomes = executor.execute(&plan).await?;
            Ok((plan, outcomes))
        }
    }
}

fn report(plan: &SearchPlan, outcomes: &[ProcessingOutcome]) -> Result<()> {
    for outcome in outcomes {
        let meta = outcome.meta();
        if let Some(reason) = outcome.failure() {
            tracing::warn!("Paper {} ({}) has no summary: {}", meta.id, meta.title, reason);
        } else if outcome.summary().is_some_and(|s| s.is_fallback()) {
            tracing::info!("Summary of paper {} could not be parsed; raw output kept", meta.id);
        }
    }

    let output = serde_json::json!({
        "plan": plan,
        "results": outcomes,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { path, force } = &cli.command {
        init_logging(&cli, &LoggingConfig::default());
        let path = match path.clone().or_else(default_config_path) {
            Some(path) => path,
            None => bail!("could not determine the config directory; pass a path"),
        };
        write_default_config(&path, *force)?;
        eprintln!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_logging(&cli, &config.logging);
    tracing::debug!("Configuration: {:?}", config.server);

    let job = match cli.command {
        Commands::Ask { query, no_summary } => Job::Ask { query, no_summary },
        Commands::Search {
            topic,
            author,
            limit,
            sort,
            depth,
            max_tokens,
            from,
            to,
            no_summary,
        } => Job::Plan(search_plan(
            topic,
            author,
            limit,
            sort,
            depth,
            max_tokens,
            (from, to),
            no_summary,
        )?),
        Commands::InitConfig { .. } => return Ok(()),
    };

    let (plan, outcomes) = run(&config, job).await?;
    report(&plan, &outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_plan_from_flags() {
        let plan = search_plan(
            Some("diffusion models".to_string()),
            None,
            3,
            SortArg::Relevance,
            Some(DepthArg::Full),
            Some(500),
            (Some("2023-01-01".to_string()), None),
            false,
        )
        .unwrap();

        assert_eq!(plan.raw_query, "diffusion models");
        assert_eq!(plan.limit, 3);
        assert_eq!(plan.sort, SortType::Relevance);
        assert_eq!(plan.summarization.depth, SummaryDepth::Full);
        assert_eq!(plan.summarization.max_tokens, Some(500));
        assert_eq!(plan.filters.date_from.as_deref(), Some("2023-01-01"));
        assert!(plan.summarization.enabled);
    }

    #[test]
    fn test_search_plan_requires_topic_or_author() {
        let result = search_plan(None, None, 5, SortArg::Recent, None, None, (None, None), false);
        assert!(result.is_err());

        let plan = search_plan(
            None,
            Some("Laszlo Lovasz".to_string()),
            5,
            SortArg::Recent,
            None,
            None,
            (None, None),
            true,
        )
        .unwrap();
        assert_eq!(plan.raw_query, "Laszlo Lovasz");
        assert!(!plan.summarization.enabled);
    }
}

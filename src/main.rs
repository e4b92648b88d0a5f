use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use defect_rag::pipeline::{load_queries, write_rows};
use defect_rag::{
    BatchRunner, Config, Embedder, EmbeddingProvider, KnowledgeBase, PromptTemplates,
    ResultCache, Retriever, VectorIndex, assemble,
};

/// Defect RAG - retrieve similar historical defects for defect analysis
#[derive(Parser)]
#[command(name = "defect-rag", version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "DEFECT_RAG_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Retrieve similar cases for one defect description
    Search {
        /// Score category to scope the search to
        #[arg(long)]
        category: Option<String>,
        /// Number of candidates to request
        #[arg(short, long)]
        k: Option<usize>,
        /// Defect description
        query: String,
    },
    /// Prepare analysis prompts for a JSON file of defects
    Batch {
        /// Input JSON array of defects
        #[arg(short, long)]
        input: PathBuf,
        /// Output JSON file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List score categories and indexed record counts
    Categories,
    /// Remove expired and unreadable cache entries
    CleanCache,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,defect_rag=info",
        1 => "info,defect_rag=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(
        knowledge_base = %config.knowledge_base.display(),
        cache_dir = %config.cache.dir.display(),
        model = %config.embedding.model,
        "loaded configuration"
    );

    match cli.command {
        Command::Search { category, k, query } => search(&config, category, k, &query).await,
        Command::Batch { input, output } => batch(&config, &input, &output).await,
        Command::Categories => categories(&config),
        Command::CleanCache => clean_cache(&config),
    }
}

/// Load the knowledge base, build the index and wrap it in a retriever
async fn build_retriever(config: &Config) -> anyhow::Result<Retriever> {
    let knowledge = KnowledgeBase::load(&config.knowledge_base)?;
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(Embedder::new(&config.embedding)?);

    tracing::info!(records = knowledge.len(), model = provider.model(), "building vector index");
    let (index, report) = VectorIndex::build(&knowledge, provider.as_ref()).await?;
    if report.indexed == 0 {
        tracing::warn!("vector index is empty, every query will return no similar case");
    }

    Ok(Retriever::new(
        index,
        provider,
        ResultCache::from_config(&config.cache),
        config.retrieval.clone(),
    ))
}

async fn search(
    config: &Config,
    category: Option<String>,
    k: Option<usize>,
    query: &str,
) -> anyhow::Result<()> {
    let retriever = build_retriever(config).await?;

    let category = category
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| config.categories.default_profile().value.clone());
    let k = k.unwrap_or(config.retrieval.candidate_count);

    let retrieval = retriever.retrieve(query, &category, k).await;
    if retrieval.degraded {
        tracing::warn!("retrieval degraded, showing no similar case");
    }

    print!("{}", assemble(&retrieval.rank()));
    Ok(())
}

async fn batch(config: &Config, input: &Path, output: &Path) -> anyhow::Result<()> {
    let queries = load_queries(input)?;
    let retriever = Arc::new(build_retriever(config).await?);

    let runner = BatchRunner::new(
        retriever,
        config.categories.clone(),
        PromptTemplates::new(&config.prompt_dir),
    );
    let rows = runner.run(&queries).await;
    write_rows(output, &rows)?;

    println!("Processed {} defects -> {}", rows.len(), output.display());
    Ok(())
}

fn categories(config: &Config) -> anyhow::Result<()> {
    let knowledge = KnowledgeBase::load(&config.knowledge_base)?;
    let stats = knowledge.stats();
    let default = &config.categories.default_profile().value;

    println!(
        "Score categories ({} records, {} indexable):",
        stats.total, stats.indexable
    );
    for profile in config.categories.iter() {
        let count = stats.per_category.get(&profile.value).copied().unwrap_or(0);
        let marker = if &profile.value == default { " (default)" } else { "" };
        println!(
            "  {}{marker}  {}  template={}  records={count}",
            profile.value,
            profile.label,
            profile.prompt_template.display()
        );
    }

    let unknown: Vec<_> = stats
        .per_category
        .iter()
        .filter(|(value, _)| config.categories.get(value).is_none())
        .collect();
    if !unknown.is_empty() {
        println!("Uncategorized values:");
        for (value, count) in unknown {
            let value = if value.is_empty() { "<blank>" } else { value.as_str() };
            println!("  {value}  records={count}");
        }
    }

    Ok(())
}

fn clean_cache(config: &Config) -> anyhow::Result<()> {
    let cache = ResultCache::new(config.cache.dir.clone(), config.cache.ttl);
    let removed = cache.clear_expired()?;
    println!("Removed {removed} cache entries from {}", cache.dir().display());
    Ok(())
}

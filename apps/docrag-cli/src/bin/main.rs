use std::io::Write;

use clap::{Parser, Subcommand, ValueEnum};
use figment::providers::Serialized;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use docrag_agent::{InitOutcome, RetrievalOrchestrator, Status};
use docrag_core::config::Config;
use docrag_core::types::SearchMode;

#[derive(Parser)]
#[command(name = "docrag", about = "Ask questions about a folder of documents")]
struct Cli {
    /// Backend for embeddings and generation (overrides `provider` / APP_PROVIDER).
    #[arg(long, value_enum, global = true)]
    provider: Option<ProviderArg>,

    /// Directory to index (overrides `data_directory`).
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Local,
    Managed,
}

impl ProviderArg {
    fn as_str(self) -> &'static str {
        match self {
            ProviderArg::Local => "local",
            ProviderArg::Managed => "managed",
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Load the existing index or build it from the data directory.
    Ingest,
    /// Delete the local index and rebuild it.
    Rebuild,
    /// Answer a single question.
    Ask {
        question: String,
        /// Number of chunks to retrieve.
        #[arg(short)]
        k: Option<usize>,
        /// Rank by plain similarity instead of the configured mode.
        #[arg(long)]
        similarity: bool,
        /// Print the retrieved chunks instead of generating an answer.
        #[arg(long)]
        sources: bool,
    },
    /// Interactive question loop; `q`, `quit` or `exit` leaves.
    Chat,
    /// Show which retriever is active.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    if let Some(provider) = cli.provider {
        config = config.merge(Serialized::default("provider", provider.as_str()));
    }
    if let Some(dir) = &cli.data_dir {
        config = config.merge(Serialized::default("data_directory", dir));
    }
    let settings = config.settings()?;
    let orchestrator = RetrievalOrchestrator::from_settings(settings)?;

    match cli.command {
        Command::Ingest => report(&orchestrator.initialize().await?),
        Command::Rebuild => report(&orchestrator.rebuild().await?),
        Command::Ask { question, k, similarity, sources } => {
            let settings = orchestrator.settings();
            let k = k.unwrap_or(settings.top_k);
            let mode = if similarity { SearchMode::Similarity } else { settings.search_mode() };
            if sources {
                let result = orchestrator.retrieve_with(&question, k, mode).await?;
                for (rank, hit) in result.hits.iter().enumerate() {
                    println!("{}. [{:.3}] {}", rank + 1, hit.score, hit.chunk.source().unwrap_or(&hit.chunk.id));
                    println!("   {}", hit.chunk.text.replace('\n', " "));
                }
            } else {
                let answer = orchestrator.query_with(&question, k, mode).await?;
                println!("{answer}");
            }
        }
        Command::Chat => chat(&orchestrator).await?,
        Command::Status => {
            orchestrator.initialize().await?;
            match orchestrator.status().await {
                Status::Uninitialized => println!("⚠️  No documents indexed and no remote search configured"),
                Status::Remote => println!("🌐 Remote search is active"),
                Status::Local { chunks, embedder_id, persist_location } => {
                    println!("📦 Local index at {}", persist_location.display());
                    println!("📊 {chunks} chunks embedded with {embedder_id}");
                }
            }
        }
    }
    Ok(())
}

async fn chat(orchestrator: &RetrievalOrchestrator) -> anyhow::Result<()> {
    report(&orchestrator.initialize().await?);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nQuestion (q to quit): ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else { break };
        let question = line.trim();
        if matches!(question.to_ascii_lowercase().as_str(), "q" | "quit" | "exit") {
            break;
        }
        if question.is_empty() {
            continue;
        }
        match orchestrator.query(question).await {
            Ok(answer) => println!("\n{answer}"),
            Err(e) => println!("\nError: {e}"),
        }
    }
    Ok(())
}

fn report(outcome: &InitOutcome) {
    match outcome {
        InitOutcome::Remote => println!("🌐 Using remote search"),
        InitOutcome::Loaded { chunks } => println!("📦 Loaded existing index ({chunks} chunks)"),
        InitOutcome::Built { documents, chunks } => {
            println!("✅ Indexed {documents} documents into {chunks} chunks");
        }
        InitOutcome::Empty => println!("⚠️  No documents found; add files to the data directory"),
        InitOutcome::AlreadyIndexed => println!("✅ Already indexed"),
    }
}

use chrono::Utc;
use clap::{Parser, Subcommand};
use paper_chat_core::{
    sweeper, AnswerEngine, AnswerResult, CompletionServiceConfig, Embedder, EmbeddingServiceConfig,
    EngineOptions, HashEmbedder, HttpDocumentSource, LopdfExtractor, RemoteCompletionModel,
    RemoteEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
use std::io::{self, Write};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "paper-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Embedding service endpoint
    #[arg(long, env = "EMBEDDING_ENDPOINT", default_value = "http://localhost:8090/embed")]
    embedding_endpoint: String,

    /// Bearer token for the embedding service
    #[arg(long, env = "EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,

    /// Embedding vector dimensionality
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Completion service endpoint
    #[arg(long, env = "COMPLETION_ENDPOINT", default_value = "http://localhost:8091/complete")]
    completion_endpoint: String,

    /// Bearer token for the completion service
    #[arg(long, env = "COMPLETION_API_KEY")]
    completion_api_key: Option<String>,

    /// Use the deterministic local hashing embedder instead of the remote service
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Folder for downloaded documents
    #[arg(long, default_value = "papers")]
    download_dir: String,

    /// Seconds between session-folder cleanup sweeps
    #[arg(long, default_value = "30")]
    sweep_interval_secs: u64,

    /// Session folders older than this many seconds are deleted
    #[arg(long, default_value = "600")]
    sweep_max_age_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Load a document synchronously and ask one question.
    Ask {
        /// Document URL or local path
        #[arg(long)]
        source: String,
        /// The question to answer from the document
        #[arg(long)]
        question: String,
    },
    /// Load a document synchronously and explain one term from it.
    Lookup {
        /// Document URL or local path
        #[arg(long)]
        source: String,
        /// The highlighted term to explain
        #[arg(long)]
        term: String,
    },
    /// Load a document in the background and answer questions interactively.
    Chat {
        /// Document URL or local path
        #[arg(long)]
        source: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "paper-chat boot"
    );

    let source = HttpDocumentSource::new(&cli.download_dir);
    let mut completion_config = CompletionServiceConfig::new(&cli.completion_endpoint);
    completion_config.api_key = cli.completion_api_key.clone();
    let model = RemoteCompletionModel::new(completion_config);

    if cli.offline {
        let engine = AnswerEngine::new(
            source,
            Box::new(LopdfExtractor),
            HashEmbedder::default(),
            model,
            EngineOptions::default(),
        );
        run(engine, cli).await
    } else {
        let mut embedding_config = EmbeddingServiceConfig::new(&cli.embedding_endpoint);
        embedding_config.api_key = cli.embedding_api_key.clone();
        embedding_config.dimensions = cli.embedding_dimensions;
        let engine = AnswerEngine::new(
            source,
            Box::new(LopdfExtractor),
            RemoteEmbedder::new(embedding_config),
            model,
            EngineOptions::default(),
        );
        run(engine, cli).await
    }
}

async fn run<E>(
    engine: AnswerEngine<HttpDocumentSource, E, RemoteCompletionModel>,
    cli: Cli,
) -> anyhow::Result<()>
where
    E: Embedder + 'static,
{
    match cli.command {
        Command::Ask { source, question } => {
            let document = engine.update_and_reload(&source).await?;
            info!(
                file = %document.file_name,
                pages = document.page_count,
                chunks = document.chunk_count,
                "document loaded"
            );
            let answer = engine.ask(&question).await?;
            print_answer(&answer);
        }
        Command::Lookup { source, term } => {
            engine.update_and_reload(&source).await?;
            let explanation = engine.lookup(&term).await?;
            println!("{explanation}");
        }
        Command::Chat { source } => {
            sweeper::spawn(
                cli.download_dir.clone().into(),
                Duration::from_secs(cli.sweep_interval_secs),
                Duration::from_secs(cli.sweep_max_age_secs),
            );

            engine.ensure_loaded(&source);
            println!("loading {source} in the background");
            println!("type a question, 'lookup <term>', or 'exit'");

            let stdin = io::stdin();
            let mut line = String::new();
            loop {
                print!("> ");
                io::stdout().flush()?;
                line.clear();
                if stdin.read_line(&mut line)? == 0 {
                    break;
                }
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if input == "exit" || input == "quit" {
                    break;
                }
                if engine.is_loading() {
                    println!("still indexing the document, try again shortly");
                    continue;
                }

                if let Some(term) = input.strip_prefix("lookup ") {
                    match engine.lookup(term).await {
                        Ok(explanation) => println!("{explanation}"),
                        Err(error) => println!("lookup failed: {error}"),
                    }
                    continue;
                }

                match engine.ask(input).await {
                    Ok(answer) => print_answer(&answer),
                    Err(error) => println!("ask failed: {error}"),
                }
            }
        }
    }

    Ok(())
}

fn print_answer(answer: &AnswerResult) {
    println!("{}", answer.text);
    match answer.page {
        Some(page) => println!("  page: {page}"),
        None => println!("  page: unknown"),
    }
    if let Some(snippet) = &answer.snippet {
        println!("  snippet: {snippet}");
    }
    for anchor in &answer.anchors {
        println!("  anchor: {anchor}");
    }
}

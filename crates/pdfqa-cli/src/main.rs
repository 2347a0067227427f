//! PDF QA CLI - Command-line interface
//!
//! Usage:
//!   pdfqa index <pdf> [--embed]
//!   pdfqa ask <pdf> <question>
//!   pdfqa chat [pdf]
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use clap::{Parser, Subcommand};
use pdfqa_core::{AppConfig, LlmClient, LoggingConfig, QaAnswer};
use pdfqa_parser::{ChunkConfig, DocumentParser, PdfParser, TextSplitter};
use pdfqa_rag::{create_llm_client, DocumentIndexer, DocumentSource, QaSession, RetrievalQa};
use pdfqa_vector::{create_embedding_client, EmbeddingClient};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pdfqa")]
#[command(about = "Ask questions about a PDF document")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "PDFQA_CONFIG")]
    config: Option<PathBuf>,

    /// Log debug output from every pipeline stage to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and split a PDF, printing page and window statistics
    Index {
        /// Path to the PDF
        pdf: PathBuf,

        /// Also embed the windows and build the vector index
        #[arg(long)]
        embed: bool,
    },
    /// Answer a single question about a PDF
    Ask {
        /// Path to the PDF
        pdf: PathBuf,

        /// Question to ask
        question: String,

        /// Print the answer as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive chat about a PDF
    Chat {
        /// PDF to load at startup (defaults to the configured local file)
        pdf: Option<PathBuf>,
    },
}

// ============================================================================
// Setup
// ============================================================================

/// Crates whose events reach the terminal
const LOG_TARGETS: [&str; 5] = [
    "pdfqa",
    "pdfqa_core",
    "pdfqa_parser",
    "pdfqa_vector",
    "pdfqa_rag",
];

/// Default filter when `RUST_LOG` is unset; `--verbose` wins over the config
fn log_filter(config: &LoggingConfig, verbose: bool) -> String {
    let level = if verbose { "debug" } else { config.level.as_str() };
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn init_tracing(config: &LoggingConfig, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_filter(config, verbose).into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_writer(std::io::stderr);

    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Indexer and QA chain wired to the configured services
struct Services {
    indexer: DocumentIndexer,
    qa: RetrievalQa,
}

impl Services {
    fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let parser: Arc<dyn DocumentParser> = Arc::new(PdfParser::new());
        let embedder: Arc<dyn EmbeddingClient> =
            Arc::from(create_embedding_client(&config.llm)?);
        let llm: Arc<dyn LlmClient> = Arc::from(create_llm_client(&config.llm)?);

        Ok(Self {
            indexer: DocumentIndexer::from_config(config, parser, embedder)?,
            qa: RetrievalQa::new(llm, &config.rag),
        })
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn index_command(config: &AppConfig, pdf: PathBuf, embed: bool) -> anyhow::Result<()> {
    if embed {
        config.validate()?;
        let services = Services::from_config(config)?;
        let index = services.indexer.index(DocumentSource::Path(pdf)).await?;
        let info = index.info();

        println!("Document:  {}", info.name);
        println!("Pages:     {}", info.page_count);
        println!("Chars:     {}", info.char_count);
        println!("Windows:   {}", info.chunk_count);
        println!("Embedded:  yes");
        return Ok(());
    }

    // Splitting needs no hosted service, so the API key is not required
    let splitter = TextSplitter::new(ChunkConfig::new(
        config.rag.chunk_size,
        config.rag.chunk_overlap,
    ))?;

    // Report text-less (scanned) PDFs instead of failing on them
    let doc = PdfParser::new()
        .allow_empty()
        .parse(&pdf)
        .with_context(|| format!("Failed to read {}", pdf.display()))?;
    let windows = splitter.split_document(&doc);

    println!("Document:  {}", doc.name);
    println!("Pages:     {}", doc.page_count());
    println!("Chars:     {}", doc.char_count());
    println!(
        "Windows:   {} (size {}, overlap {})",
        windows.len(),
        config.rag.chunk_size,
        config.rag.chunk_overlap
    );
    if doc.is_blank() {
        println!("No extractable text; the PDF may contain only scanned images");
    }
    for window in &windows {
        println!(
            "  #{:<4} page {:<4} chars {}..{}",
            window.index, window.page, window.start_offset, window.end_offset
        );
    }

    Ok(())
}

async fn ask_command(
    config: &AppConfig,
    pdf: PathBuf,
    question: &str,
    json: bool,
) -> anyhow::Result<()> {
    config.validate()?;
    let services = Services::from_config(config)?;

    let mut session = QaSession::new();
    session
        .load_document(&services.indexer, DocumentSource::Path(pdf))
        .await?;
    let answer = session.ask(&services.qa, question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }

    Ok(())
}

async fn chat_command(config: &AppConfig, pdf: Option<PathBuf>) -> anyhow::Result<()> {
    config.validate()?;
    let services = Services::from_config(config)?;
    let mut session = QaSession::new();

    let initial = pdf.unwrap_or_else(|| config.document.local_pdf_path.clone());
    load_into(&mut session, &services, initial).await;

    println!("Type a question, or :load <pdf>, :history, :quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match ChatInput::parse(&line) {
            ChatInput::Empty => {}
            ChatInput::Quit => break,
            ChatInput::Load(path) => load_into(&mut session, &services, PathBuf::from(path)).await,
            ChatInput::History => print_history(&session),
            ChatInput::Unknown(command) => eprintln!("Unknown command: {command}"),
            ChatInput::Question(question) => match session.ask(&services.qa, question).await {
                Ok(answer) => print_answer(&answer),
                Err(e) => eprintln!("Error: {e}"),
            },
        }
    }

    Ok(())
}

async fn load_into(session: &mut QaSession, services: &Services, path: PathBuf) {
    println!("Loading {}...", path.display());
    match session
        .load_document(&services.indexer, DocumentSource::Path(path))
        .await
    {
        Ok(info) => println!(
            "Loaded {}: {} pages, {} windows",
            info.name, info.page_count, info.chunk_count
        ),
        Err(e) => {
            eprintln!("Error: {e}");
            if let Some(current) = session.document() {
                println!("Still using {}", current.name);
            }
        }
    }
}

// ============================================================================
// Chat input
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum ChatInput<'a> {
    Empty,
    Quit,
    History,
    Load(&'a str),
    Unknown(&'a str),
    Question(&'a str),
}

impl<'a> ChatInput<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }

        let Some(command) = line.strip_prefix(':') else {
            return Self::Question(line);
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };

        match name {
            "quit" | "q" | "exit" => Self::Quit,
            "history" => Self::History,
            "load" if !arg.is_empty() => Self::Load(arg),
            _ => Self::Unknown(line),
        }
    }
}

// ============================================================================
// Output
// ============================================================================

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

fn print_answer(answer: &QaAnswer) {
    println!("\n{}\n", answer.answer.trim());
    if !answer.sources.is_empty() {
        println!("Sources:");
        for source in &answer.sources {
            println!(
                "  [{}] page {} (score {:.3}): {}",
                source.rank,
                source.chunk.page,
                source.score,
                preview(&source.chunk.content, 160)
            );
        }
    }
    println!("({} ms)\n", answer.processing_time_ms);
}

fn print_history(session: &QaSession) {
    if session.history().is_empty() {
        println!("No questions asked about the current document yet.");
        return;
    }
    for (i, record) in session.history().iter().enumerate() {
        println!("{}. Q: {}", i + 1, record.question);
        println!("   A: {}", preview(&record.answer, 200));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that reach the hosted services validate before using them
    let config = AppConfig::load_unvalidated(cli.config.as_deref())
        .context("Failed to load configuration")?;
    init_tracing(&config.logging, cli.verbose);

    match cli.command {
        Commands::Index { pdf, embed } => index_command(&config, pdf, embed).await,
        Commands::Ask {
            pdf,
            question,
            json,
        } => ask_command(&config, pdf, &question, json).await,
        Commands::Chat { pdf } => chat_command(&config, pdf).await,
    }
}

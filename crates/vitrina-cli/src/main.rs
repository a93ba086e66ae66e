use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use colored::*;
use std::future::Future;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracing::debug;

mod render;

use render::TerminalRenderer;
use vitrina_core::protocol;
use vitrina_core::session::TurnOutcome;
use vitrina_core::{
    moderate, ChatSession, Config, OllamaClient, OllamaTransport, Provider, ReplyFormat,
    SectionIndex, SiteCatalog, SiteTransport, Transport,
};

#[derive(Parser)]
#[command(name = "vitrina")]
#[command(about = "Chat with the site assistant and inspect its replies")]
struct Cli {
    /// Override the configured provider (site, ollama)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Decode replies as legacy inline action tags
    #[arg(long, global = true)]
    legacy: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat; Ctrl-C stops the current reply, or quits at the prompt
    Chat,
    /// Ask a single question and print the reply
    Ask {
        /// Your question
        question: String,
        /// Print the decoded reply as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode a saved reply and print it as JSON
    Decode {
        /// File holding the raw reply text
        file: PathBuf,
    },
    /// Print the generator instructions for the configured catalog
    Prompt,
    /// Find the site sections closest to a query
    Search {
        /// Search query
        query: String,
        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },
    /// Screen a visitor comment
    Moderate {
        /// Comment text
        text: String,
    },
    /// List available Ollama models
    Models,
    /// Show the resolved configuration
    Config,
}

fn log_filter() -> tracing_subscriber::EnvFilter {
    let level = if let Ok(v) = std::env::var("RUST_LOG") {
        v
    } else if let Ok(v) = std::env::var("VITRINA_LOG") {
        v
    } else {
        "warn".to_string()
    };

    tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("{}: {}", "Ignoring unreadable config".yellow(), e);
        let mut config = Config::new();
        config.apply_env();
        config
    });
    if let Some(provider) = &cli.provider {
        let provider = Provider::from_str(provider)
            .ok_or_else(|| anyhow!("Unknown provider '{}' (expected site or ollama)", provider))?;
        config.provider = Some(provider.as_str().to_string());
    }
    if cli.legacy {
        config.reply_format = Some(ReplyFormat::Legacy.as_str().to_string());
    }

    match cli.command {
        Commands::Chat => chat_interactive(&config).await?,
        Commands::Ask { question, json } => ask(&config, &question, json).await?,
        Commands::Decode { file } => decode_file(&config, &file).await?,
        Commands::Prompt => print_prompt(&config)?,
        Commands::Search { query, limit } => search_sections(&config, &query, limit).await?,
        Commands::Moderate { text } => moderate_comment(&text)?,
        Commands::Models => list_ollama_models(&config).await?,
        Commands::Config => show_config(&config)?,
    }

    Ok(())
}

fn load_catalog(config: &Config) -> Result<SiteCatalog> {
    match &config.catalog_path {
        Some(path) => SiteCatalog::load(path),
        None => Ok(SiteCatalog::default()),
    }
}

fn build_session(config: &Config) -> Result<ChatSession<Box<dyn Transport>>> {
    let transport: Box<dyn Transport> = match config.provider() {
        Provider::Site => Box::new(SiteTransport::new(config.endpoint())),
        Provider::Ollama => {
            let catalog = load_catalog(config)?;
            Box::new(OllamaTransport::new(
                OllamaClient::new(config.ollama_url()),
                config.model(),
                protocol::system_prompt(&catalog, config.reply_format()),
            ))
        }
    };

    debug!(provider = config.provider().as_str(), format = config.reply_format().as_str(), "Session configured");

    Ok(ChatSession::new(transport)
        .with_format(config.reply_format())
        .with_timeout(config.timeout()))
}

/// Cancels `token` on Ctrl-C until the returned task is aborted.
fn cancel_on_ctrl_c(token: &CancellationToken) -> tokio::task::JoinHandle<()> {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

/// Waits for the next prompt line. `None` at end of input or when `interrupt`
/// fires first.
async fn next_input<R, F>(lines: &mut Lines<R>, interrupt: F) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = interrupt => Ok(None),
        line = lines.next_line() => Ok(line?),
    }
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn report_outcome(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Failed(e) => {
            eprintln!("{}: {}", "Request failed".red(), e);
        }
        TurnOutcome::Aborted => println!("{}", "(stopped)".dimmed()),
        TurnOutcome::Rejected | TurnOutcome::Completed { .. } => {}
    }
}

async fn chat_interactive(config: &Config) -> Result<()> {
    let mut session = build_session(config)?;
    let mut renderer = TerminalRenderer::new();

    println!("\n{}", "💬 Site assistant".bold().blue());
    println!(
        "{}",
        format!(
            "{} · {} replies · /clear resets, Ctrl-C or Ctrl-D quits",
            config.provider().display_name(),
            config.reply_format().as_str()
        )
        .dimmed()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n{} ", "›".bold().green());
        std::io::Write::flush(&mut std::io::stdout())?;

        let Some(line) = next_input(&mut lines, ctrl_c()).await? else {
            println!();
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear();
                println!("{}", "Conversation cleared".dimmed());
                continue;
            }
            _ => {}
        }

        renderer.reset();
        let cancel = CancellationToken::new();
        let watcher = cancel_on_ctrl_c(&cancel);
        let outcome = session.send(&line, &cancel, &mut renderer).await;
        watcher.abort();

        match &outcome {
            TurnOutcome::Completed { .. } => {
                if let Some(message) = session.messages().last() {
                    renderer.finish_turn(message);
                }
            }
            TurnOutcome::Failed(_) => {
                println!();
                report_outcome(&outcome);
                if let Some(message) = session.messages().last() {
                    println!("{}", message.content.red());
                }
            }
            _ => report_outcome(&outcome),
        }
    }

    Ok(())
}

async fn ask(config: &Config, question: &str, json: bool) -> Result<()> {
    let mut session = build_session(config)?;
    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(&cancel);

    let outcome = if json {
        session.send(question, &cancel, &mut ()).await
    } else {
        let mut renderer = TerminalRenderer::new();
        let outcome = session.send(question, &cancel, &mut renderer).await;
        if let (TurnOutcome::Completed { .. }, Some(message)) = (&outcome, session.messages().last()) {
            renderer.finish_turn(message);
        }
        outcome
    };
    watcher.abort();

    match outcome {
        TurnOutcome::Completed { .. } => {
            if json {
                if let Some(reply) = session.messages().last().and_then(|m| m.reply.as_ref()) {
                    println!("{}", serde_json::to_string_pretty(reply)?);
                }
            }
            Ok(())
        }
        TurnOutcome::Rejected => Err(anyhow!("Question is empty")),
        TurnOutcome::Failed(e) => Err(anyhow!(e).context("Chat request failed")),
        TurnOutcome::Aborted => {
            report_outcome(&TurnOutcome::Aborted);
            Ok(())
        }
    }
}

async fn decode_file(config: &Config, file: &PathBuf) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let reply = config.reply_format().decode(&text);
    println!("{}", serde_json::to_string_pretty(&reply)?);

    if reply.is_empty() {
        eprintln!("{}", "Warning: reply has no message text".yellow());
    }

    Ok(())
}

fn print_prompt(config: &Config) -> Result<()> {
    let catalog = load_catalog(config)?;
    print!("{}", protocol::system_prompt(&catalog, config.reply_format()));
    Ok(())
}

async fn search_sections(config: &Config, query: &str, limit: usize) -> Result<()> {
    let dir = config.embeddings_dir().ok_or_else(|| {
        anyhow!("No section embeddings found. Set embeddings_dir or place section_embeddings.npy in ./data")
    })?;
    let index = SectionIndex::load(&dir)?;
    let catalog = load_catalog(config)?;

    println!("🔍 Searching sections for: {}", query.bold().cyan());

    let ollama = OllamaClient::new(config.ollama_url());
    let query_embedding = ollama
        .embed(config.embedding_model(), query)
        .await
        .context("Failed to embed query (is Ollama running?)")?;

    let results = index.search(&query_embedding, limit)?;
    if results.is_empty() {
        println!("{}", "No results found".red());
        return Ok(());
    }

    println!();
    for (i, (slug, score)) in results.iter().enumerate() {
        let title = catalog
            .find_section(slug)
            .map(|s| s.title.as_str())
            .unwrap_or(slug.as_str());
        println!(
            "{}. {} {} {}",
            (i + 1).to_string().bold().blue(),
            title.bold().yellow(),
            format!("/seccion/{}", slug).dimmed(),
            format!("({:.3})", score).dimmed()
        );
    }

    Ok(())
}

fn moderate_comment(text: &str) -> Result<()> {
    let report = moderate(text);
    let verdict = match report.verdict {
        vitrina_core::ModerationVerdict::Approved => report.verdict.as_str().green(),
        vitrina_core::ModerationVerdict::Pending => report.verdict.as_str().yellow(),
        vitrina_core::ModerationVerdict::Rejected => report.verdict.as_str().red(),
    };
    println!("{} {}", verdict.bold(), format!("({} flagged)", report.hits).dimmed());
    Ok(())
}

async fn list_ollama_models(config: &Config) -> Result<()> {
    let ollama = OllamaClient::new(config.ollama_url());

    println!("\n{}", "🤖 Available Ollama Models".bold().blue());
    println!("{}", "=".repeat(30).dimmed());

    match ollama.list_models().await {
        Ok(models) => {
            if models.is_empty() {
                println!("{}", "No models found. Pull a model with: ollama pull llama3.2".yellow());
            } else {
                for model in models {
                    println!("  • {}", model.green());
                }
            }
        }
        Err(e) => {
            println!("{}: {}", "Error connecting to Ollama".red(), e);
            println!("Make sure Ollama is running: {}", "ollama serve".bold());
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    let path = Config::get_config_path()?;
    println!("{} {}", "Config file:".bold(), path.display());
    println!("{}", serde_json::to_string_pretty(config)?);
    println!("{} {}", "Provider:".bold(), config.provider().display_name());
    println!("{} {}s", "Timeout:".bold(), config.timeout().as_secs());
    Ok(())
}
